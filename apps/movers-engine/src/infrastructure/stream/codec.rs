//! Stream Codec
//!
//! Decodes text frames into [`StreamFrame`]s. Decoding is lenient: an
//! element that fails to parse is counted and skipped while its siblings
//! are kept.

use serde_json::Value;

use super::messages::{AggregateMessage, HaltMessage, StatusMessage, StreamFrame};

/// Codec errors for frames that cannot be decoded at all.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Text is not JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON is neither an array nor an object.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// Events from one text frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// Events that parsed.
    pub frames: Vec<StreamFrame>,
    /// Elements dropped as malformed.
    pub dropped: usize,
}

/// JSON codec for the streaming endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamCodec;

impl StreamCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame (array of events, or a single event object).
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON array or object.
    pub fn decode(&self, text: &str) -> Result<Decoded, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;
        let items = match value {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            other => {
                let preview: String = other.to_string().chars().take(50).collect();
                return Err(CodecError::InvalidFormat(preview));
            }
        };

        let mut decoded = Decoded::default();
        for item in items {
            match decode_event(item) {
                Some(frame) => decoded.frames.push(frame),
                None => decoded.dropped += 1,
            }
        }
        Ok(decoded)
    }
}

fn decode_event(value: Value) -> Option<StreamFrame> {
    let ev = value.get("ev").and_then(Value::as_str)?.to_string();
    match ev.as_str() {
        "status" => serde_json::from_value::<StatusMessage>(value)
            .ok()
            .map(StreamFrame::Status),
        "LULD" => serde_json::from_value::<HaltMessage>(value)
            .ok()
            .filter(|m| !m.symbol.trim().is_empty())
            .map(StreamFrame::Halt),
        "AM" => serde_json::from_value::<AggregateMessage>(value)
            .ok()
            .filter(|m| !m.sym.trim().is_empty())
            .map(StreamFrame::Aggregate),
        _ => Some(StreamFrame::Other(ev)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_array_and_drops_bad_elements() {
        let text = r#"[
            {"ev":"status","status":"connected","message":"Connected Successfully"},
            {"ev":"LULD","T":"ABC","i":[17],"t":1},
            {"ev":"AM","sym":"ABC","o":"not-a-number"},
            {"no_ev":true},
            {"ev":"T","sym":"ABC"}
        ]"#;
        let decoded = StreamCodec::new().decode(text).unwrap();
        assert_eq!(decoded.frames.len(), 3);
        assert_eq!(decoded.dropped, 2);
        assert!(matches!(decoded.frames[0], StreamFrame::Status(_)));
        assert!(matches!(decoded.frames[1], StreamFrame::Halt(_)));
        assert_eq!(decoded.frames[2], StreamFrame::Other("T".to_string()));
    }

    #[test]
    fn single_object_frame() {
        let decoded = StreamCodec::new()
            .decode(r#"{"ev":"status","status":"auth_success"}"#)
            .unwrap();
        assert_eq!(decoded.frames.len(), 1);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(StreamCodec::new().decode("not json").is_err());
        assert!(StreamCodec::new().decode("42").is_err());
    }

    #[test]
    fn empty_array_is_empty() {
        assert_eq!(StreamCodec::new().decode("[]").unwrap(), Decoded::default());
    }
}
