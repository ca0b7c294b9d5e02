//! Array-of-rows payload shapes accepted from upstream.

use serde_json::Value;

use crate::error::{PipelineError, truncate_preview};

const ARRAY_KEYS: [&str; 3] = ["tickers", "results", "data"];

/// Pull the per-symbol objects out of a list payload.
///
/// Accepted shapes, in order: `{"tickers": [..]}`, `{"results": [..]}`,
/// `{"data": [..]}`, a bare array, and a single `{"ticker": {..}}` object.
///
/// # Errors
///
/// `MalformedPayload` when the payload matches none of them.
pub fn extract_rows(payload: &Value) -> Result<Vec<Value>, PipelineError> {
    if let Value::Array(items) = payload {
        return Ok(items.clone());
    }

    if let Value::Object(map) = payload {
        for key in ARRAY_KEYS {
            if let Some(Value::Array(items)) = map.get(key) {
                return Ok(items.clone());
            }
        }
        if let Some(single @ Value::Object(_)) = map.get("ticker") {
            return Ok(vec![single.clone()]);
        }
    }

    Err(PipelineError::MalformedPayload(truncate_preview(
        &payload.to_string(),
    )))
}

/// Unwrap a single-ticker envelope (`{"status": "OK", "ticker": {..}}`).
#[must_use]
pub fn unwrap_single(payload: &Value) -> &Value {
    match payload.get("ticker") {
        Some(inner @ Value::Object(_)) => inner,
        _ => payload,
    }
}

/// Symbol named inside a payload, if any.
#[must_use]
pub fn payload_symbol(payload: &Value) -> Option<String> {
    ["ticker", "symbol", "sym", "T"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_uppercase())
        .find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_known_shapes() {
        let item = json!({"ticker": "A"});
        for payload in [
            json!({"tickers": [item.clone()]}),
            json!({"results": [item.clone()]}),
            json!({"data": [item.clone()]}),
            json!([item.clone()]),
        ] {
            assert_eq!(extract_rows(&payload).unwrap(), vec![item.clone()]);
        }
    }

    #[test]
    fn single_ticker_envelope() {
        let payload = json!({"status": "OK", "ticker": {"ticker": "AAPL"}});
        let rows = extract_rows(&payload).unwrap();
        assert_eq!(rows, vec![json!({"ticker": "AAPL"})]);
        assert_eq!(unwrap_single(&payload), &json!({"ticker": "AAPL"}));
    }

    #[test]
    fn rejects_unknown_shape() {
        let err = extract_rows(&json!({"status": "ERROR", "message": "nope"})).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedPayload(body) if body.contains("nope")));
        assert!(extract_rows(&json!("text")).is_err());
    }

    #[test]
    fn symbol_from_payload() {
        assert_eq!(payload_symbol(&json!({"ticker": "aapl"})), Some("AAPL".into()));
        assert_eq!(payload_symbol(&json!({"sym": "msft"})), Some("MSFT".into()));
        assert_eq!(payload_symbol(&json!({"ticker": {"x": 1}})), None);
    }
}
