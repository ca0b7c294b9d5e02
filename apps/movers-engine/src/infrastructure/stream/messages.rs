//! Streaming Wire Messages
//!
//! Frames arrive as JSON arrays of events tagged by `"ev"`:
//!
//! ```json
//! [{"ev":"status","status":"auth_success","message":"authenticated"}]
//! [{"ev":"LULD","T":"ABCD","h":12.5,"l":10.1,"i":[17],"z":3,"t":1704117600000}]
//! [{"ev":"AM","sym":"ABCD","v":1200,"av":85000,"op":10.2,"vw":11.02,
//!   "o":11.0,"c":11.1,"h":11.2,"l":10.9,"a":10.8,"z":12,
//!   "s":1704117600000,"e":1704117660000}]
//! ```
//!
//! Control frames sent by the client:
//!
//! ```json
//! {"action":"auth","params":"<key>"}
//! {"action":"subscribe","params":"LULD.*"}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::MinuteAggregate;
use crate::domain::session::to_epoch_millis;

// =============================================================================
// Control Requests
// =============================================================================

/// Client control frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// `auth`, `subscribe` or `unsubscribe`.
    pub action: String,
    /// Key or channel list.
    pub params: String,
}

impl ControlRequest {
    /// Authentication frame.
    #[must_use]
    pub fn auth(key: &str) -> Self {
        Self {
            action: "auth".to_string(),
            params: key.to_string(),
        }
    }

    /// Subscription frame, e.g. `LULD.*` or `AM.*`.
    #[must_use]
    pub fn subscribe(channels: &str) -> Self {
        Self {
            action: "subscribe".to_string(),
            params: channels.to_string(),
        }
    }
}

// =============================================================================
// Server Events
// =============================================================================

/// Connection status event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// `connected`, `auth_success`, `auth_failed`, ...
    pub status: String,
    /// Human-readable detail.
    #[serde(default)]
    pub message: Option<String>,
}

/// Status classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Socket accepted.
    Connected,
    /// Key accepted.
    AuthSuccess,
    /// Key rejected.
    AuthFailed,
    /// Anything else (subscription acks, notices).
    Other,
}

impl StatusMessage {
    /// Classify the status string.
    #[must_use]
    pub fn kind(&self) -> StatusKind {
        match self.status.as_str() {
            "connected" => StatusKind::Connected,
            "auth_success" => StatusKind::AuthSuccess,
            "auth_failed" => StatusKind::AuthFailed,
            _ => StatusKind::Other,
        }
    }
}

/// Limit-up / limit-down event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltMessage {
    /// Ticker.
    #[serde(rename = "T")]
    pub symbol: String,
    /// Upper price band.
    #[serde(rename = "h", default)]
    pub high: Option<f64>,
    /// Lower price band.
    #[serde(rename = "l", default)]
    pub low: Option<f64>,
    /// Indicator codes (17 = halt, 18 = resume).
    #[serde(rename = "i", default)]
    pub indicators: Vec<i64>,
    /// Tape.
    #[serde(rename = "z", default)]
    pub tape: Option<i64>,
    /// Event time, any unit.
    #[serde(rename = "t", default)]
    pub timestamp: Option<f64>,
}

impl HaltMessage {
    /// Event time in epoch milliseconds.
    #[must_use]
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.timestamp.and_then(to_epoch_millis)
    }

    /// Price band description, when both bands are present.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match (self.low, self.high) {
            (Some(low), Some(high)) => Some(format!("LULD band {low:.2}-{high:.2}")),
            _ => None,
        }
    }
}

/// Per-symbol minute aggregate event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMessage {
    /// Ticker.
    pub sym: String,
    /// Bar volume.
    #[serde(rename = "v", default)]
    pub volume: f64,
    /// Accumulated day volume.
    #[serde(rename = "av", default)]
    pub accumulated_volume: Option<f64>,
    /// Official open of the day.
    #[serde(rename = "op", default)]
    pub official_open: Option<f64>,
    /// Bar VWAP.
    #[serde(rename = "vw", default)]
    pub vwap: Option<f64>,
    /// Bar open.
    #[serde(rename = "o")]
    pub open: f64,
    /// Bar close.
    #[serde(rename = "c")]
    pub close: f64,
    /// Bar high.
    #[serde(rename = "h")]
    pub high: f64,
    /// Bar low.
    #[serde(rename = "l")]
    pub low: f64,
    /// Day VWAP.
    #[serde(rename = "a", default)]
    pub day_vwap: Option<f64>,
    /// Bar start, epoch milliseconds.
    #[serde(rename = "s", default)]
    pub start: i64,
    /// Bar end, epoch milliseconds.
    #[serde(rename = "e", default)]
    pub end: i64,
}

impl From<AggregateMessage> for MinuteAggregate {
    fn from(msg: AggregateMessage) -> Self {
        Self {
            symbol: msg.sym.trim().to_uppercase(),
            open: msg.open,
            high: msg.high,
            low: msg.low,
            close: msg.close,
            volume: msg.volume,
            accumulated_volume: msg.accumulated_volume,
            official_open: msg.official_open,
            vwap: msg.vwap,
            day_vwap: msg.day_vwap,
            start_ms: msg.start,
            end_ms: msg.end,
        }
    }
}

/// One decoded event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Connection status.
    Status(StatusMessage),
    /// Halt / resume.
    Halt(HaltMessage),
    /// Minute aggregate.
    Aggregate(AggregateMessage),
    /// Event type this engine does not consume.
    Other(String),
}

impl StreamFrame {
    /// Metric label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Halt(_) => "luld",
            Self::Aggregate(_) => "aggregate",
            Self::Other(_) => "other",
        }
    }
}
