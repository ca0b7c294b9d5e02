//! Pipeline error taxonomy.
//!
//! Per-symbol operations in the hot path return `Result<T, FetchFailure>`
//! and never panic or abort a batch. Failures are collected as
//! [`Diagnostic`]s next to the rows that did succeed. Only a missing
//! configuration fails a whole request, and it is checked before any
//! remote call is issued.
//!
//! | Kind | Origin | Batch effect |
//! |------|--------|--------------|
//! | `NetworkFailure` | timeout, DNS, connection reset | row dropped or kept with null fields |
//! | `UpstreamHttpError` | status >= 400 (incl. 429) | row dropped or kept with null fields |
//! | `MalformedPayload` | body matches no known row shape | row dropped |
//! | `InsufficientHistory` | too few bars for an indicator | indicator left null |
//! | `MissingConfiguration` | required setting absent | whole request fails early |

use serde::Serialize;
use thiserror::Error;

/// Maximum number of characters of an upstream body kept for diagnostics.
pub const BODY_PREVIEW_LIMIT: usize = 800;

/// Classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// No response was received (timeout, DNS, reset).
    NetworkFailure,
    /// The upstream answered with a status >= 400.
    UpstreamHttpError,
    /// The response body could not be interpreted.
    MalformedPayload,
}

impl FailureKind {
    /// Label used for metrics and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NetworkFailure => "network",
            Self::UpstreamHttpError => "upstream_http",
            Self::MalformedPayload => "malformed",
        }
    }
}

/// Structured failure of a single remote call.
///
/// Produced by the safe remote-call wrapper instead of raising. Carries
/// enough context to be shown to an operator without re-running the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{} failure for {url} (status {status:?}): {hint}", kind.as_str())]
pub struct FetchFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Upstream body truncated to [`BODY_PREVIEW_LIMIT`] characters.
    pub body_preview: String,
    /// URL of the originating request.
    pub url: String,
    /// Operator-facing hint derived from the status.
    pub hint: String,
}

impl FetchFailure {
    /// Failure without any response (timeout, DNS, reset).
    #[must_use]
    pub fn network(url: impl Into<String>, detail: &str) -> Self {
        Self {
            kind: FailureKind::NetworkFailure,
            status: None,
            body_preview: truncate_preview(detail),
            url: url.into(),
            hint: "upstream unreachable or timed out".to_string(),
        }
    }

    /// Failure with an HTTP status >= 400.
    #[must_use]
    pub fn upstream(url: impl Into<String>, status: u16, body: &str) -> Self {
        Self {
            kind: FailureKind::UpstreamHttpError,
            status: Some(status),
            body_preview: truncate_preview(body),
            url: url.into(),
            hint: hint_for_status(status).to_string(),
        }
    }

    /// Response received but its body matched no known shape.
    #[must_use]
    pub fn malformed(url: impl Into<String>, body: &str) -> Self {
        Self {
            kind: FailureKind::MalformedPayload,
            status: None,
            body_preview: truncate_preview(body),
            url: url.into(),
            hint: "response matched no known array-of-rows shape".to_string(),
        }
    }

    /// Whether the upstream rejected the call for rate limiting.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self.status, Some(429))
    }
}

/// Errors surfaced by the pipeline.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// No response from upstream.
    #[error("network failure: {0}")]
    NetworkFailure(FetchFailure),

    /// Upstream returned an error status.
    #[error("upstream HTTP error: {0}")]
    UpstreamHttpError(FetchFailure),

    /// Payload matches no known shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Indicator needs more bars than available.
    #[error("insufficient history: need {needed} bars, have {available}")]
    InsufficientHistory {
        /// Bars required.
        needed: usize,
        /// Bars available.
        available: usize,
    },

    /// Required settings absent for a feature.
    #[error("missing configuration: {}", missing.join(", "))]
    MissingConfiguration {
        /// Every missing setting name.
        missing: Vec<String>,
    },
}

impl From<FetchFailure> for PipelineError {
    fn from(failure: FetchFailure) -> Self {
        match failure.kind {
            FailureKind::NetworkFailure => Self::NetworkFailure(failure),
            FailureKind::UpstreamHttpError => Self::UpstreamHttpError(failure),
            FailureKind::MalformedPayload => Self::MalformedPayload(failure.body_preview),
        }
    }
}

/// Stage of the pipeline a per-symbol failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Candidate list retrieval.
    Universe,
    /// Per-symbol snapshot.
    Snapshot,
    /// Float share enrichment.
    Float,
    /// Daily open / previous close enrichment.
    DailyOpen,
    /// Minute bars for indicators.
    Bars,
    /// Payload normalization.
    Normalize,
}

/// One per-symbol failure collected during a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Symbol the failure belongs to (empty for batch-level calls).
    pub symbol: String,
    /// Stage that failed.
    pub stage: Stage,
    /// Failure details.
    pub failure: FetchFailure,
}

impl Diagnostic {
    /// Create a new diagnostic.
    #[must_use]
    pub fn new(symbol: impl Into<String>, stage: Stage, failure: FetchFailure) -> Self {
        Self {
            symbol: symbol.into(),
            stage,
            failure,
        }
    }
}

/// Request-level failure returned by builders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("view build failed: {hint}")]
pub struct BuildFailure {
    /// HTTP status of the failing upstream call, if any.
    pub status: Option<u16>,
    /// Operator-facing hint.
    pub hint: String,
    /// Truncated upstream body.
    pub body_preview: String,
    /// Missing settings, when the failure is a configuration problem.
    pub missing: Vec<String>,
}

impl BuildFailure {
    /// Failure caused by missing settings.
    #[must_use]
    pub fn missing_configuration(missing: Vec<String>) -> Self {
        Self {
            status: None,
            hint: format!("missing configuration: {}", missing.join(", ")),
            body_preview: String::new(),
            missing,
        }
    }
}

impl From<FetchFailure> for BuildFailure {
    fn from(failure: FetchFailure) -> Self {
        Self {
            status: failure.status,
            hint: failure.hint,
            body_preview: failure.body_preview,
            missing: Vec::new(),
        }
    }
}

impl From<PipelineError> for BuildFailure {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NetworkFailure(f) | PipelineError::UpstreamHttpError(f) => f.into(),
            PipelineError::MissingConfiguration { missing } => Self::missing_configuration(missing),
            other => Self {
                status: None,
                hint: other.to_string(),
                body_preview: String::new(),
                missing: Vec::new(),
            },
        }
    }
}

/// Truncate a body to at most [`BODY_PREVIEW_LIMIT`] characters.
#[must_use]
pub fn truncate_preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_LIMIT).collect()
}

/// Map an HTTP status to a short operator hint.
#[must_use]
pub const fn hint_for_status(status: u16) -> &'static str {
    match status {
        401 | 403 => "check API key and plan entitlements",
        404 => "endpoint or symbol not found",
        429 => "rate limited by upstream, reduce concurrency or wait",
        400..=499 => "request rejected by upstream",
        500..=599 => "upstream server error",
        _ => "unexpected upstream status",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_truncated_on_char_boundary() {
        let body = "é".repeat(1000);
        let preview = truncate_preview(&body);
        assert_eq!(preview.chars().count(), BODY_PREVIEW_LIMIT);
    }

    #[test]
    fn rate_limit_is_upstream_error() {
        let failure = FetchFailure::upstream("http://x/y", 429, "slow down");
        assert_eq!(failure.kind, FailureKind::UpstreamHttpError);
        assert!(failure.is_rate_limited());
        assert!(failure.hint.contains("rate limited"));
    }

    #[test]
    fn network_failure_has_no_status() {
        let failure = FetchFailure::network("http://x/y", "connection reset");
        assert_eq!(failure.status, None);
        assert_eq!(failure.url, "http://x/y");
        assert!(!failure.is_rate_limited());
    }

    #[test]
    fn missing_configuration_lists_every_setting() {
        let err = PipelineError::MissingConfiguration {
            missing: vec!["A_KEY".to_string(), "B_URL".to_string()],
        };
        let failure = BuildFailure::from(err);
        assert_eq!(failure.missing, vec!["A_KEY", "B_URL"]);
        assert!(failure.hint.contains("A_KEY, B_URL"));
    }

    #[test]
    fn fetch_failure_converts_by_kind() {
        let err: PipelineError = FetchFailure::upstream("u", 500, "boom").into();
        assert!(matches!(err, PipelineError::UpstreamHttpError(_)));
        let err: PipelineError = FetchFailure::network("u", "timeout").into();
        assert!(matches!(err, PipelineError::NetworkFailure(_)));
    }
}
