//! Snapshot Normalizer
//!
//! Turns an arbitrary nested provider payload into a canonical [`Row`].
//!
//! # Resolution
//!
//! 1. Typed extractors ([`fields`]) try well-known paths in priority order
//! 2. A bounded breadth-first walk ([`walk`]) looks for alias keys
//! 3. The row is finalized: percentages, turnover, buckets and scores
//!
//! Canonical rows serialize with the same keys the extractors read first,
//! so feeding a serialized row back yields the same row.

pub mod fields;
pub mod shapes;
pub mod walk;

use serde_json::Value;

use super::row::{Row, RowSource, percent_change};
use super::scoring::ScoringConfig;
use super::session::{Session, SessionClassifier, to_epoch_millis};
use crate::error::{PipelineError, truncate_preview};

pub use shapes::extract_rows;

/// Normalizer with its session and scoring context.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    classifier: SessionClassifier,
    scoring: ScoringConfig,
}

impl Normalizer {
    /// Create a normalizer.
    #[must_use]
    pub const fn new(classifier: SessionClassifier, scoring: ScoringConfig) -> Self {
        Self {
            classifier,
            scoring,
        }
    }

    /// Scoring configuration in use.
    #[must_use]
    pub const fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Session classifier in use.
    #[must_use]
    pub const fn classifier(&self) -> &SessionClassifier {
        &self.classifier
    }

    /// Normalize one payload.
    ///
    /// `ticker` wins over any symbol inside the payload. `default_source`
    /// applies unless the payload names its own provenance.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` if no symbol can be determined or the payload is
    /// not an object.
    pub fn normalize(
        &self,
        ticker: &str,
        raw: &Value,
        default_source: RowSource,
    ) -> Result<Row, PipelineError> {
        let payload = shapes::unwrap_single(raw);
        if !payload.is_object() {
            return Err(PipelineError::MalformedPayload(truncate_preview(
                &raw.to_string(),
            )));
        }

        let symbol = Some(ticker.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .or_else(|| shapes::payload_symbol(payload))
            .ok_or_else(|| PipelineError::MalformedPayload(truncate_preview(&raw.to_string())))?;

        let source = payload
            .get("source")
            .and_then(|v| serde_json::from_value::<RowSource>(v.clone()).ok())
            .unwrap_or(default_source);

        let mut row = Row::new(&symbol, source);
        row.price = fields::PRICE.resolve(payload);
        row.open = fields::OPEN.resolve(payload);
        row.prev_close = fields::PREV_CLOSE.resolve(payload);
        row.volume = fields::VOLUME.resolve(payload);
        row.price_pct = fields::PRICE_PCT.resolve(payload);
        row.gap_pct = fields::GAP_PCT.resolve(payload);
        row.float_shares = fields::FLOAT_SHARES.resolve(payload);
        row.market_cap = fields::MARKET_CAP.resolve(payload);
        row.market_cap_estimated = read_bool(payload, "marketCapEstimated");
        row.vwap = fields::VWAP.resolve(payload);
        row.vwap_5m = fields::VWAP_5M.resolve(payload);
        row.sma20 = fields::SMA20.resolve(payload);
        row.ema9 = fields::EMA9.resolve(payload);
        row.ema20 = fields::EMA20.resolve(payload);
        row.ao = fields::AO.resolve(payload);
        row.volume_spike = read_bool(payload, "volumeSpike");
        row.halted = read_bool(payload, "halted");
        row.updated_at = fields::UPDATED.resolve(payload).and_then(to_epoch_millis);

        row.session = payload
            .get("session")
            .and_then(Value::as_str)
            .and_then(Session::from_str_case_insensitive)
            .or_else(|| row.updated_at.map(|ms| self.classifier.classify_millis(ms)));

        row.ext_pct = fields::EXT_PCT
            .resolve(payload)
            .or_else(|| derive_ext_pct(&row, fields::DAY_CLOSE.resolve(payload)));

        row.finalize(&self.scoring);
        Ok(row)
    }

    /// Normalize every row of a list payload.
    ///
    /// Items that fail are returned as `(index, error)` next to the rows.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` when the payload is not a known list shape.
    pub fn normalize_list(
        &self,
        payload: &Value,
        source: RowSource,
    ) -> Result<(Vec<Row>, Vec<(usize, PipelineError)>), PipelineError> {
        let items = extract_rows(payload)?;
        let mut rows = Vec::with_capacity(items.len());
        let mut failures = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match self.normalize("", item, source) {
                Ok(row) => rows.push(row),
                Err(err) => failures.push((index, err)),
            }
        }
        Ok((rows, failures))
    }
}

/// Normalize a payload with default session and scoring settings.
///
/// # Errors
///
/// See [`Normalizer::normalize`].
pub fn normalize_snapshot(ticker: &str, raw: &Value) -> Result<Row, PipelineError> {
    Normalizer::default().normalize(ticker, raw, RowSource::Snapshot)
}

fn read_bool(payload: &Value, key: &str) -> bool {
    payload.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Pre-market change vs previous close, after-hours change vs regular close.
fn derive_ext_pct(row: &Row, day_close: Option<f64>) -> Option<f64> {
    let price = row.price?;
    match row.session? {
        Session::Pre => row.prev_close.and_then(|prev| percent_change(price, prev)),
        Session::After => day_close.and_then(|close| percent_change(price, close)),
        Session::Regular | Session::Closed => None,
    }
}
