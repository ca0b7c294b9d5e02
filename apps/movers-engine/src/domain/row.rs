//! Canonical Row
//!
//! One per-symbol record driving ranking and output. Rows are built fresh
//! per request and never persisted.
//!
//! # Invariants
//!
//! - `symbol` is non-empty and uppercase
//! - every percentage is rounded to 2 decimals
//! - `float_turnover_pct` is `Some` only when `float_shares > 0`
//! - `demand_score` is within `0..=5`

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::scoring::{self, BucketThresholds, ScoringConfig};
use super::session::Session;

/// Round to 2 decimals, midpoint away from zero.
///
/// Returns `None` for non-finite input or values outside the decimal range.
#[must_use]
pub fn round2(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
}

/// `(value - base) / base * 100`, rounded. `None` when base is zero.
#[must_use]
pub fn percent_change(value: f64, base: f64) -> Option<f64> {
    if base == 0.0 {
        return None;
    }
    round2((value - base) / base * 100.0)
}

/// Market capitalisation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapBucket {
    /// Below the small-cap ceiling.
    Small,
    /// Below the mid-cap ceiling.
    Mid,
    /// Everything larger.
    Big,
}

impl CapBucket {
    /// Bucket a market cap.
    #[must_use]
    pub fn classify(market_cap: f64, thresholds: &BucketThresholds) -> Self {
        if market_cap < thresholds.cap_small_below {
            Self::Small
        } else if market_cap < thresholds.cap_mid_below {
            Self::Mid
        } else {
            Self::Big
        }
    }
}

/// Free-float bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatBucket {
    /// Tiny float.
    Nano,
    /// Low float.
    Low,
    /// Mid float.
    Mid,
    /// High float.
    High,
}

impl FloatBucket {
    /// Bucket a float share count.
    #[must_use]
    pub fn classify(float_shares: f64, thresholds: &BucketThresholds) -> Self {
        if float_shares < thresholds.float_nano_below {
            Self::Nano
        } else if float_shares < thresholds.float_low_below {
            Self::Low
        } else if float_shares < thresholds.float_mid_below {
            Self::Mid
        } else {
            Self::High
        }
    }
}

/// Signal tag attached to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Last minute volume spiked over the rolling average.
    VolumeSpike,
    /// Price above the 5-minute VWAP.
    AboveVwap,
    /// Gap beyond the first gap threshold.
    BigGap,
    /// Float turned over at least once.
    HighTurnover,
    /// Trading halted.
    Halted,
}

impl Signal {
    /// Display icon.
    #[must_use]
    pub const fn icon(&self) -> &'static str {
        match self {
            Self::VolumeSpike => "🔥",
            Self::AboveVwap => "📈",
            Self::BigGap => "🚀",
            Self::HighTurnover => "🔄",
            Self::Halted => "⛔",
        }
    }
}

/// Where a row's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSource {
    /// Per-symbol snapshot endpoint.
    #[default]
    Snapshot,
    /// Gainers/losers list endpoint.
    Movers,
    /// Full-market snapshot endpoint.
    FullMarket,
    /// Minute-aggregate stream cache.
    Aggregate,
    /// Aggregate merged with an enriched snapshot.
    Merged,
    /// Ad hoc symbol scan.
    Scan,
}

/// Canonical per-symbol record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Row {
    /// Uppercase ticker.
    pub symbol: String,
    /// Last price.
    pub price: Option<f64>,
    /// Regular-session open.
    pub open: Option<f64>,
    /// Previous session close.
    pub prev_close: Option<f64>,
    /// Change vs previous close, percent.
    pub price_pct: Option<f64>,
    /// Open vs previous close, percent.
    pub gap_pct: Option<f64>,
    /// Extended-hours change, percent.
    pub ext_pct: Option<f64>,
    /// Session volume.
    pub volume: Option<f64>,
    /// Free-float share count.
    pub float_shares: Option<f64>,
    /// `volume / float_shares * 100`.
    pub float_turnover_pct: Option<f64>,
    /// Market capitalisation.
    pub market_cap: Option<f64>,
    /// Whether `market_cap` is the `price * float_shares` estimate.
    pub market_cap_estimated: bool,
    /// Market cap bucket.
    pub cap: Option<CapBucket>,
    /// Float bucket.
    pub float_bucket: Option<FloatBucket>,
    /// Demand score in `0..=5`.
    pub demand_score: u8,
    /// Signal tags.
    pub signals: Vec<Signal>,
    /// 20-period SMA of minute closes.
    pub sma20: Option<f64>,
    /// 9-period EMA of minute closes.
    pub ema9: Option<f64>,
    /// 20-period EMA of minute closes.
    pub ema20: Option<f64>,
    /// Session VWAP from minute bars.
    pub vwap: Option<f64>,
    /// VWAP of the last five minute bars.
    #[serde(rename = "vwap5m")]
    pub vwap_5m: Option<f64>,
    /// Awesome Oscillator.
    pub ao: Option<f64>,
    /// Last minute volume spiked.
    pub volume_spike: bool,
    /// Trading halted.
    pub halted: bool,
    /// Provenance.
    pub source: RowSource,
    /// Session of `updated_at`.
    pub session: Option<Session>,
    /// Last update, epoch milliseconds.
    pub updated_at: Option<i64>,
}

impl Row {
    /// Create an empty row for a symbol (uppercased and trimmed).
    #[must_use]
    pub fn new(symbol: &str, source: RowSource) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            source,
            ..Self::default()
        }
    }

    /// Recompute every derived field from the raw inputs.
    ///
    /// Explicit percentages are kept (rounded) when their inputs are
    /// missing. An explicit market cap is never replaced by an estimate.
    pub fn finalize(&mut self, config: &ScoringConfig) {
        self.symbol = self.symbol.trim().to_uppercase();

        self.price_pct = match (self.price, self.prev_close) {
            (Some(price), Some(prev)) if prev != 0.0 => percent_change(price, prev),
            _ => self.price_pct.and_then(round2),
        };
        self.gap_pct = match (self.open, self.prev_close) {
            (Some(open), Some(prev)) if prev != 0.0 => percent_change(open, prev),
            _ => self.gap_pct.and_then(round2),
        };
        self.ext_pct = self.ext_pct.and_then(round2);

        self.float_turnover_pct = match (self.volume, self.float_shares) {
            (Some(volume), Some(float)) => scoring::float_turnover_pct(volume, float),
            _ => None,
        };

        if self.market_cap.is_none() || self.market_cap_estimated {
            self.market_cap = None;
            self.market_cap_estimated = false;
            if let (Some(price), Some(float)) = (self.price, self.float_shares)
                && float > 0.0
            {
                self.market_cap = Some(price * float);
                self.market_cap_estimated = true;
            }
        }

        self.cap = self
            .market_cap
            .map(|cap| CapBucket::classify(cap, &config.buckets));
        self.float_bucket = self
            .float_shares
            .filter(|f| *f > 0.0)
            .map(|f| FloatBucket::classify(f, &config.buckets));

        self.demand_score = scoring::demand_score(self, config);
        self.signals = scoring::signals(self, config);
    }

    /// Copy non-null fields of `other` into `self`.
    ///
    /// A known value is never replaced with null.
    pub fn fill_from(&mut self, other: &Self) {
        fn fill(target: &mut Option<f64>, value: Option<f64>) {
            if value.is_some() {
                *target = value;
            }
        }
        fill(&mut self.price, other.price);
        fill(&mut self.open, other.open);
        fill(&mut self.prev_close, other.prev_close);
        fill(&mut self.price_pct, other.price_pct);
        fill(&mut self.gap_pct, other.gap_pct);
        fill(&mut self.ext_pct, other.ext_pct);
        fill(&mut self.volume, other.volume);
        fill(&mut self.float_shares, other.float_shares);
        fill(&mut self.sma20, other.sma20);
        fill(&mut self.ema9, other.ema9);
        fill(&mut self.ema20, other.ema20);
        fill(&mut self.vwap, other.vwap);
        fill(&mut self.vwap_5m, other.vwap_5m);
        fill(&mut self.ao, other.ao);
        if other.market_cap.is_some() && !other.market_cap_estimated {
            self.market_cap = other.market_cap;
            self.market_cap_estimated = false;
        }
        if other.updated_at.is_some() {
            self.updated_at = other.updated_at;
            self.session = other.session;
        }
        self.volume_spike |= other.volume_spike;
        self.halted |= other.halted;
    }

    /// Merge a real-time aggregate row over an enriched snapshot row.
    ///
    /// Price, volume and timestamp prefer the aggregate. Open, previous
    /// close and float prefer the snapshot. Nulls never win.
    #[must_use]
    pub fn merge_realtime(aggregate: &Self, snapshot: &Self, config: &ScoringConfig) -> Self {
        let mut merged = aggregate.clone();
        merged.fill_from(snapshot);

        merged.price = aggregate.price.or(snapshot.price);
        merged.volume = aggregate.volume.or(snapshot.volume);
        merged.open = snapshot.open.or(aggregate.open);
        merged.prev_close = snapshot.prev_close.or(aggregate.prev_close);
        merged.float_shares = snapshot.float_shares.or(aggregate.float_shares);
        if aggregate.updated_at.is_some() {
            merged.updated_at = aggregate.updated_at;
            merged.session = aggregate.session;
        }

        merged.source = RowSource::Merged;
        merged.finalize(config);
        merged
    }
}
