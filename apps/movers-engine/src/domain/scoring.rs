//! Derived metrics: float turnover, volatility and demand scores, signals.

use serde::{Deserialize, Serialize};

use super::row::{Row, Signal, round2};

/// Highest demand score a row can reach.
pub const MAX_DEMAND_SCORE: u8 = 5;

/// Cap and float bucket boundaries (exclusive upper bounds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketThresholds {
    /// Market cap below this is small.
    pub cap_small_below: f64,
    /// Market cap below this (and not small) is mid.
    pub cap_mid_below: f64,
    /// Float below this is nano.
    pub float_nano_below: f64,
    /// Float below this is low.
    pub float_low_below: f64,
    /// Float below this is mid.
    pub float_mid_below: f64,
}

impl Default for BucketThresholds {
    fn default() -> Self {
        Self {
            cap_small_below: 2_000_000_000.0,
            cap_mid_below: 10_000_000_000.0,
            float_nano_below: 10_000_000.0,
            float_low_below: 20_000_000.0,
            float_mid_below: 50_000_000.0,
        }
    }
}

/// Demand score and signal tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Each `|gap%|` threshold crossed adds one point.
    pub gap_thresholds: Vec<f64>,
    /// Each `|price%|` threshold crossed adds one point.
    pub price_pct_thresholds: Vec<f64>,
    /// Float turnover at or above this raises the turnover signal.
    pub high_turnover_pct: f64,
    /// Bucket boundaries.
    pub buckets: BucketThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            gap_thresholds: vec![20.0, 40.0, 60.0],
            price_pct_thresholds: vec![10.0, 20.0],
            high_turnover_pct: 100.0,
            buckets: BucketThresholds::default(),
        }
    }
}

/// `volume / float_shares * 100`, rounded. `None` unless float > 0.
#[must_use]
pub fn float_turnover_pct(volume: f64, float_shares: f64) -> Option<f64> {
    if float_shares > 0.0 {
        round2(volume / float_shares * 100.0)
    } else {
        None
    }
}

/// `max(|gap%|, |price%|, |ext%|)`, missing values counting as zero.
#[must_use]
pub fn volatility_score(row: &Row) -> f64 {
    [row.gap_pct, row.price_pct, row.ext_pct]
        .into_iter()
        .map(|v| v.unwrap_or(0.0).abs())
        .fold(0.0, f64::max)
}

/// Whether price trades above the 5-minute VWAP on a volume spike.
#[must_use]
pub fn momentum_confirmed(row: &Row) -> bool {
    matches!((row.price, row.vwap_5m), (Some(p), Some(v)) if p > v) && row.volume_spike
}

/// Demand score clamped to `0..=5`.
#[must_use]
pub fn demand_score(row: &Row, config: &ScoringConfig) -> u8 {
    let gap = row.gap_pct.unwrap_or(0.0).abs();
    let price = row.price_pct.unwrap_or(0.0).abs();

    let crossed = config.gap_thresholds.iter().filter(|t| gap >= **t).count()
        + config
            .price_pct_thresholds
            .iter()
            .filter(|t| price >= **t)
            .count()
        + usize::from(momentum_confirmed(row));

    u8::try_from(crossed)
        .unwrap_or(MAX_DEMAND_SCORE)
        .min(MAX_DEMAND_SCORE)
}

/// Signal tags for a finalized row, in display order.
#[must_use]
pub fn signals(row: &Row, config: &ScoringConfig) -> Vec<Signal> {
    let mut out = Vec::new();
    if row.halted {
        out.push(Signal::Halted);
    }
    if let (Some(gap), Some(first)) = (row.gap_pct, config.gap_thresholds.first())
        && gap.abs() >= *first
    {
        out.push(Signal::BigGap);
    }
    if row.volume_spike {
        out.push(Signal::VolumeSpike);
    }
    if matches!((row.price, row.vwap_5m), (Some(p), Some(v)) if p > v) {
        out.push(Signal::AboveVwap);
    }
    if row
        .float_turnover_pct
        .is_some_and(|t| t >= config.high_turnover_pct)
    {
        out.push(Signal::HighTurnover);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::row::RowSource;
    use proptest::prelude::*;

    fn row_with(gap: Option<f64>, price_pct: Option<f64>, ext: Option<f64>) -> Row {
        Row {
            gap_pct: gap,
            price_pct,
            ext_pct: ext,
            ..Row::new("X", RowSource::Snapshot)
        }
    }

    #[test]
    fn volatility_takes_largest_magnitude() {
        let row = row_with(Some(-30.0), Some(12.0), Some(45.5));
        assert!((volatility_score(&row) - 45.5).abs() < f64::EPSILON);
        assert!(volatility_score(&row_with(None, None, None)).abs() < f64::EPSILON);
    }

    #[test]
    fn demand_counts_thresholds() {
        let config = ScoringConfig::default();
        assert_eq!(demand_score(&row_with(Some(25.0), Some(5.0), None), &config), 1);
        assert_eq!(demand_score(&row_with(Some(-45.0), Some(-15.0), None), &config), 3);
        assert_eq!(demand_score(&row_with(Some(61.0), Some(21.0), None), &config), 5);
    }

    #[test]
    fn momentum_point_needs_both_vwap_and_spike() {
        let config = ScoringConfig::default();
        let mut row = row_with(None, None, None);
        row.price = Some(10.0);
        row.vwap_5m = Some(9.5);
        assert_eq!(demand_score(&row, &config), 0);
        row.volume_spike = true;
        assert_eq!(demand_score(&row, &config), 1);
        row.vwap_5m = Some(10.5);
        assert_eq!(demand_score(&row, &config), 0);
    }

    #[test]
    fn turnover_is_null_without_float() {
        assert_eq!(float_turnover_pct(100.0, 0.0), None);
        assert_eq!(float_turnover_pct(100.0, -1.0), None);
        assert_eq!(float_turnover_pct(1.0, 3.0), Some(33.33));
    }

    #[test]
    fn signals_reflect_row_state() {
        let config = ScoringConfig::default();
        let mut row = row_with(Some(22.0), None, None);
        row.halted = true;
        row.float_turnover_pct = Some(150.0);
        assert_eq!(
            signals(&row, &config),
            vec![Signal::Halted, Signal::BigGap, Signal::HighTurnover]
        );
    }

    proptest! {
        #[test]
        fn demand_score_is_bounded(
            gap in proptest::option::of(-1_000.0f64..1_000.0),
            price_pct in proptest::option::of(-1_000.0f64..1_000.0),
            price in proptest::option::of(0.01f64..1_000.0),
            vwap in proptest::option::of(0.01f64..1_000.0),
            spike in any::<bool>(),
        ) {
            let mut row = row_with(gap, price_pct, None);
            row.price = price;
            row.vwap_5m = vwap;
            row.volume_spike = spike;
            let score = demand_score(&row, &ScoringConfig::default());
            prop_assert!(score <= MAX_DEMAND_SCORE);
        }

        #[test]
        fn turnover_matches_formula(volume in 0.0f64..1e10, float in 1.0f64..1e10) {
            let turnover = float_turnover_pct(volume, float);
            prop_assert_eq!(turnover, round2(volume / float * 100.0));
        }
    }
}
