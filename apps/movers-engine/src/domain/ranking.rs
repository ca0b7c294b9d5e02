//! Ranking Strategies
//!
//! Each strategy is a total order over rows built from an explicit
//! tiebreak chain. A missing sort key counts as zero and never removes the
//! row. Ties that survive the chain fall back to the symbol so output is
//! deterministic.
//!
//! | Strategy | Order |
//! |----------|-------|
//! | `gap` | `\|gap%\|` desc, volume desc |
//! | `active` | volume desc |
//! | `volatile` | volatility score desc, volume desc |
//! | `gapFloatRank` | `\|gap%\|` desc, float turnover desc, volume desc |

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::row::Row;
use super::scoring::volatility_score;

/// Named sort strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RankStrategy {
    /// Largest gaps first.
    Gap,
    /// Highest volume first.
    Active,
    /// Largest absolute move first.
    Volatile,
    /// Canonical mover rank: gap, then float turnover, then volume.
    #[default]
    GapFloatRank,
}

impl RankStrategy {
    /// Strategy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gap => "gap",
            Self::Active => "active",
            Self::Volatile => "volatile",
            Self::GapFloatRank => "gapFloatRank",
        }
    }

    /// Parse a strategy name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gap" | "gappers" => Some(Self::Gap),
            "active" | "volume" => Some(Self::Active),
            "volatile" | "volatility" => Some(Self::Volatile),
            "gapfloatrank" | "movers" | "gap_float_rank" => Some(Self::GapFloatRank),
            _ => None,
        }
    }

    /// Compare two rows under this strategy (`Less` sorts first).
    #[must_use]
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let primary = match self {
            Self::Gap => desc(abs_gap(a), abs_gap(b)).then_with(|| desc(volume(a), volume(b))),
            Self::Active => desc(volume(a), volume(b)),
            Self::Volatile => desc(volatility_score(a), volatility_score(b))
                .then_with(|| desc(volume(a), volume(b))),
            Self::GapFloatRank => desc(abs_gap(a), abs_gap(b))
                .then_with(|| desc(turnover(a), turnover(b)))
                .then_with(|| desc(volume(a), volume(b))),
        };
        primary.then_with(|| a.symbol.cmp(&b.symbol))
    }
}

/// Awesome Oscillator filter applied before sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AoFilter {
    /// Keep every row, including rows without an AO value.
    #[default]
    Off,
    /// Keep rows with AO > 0.
    Positive,
    /// Keep rows with AO < 0.
    Negative,
}

impl AoFilter {
    /// Filter name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }

    /// Parse a filter name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" | "" => Some(Self::Off),
            "positive" | "pos" | "bull" => Some(Self::Positive),
            "negative" | "neg" | "bear" => Some(Self::Negative),
            _ => None,
        }
    }

    /// Whether a row passes the filter.
    #[must_use]
    pub fn admits(&self, row: &Row) -> bool {
        match self {
            Self::Off => true,
            Self::Positive => row.ao.is_some_and(|ao| ao > 0.0),
            Self::Negative => row.ao.is_some_and(|ao| ao < 0.0),
        }
    }
}

/// Ranking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RankParams {
    /// Maximum rows returned (`None` = all).
    pub limit: Option<usize>,
    /// Oscillator filter.
    pub ao_filter: AoFilter,
}

/// Sort rows by a named strategy, apply the AO filter, then truncate.
#[must_use]
pub fn build_ranking(view: RankStrategy, rows: Vec<Row>, params: &RankParams) -> Vec<Row> {
    let mut ranked: Vec<Row> = rows
        .into_iter()
        .filter(|row| params.ao_filter.admits(row))
        .collect();
    ranked.sort_by(|a, b| view.compare(a, b));
    if let Some(limit) = params.limit {
        ranked.truncate(limit);
    }
    ranked
}

fn desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

fn abs_gap(row: &Row) -> f64 {
    sanitize(row.gap_pct).abs()
}

fn volume(row: &Row) -> f64 {
    sanitize(row.volume)
}

fn turnover(row: &Row) -> f64 {
    sanitize(row.float_turnover_pct)
}

fn sanitize(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::row::RowSource;
    use proptest::prelude::*;

    fn row(symbol: &str, gap: Option<f64>, turnover: Option<f64>, volume: Option<f64>) -> Row {
        Row {
            gap_pct: gap,
            float_turnover_pct: turnover,
            volume,
            ..Row::new(symbol, RowSource::Snapshot)
        }
    }

    fn symbols(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r.symbol.as_str()).collect()
    }

    #[test]
    fn gap_float_rank_orders_by_gap_then_turnover() {
        let rows = vec![
            row("A", Some(5.0), Some(10.0), Some(100.0)),
            row("B", Some(20.0), Some(1.0), Some(50.0)),
            row("C", Some(20.0), Some(5.0), Some(1000.0)),
        ];
        let ranked = build_ranking(RankStrategy::GapFloatRank, rows, &RankParams::default());
        assert_eq!(symbols(&ranked), vec!["C", "B", "A"]);
    }

    #[test]
    fn gap_uses_absolute_value() {
        let rows = vec![
            row("UP", Some(15.0), None, Some(10.0)),
            row("DOWN", Some(-30.0), None, Some(10.0)),
        ];
        let ranked = build_ranking(RankStrategy::Gap, rows, &RankParams::default());
        assert_eq!(symbols(&ranked), vec!["DOWN", "UP"]);
    }

    #[test]
    fn missing_keys_sort_as_zero_and_are_kept() {
        let rows = vec![
            row("NONE", None, None, None),
            row("SOME", None, None, Some(1.0)),
        ];
        let ranked = build_ranking(RankStrategy::Active, rows, &RankParams::default());
        assert_eq!(symbols(&ranked), vec!["SOME", "NONE"]);
    }

    #[test]
    fn volatile_uses_volatility_score() {
        let mut a = row("A", Some(2.0), None, Some(1.0));
        a.ext_pct = Some(-50.0);
        let b = row("B", Some(10.0), None, Some(1.0));
        let ranked = build_ranking(RankStrategy::Volatile, vec![b, a], &RankParams::default());
        assert_eq!(symbols(&ranked), vec!["A", "B"]);
    }

    #[test]
    fn ao_filter_drops_null_unless_off() {
        let mut pos = row("POS", None, None, None);
        pos.ao = Some(0.5);
        let mut neg = row("NEG", None, None, None);
        neg.ao = Some(-0.5);
        let null = row("NUL", None, None, None);
        let rows = vec![pos, neg, null];

        let off = build_ranking(RankStrategy::Active, rows.clone(), &RankParams::default());
        assert_eq!(off.len(), 3);

        let params = RankParams {
            limit: None,
            ao_filter: AoFilter::Positive,
        };
        assert_eq!(symbols(&build_ranking(RankStrategy::Active, rows.clone(), &params)), vec!["POS"]);

        let params = RankParams {
            limit: None,
            ao_filter: AoFilter::Negative,
        };
        assert_eq!(symbols(&build_ranking(RankStrategy::Active, rows, &params)), vec!["NEG"]);
    }

    #[test]
    fn limit_truncates_after_sort() {
        let rows = (0..10)
            .map(|i| row(&format!("S{i}"), None, None, Some(f64::from(i))))
            .collect();
        let params = RankParams {
            limit: Some(3),
            ao_filter: AoFilter::Off,
        };
        let ranked = build_ranking(RankStrategy::Active, rows, &params);
        assert_eq!(symbols(&ranked), vec!["S9", "S8", "S7"]);
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!(
            RankStrategy::from_str_case_insensitive("gapFloatRank"),
            Some(RankStrategy::GapFloatRank)
        );
        assert_eq!(RankStrategy::from_str_case_insensitive("ACTIVE"), Some(RankStrategy::Active));
        assert_eq!(RankStrategy::from_str_case_insensitive("foo"), None);
        assert_eq!(AoFilter::from_str_case_insensitive("Positive"), Some(AoFilter::Positive));
    }

    fn arb_row() -> impl Strategy<Value = Row> {
        (
            "[A-Z]{1,4}",
            proptest::option::of(-100.0f64..100.0),
            proptest::option::of(0.0f64..500.0),
            proptest::option::of(0.0f64..1e7),
        )
            .prop_map(|(s, g, t, v)| row(&s, g, t, v))
    }

    proptest! {
        #[test]
        fn ranking_never_drops_rows(rows in proptest::collection::vec(arb_row(), 0..40)) {
            for view in [RankStrategy::Gap, RankStrategy::Active, RankStrategy::Volatile, RankStrategy::GapFloatRank] {
                let ranked = build_ranking(view, rows.clone(), &RankParams::default());
                prop_assert_eq!(ranked.len(), rows.len());
            }
        }

        #[test]
        fn gap_float_rank_is_sorted(rows in proptest::collection::vec(arb_row(), 0..40)) {
            let ranked = build_ranking(RankStrategy::GapFloatRank, rows, &RankParams::default());
            for pair in ranked.windows(2) {
                prop_assert_ne!(
                    RankStrategy::GapFloatRank.compare(&pair[0], &pair[1]),
                    Ordering::Greater
                );
                prop_assert!(abs_gap(&pair[0]) >= abs_gap(&pair[1]));
            }
        }
    }
}
