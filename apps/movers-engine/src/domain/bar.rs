//! OHLCV bar types shared by the indicator engine, caches and ports.

use serde::{Deserialize, Serialize};

/// Bar aggregation timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// One-minute bars.
    #[default]
    Minute,
    /// Five-minute bars.
    FiveMinute,
}

impl Timeframe {
    /// Bar multiplier in minutes.
    #[must_use]
    pub const fn minutes(&self) -> u32 {
        match self {
            Self::Minute => 1,
            Self::FiveMinute => 5,
        }
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar start, epoch milliseconds.
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
    /// Open price.
    #[serde(rename = "o")]
    pub open: f64,
    /// High price.
    #[serde(rename = "h")]
    pub high: f64,
    /// Low price.
    #[serde(rename = "l")]
    pub low: f64,
    /// Close price.
    #[serde(rename = "c")]
    pub close: f64,
    /// Volume traded during the bar.
    #[serde(rename = "v")]
    pub volume: f64,
}

impl Bar {
    /// Median price `(high + low) / 2`.
    #[must_use]
    pub fn median_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// Typical price `(high + low + close) / 3`.
    #[must_use]
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Regular-session open and previous close for one exchange-local date.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyOpenClose {
    /// Regular-session open.
    pub open: Option<f64>,
    /// Previous session close.
    pub prev_close: Option<f64>,
}

/// One point of a mini chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Bar start, epoch milliseconds.
    pub t: i64,
    /// Close price.
    pub c: f64,
}

/// Close-price sparkline for a symbol, oldest point first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MiniChart {
    /// Uppercase ticker.
    pub symbol: String,
    /// Points in chronological order.
    pub points: Vec<ChartPoint>,
}

impl MiniChart {
    /// Build from newest-first bars.
    #[must_use]
    pub fn from_bars(symbol: &str, bars_newest_first: &[Bar]) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            points: bars_newest_first
                .iter()
                .rev()
                .map(|b| ChartPoint {
                    t: b.timestamp_ms,
                    c: b.close,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_prices() {
        let bar = Bar {
            timestamp_ms: 0,
            open: 1.0,
            high: 4.0,
            low: 2.0,
            close: 3.0,
            volume: 10.0,
        };
        assert!((bar.median_price() - 3.0).abs() < f64::EPSILON);
        assert!((bar.typical_price() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bar_wire_names() {
        let bar: Bar =
            serde_json::from_str(r#"{"t":1,"o":1.0,"h":2.0,"l":0.5,"c":1.5,"v":100}"#).unwrap();
        assert_eq!(bar.timestamp_ms, 1);
        assert!((bar.volume - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mini_chart_is_chronological() {
        let bars: Vec<Bar> = [3, 2, 1]
            .into_iter()
            .map(|i| Bar {
                timestamp_ms: i,
                open: 0.0,
                high: 0.0,
                low: 0.0,
                close: f64::from(u8::try_from(i).unwrap_or(0)),
                volume: 0.0,
            })
            .collect();
        let chart = MiniChart::from_bars("abc", &bars);
        assert_eq!(chart.symbol, "ABC");
        assert_eq!(chart.points.iter().map(|p| p.t).collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
