//! Indicator Engine
//!
//! Technical indicators over minute bars. Upstream delivers bars
//! newest-first; [`IndicatorSnapshot::compute`] reverses them into
//! chronological order before any calculation.
//!
//! The series functions take chronological input and return
//! [`PipelineError::InsufficientHistory`] when there are too few bars. The
//! snapshot maps that to `None` so callers only ever see null fields.
//!
//! # Formulas
//!
//! - `SMA(n)`: mean of the last `n` closes
//! - `EMA(n)`: seeded with `SMA(n)` of the first `n` closes, then
//!   `ema[i] = close[i] * k + ema[i-1] * (1 - k)` with `k = 2 / (n + 1)`
//! - `VWAP`: `sum(typical * volume) / sum(volume)` over bars with volume > 0
//! - `AO`: `SMA(5) - SMA(34)` of the median price, needs 35 bars

use serde::{Deserialize, Serialize};

use super::bar::Bar;
use super::row::{Row, round2};
use crate::error::PipelineError;

/// Bars required before the Awesome Oscillator is defined.
pub const AO_MIN_BARS: usize = 35;

const AO_FAST: usize = 5;
const AO_SLOW: usize = 34;
const VWAP_SHORT_BARS: usize = 5;

/// Volume-spike detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeConfig {
    /// Bars averaged before the last one.
    pub window: usize,
    /// Last volume must reach `average * multiplier`.
    pub multiplier: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            window: 20,
            multiplier: 1.5,
        }
    }
}

fn require(needed: usize, available: usize) -> Result<(), PipelineError> {
    if needed == 0 || available < needed {
        return Err(PipelineError::InsufficientHistory { needed, available });
    }
    Ok(())
}

/// Trailing simple moving average of the last `len` values.
///
/// # Errors
///
/// `InsufficientHistory` if fewer than `len` values (or `len == 0`).
#[allow(clippy::cast_precision_loss)]
pub fn sma(values: &[f64], len: usize) -> Result<f64, PipelineError> {
    require(len, values.len())?;
    let tail = &values[values.len() - len..];
    Ok(tail.iter().sum::<f64>() / len as f64)
}

/// Full EMA series, one value per input from index `len - 1` onward.
///
/// # Errors
///
/// `InsufficientHistory` if fewer than `len` values (or `len == 0`).
#[allow(clippy::cast_precision_loss)]
pub fn ema_series(values: &[f64], len: usize) -> Result<Vec<f64>, PipelineError> {
    require(len, values.len())?;
    let k = 2.0 / (len as f64 + 1.0);

    let seed = values[..len].iter().sum::<f64>() / len as f64;
    let mut series = Vec::with_capacity(values.len() - len + 1);
    series.push(seed);

    let mut prev = seed;
    for value in &values[len..] {
        prev = value * k + prev * (1.0 - k);
        series.push(prev);
    }
    Ok(series)
}

/// Latest EMA value.
///
/// # Errors
///
/// `InsufficientHistory` if fewer than `len` values (or `len == 0`).
pub fn ema(values: &[f64], len: usize) -> Result<f64, PipelineError> {
    let series = ema_series(values, len)?;
    series
        .last()
        .copied()
        .ok_or(PipelineError::InsufficientHistory {
            needed: len,
            available: values.len(),
        })
}

/// Volume-weighted average price, skipping bars with non-positive volume.
///
/// # Errors
///
/// `InsufficientHistory` if no bar carries volume.
pub fn vwap(bars: &[Bar]) -> Result<f64, PipelineError> {
    let (pv, vol) = bars
        .iter()
        .filter(|b| b.volume > 0.0 && b.volume.is_finite())
        .fold((0.0, 0.0), |(pv, vol), b| {
            (pv + b.typical_price() * b.volume, vol + b.volume)
        });
    if vol <= 0.0 {
        return Err(PipelineError::InsufficientHistory {
            needed: 1,
            available: 0,
        });
    }
    Ok(pv / vol)
}

/// Awesome Oscillator: `SMA(5) - SMA(34)` of median price.
///
/// # Errors
///
/// `InsufficientHistory` if fewer than [`AO_MIN_BARS`] bars.
pub fn awesome_oscillator(bars: &[Bar]) -> Result<f64, PipelineError> {
    require(AO_MIN_BARS, bars.len())?;
    let medians: Vec<f64> = bars.iter().map(Bar::median_price).collect();
    Ok(sma(&medians, AO_FAST)? - sma(&medians, AO_SLOW)?)
}

/// Whether the last bar's volume reaches `average(window) * multiplier`.
///
/// The average covers up to `window` bars before the last one. Fewer than
/// two bars, or a zero average, never spike.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn volume_spike(bars: &[Bar], config: &SpikeConfig) -> bool {
    let Some((last, history)) = bars.split_last() else {
        return false;
    };
    if history.is_empty() || config.window == 0 {
        return false;
    }
    let start = history.len().saturating_sub(config.window);
    let window = &history[start..];
    let average = window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64;
    average > 0.0 && last.volume >= average * config.multiplier
}

/// Indicator values for one symbol, each rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSnapshot {
    /// SMA(20) of closes.
    pub sma20: Option<f64>,
    /// EMA(9) of closes.
    pub ema9: Option<f64>,
    /// EMA(20) of closes.
    pub ema20: Option<f64>,
    /// VWAP over every bar.
    pub vwap: Option<f64>,
    /// VWAP over the last five bars.
    pub vwap_5m: Option<f64>,
    /// Awesome Oscillator.
    pub ao: Option<f64>,
    /// Volume-spike flag.
    pub volume_spike: bool,
}

impl IndicatorSnapshot {
    /// Compute indicators from newest-first bars.
    #[must_use]
    pub fn compute(bars_newest_first: &[Bar], spike: &SpikeConfig) -> Self {
        let mut bars = bars_newest_first.to_vec();
        bars.reverse();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let short = &bars[bars.len().saturating_sub(VWAP_SHORT_BARS)..];

        Self {
            sma20: sma(&closes, 20).ok().and_then(round2),
            ema9: ema(&closes, 9).ok().and_then(round2),
            ema20: ema(&closes, 20).ok().and_then(round2),
            vwap: vwap(&bars).ok().and_then(round2),
            vwap_5m: vwap(short).ok().and_then(round2),
            ao: awesome_oscillator(&bars).ok().and_then(round2),
            volume_spike: volume_spike(&bars, spike),
        }
    }

    /// Copy indicator fields onto a row (caller re-finalizes).
    pub fn apply_to(&self, row: &mut Row) {
        row.sma20 = self.sma20;
        row.ema9 = self.ema9;
        row.ema20 = self.ema20;
        row.vwap = self.vwap;
        row.vwap_5m = self.vwap_5m;
        row.ao = self.ao;
        row.volume_spike = self.volume_spike;
    }
}
