//! Domain Layer - Canonical rows and pure market-data algorithms.
//!
//! Nothing in this layer performs I/O. The two socket-fed stores
//! ([`halts::HaltStore`], [`aggregates::AggregateStore`]) are plain
//! lock-guarded maps injected into the builders.

/// Minute-aggregate table with capacity eviction.
pub mod aggregates;

/// OHLCV bar types.
pub mod bar;

/// Halt / resume table.
pub mod halts;

/// SMA, EMA, VWAP, Awesome Oscillator, volume spikes.
pub mod indicators;

/// Payload to row normalization.
pub mod normalize;

/// Sort strategies and the AO filter.
pub mod ranking;

/// Canonical row and rounding.
pub mod row;

/// Turnover, volatility, demand scores and signals.
pub mod scoring;

/// Session classification.
pub mod session;
