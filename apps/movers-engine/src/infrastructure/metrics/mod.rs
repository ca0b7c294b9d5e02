//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Remote calls**: outcome per upstream endpoint
//! - **Caches**: hits and misses per cache
//! - **Streams**: messages, dropped frames, reconnects, connection state
//! - **State tables**: halt and aggregate table sizes
//! - **Builds**: view build duration and outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the already installed handle.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "movers_remote_calls_total",
        "Upstream REST calls by endpoint and outcome"
    );
    describe_counter!(
        "movers_cache_lookups_total",
        "Cache lookups by cache and result"
    );
    describe_counter!(
        "movers_stream_messages_total",
        "Stream events received by channel and kind"
    );
    describe_counter!(
        "movers_stream_frames_dropped_total",
        "Malformed stream frames dropped"
    );
    describe_counter!(
        "movers_stream_reconnects_total",
        "Stream reconnection attempts"
    );
    describe_gauge!(
        "movers_stream_connected",
        "1 when the stream is authenticated and subscribed"
    );
    describe_gauge!("movers_halt_table_size", "Symbols in the halt table");
    describe_gauge!(
        "movers_aggregate_table_size",
        "Symbols in the minute-aggregate table"
    );
    describe_histogram!(
        "movers_view_build_seconds",
        "Time to build a ranked view"
    );
}

// =============================================================================
// Labels
// =============================================================================

/// Streaming channel label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Limit-up/limit-down halts.
    Halts,
    /// Minute aggregates.
    Aggregates,
}

impl Channel {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Halts => "halts",
            Self::Aggregates => "aggregates",
        }
    }
}

/// Upstream REST endpoint label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Gainers / losers list.
    Movers,
    /// Single-symbol snapshot.
    Snapshot,
    /// Full-market snapshot.
    FullMarket,
    /// Minute bars.
    Bars,
    /// Daily open / previous close.
    DailyOpen,
    /// Float shares.
    Float,
}

impl Endpoint {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Movers => "movers",
            Self::Snapshot => "snapshot",
            Self::FullMarket => "full_market",
            Self::Bars => "bars",
            Self::DailyOpen => "daily_open",
            Self::Float => "float",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one upstream call outcome (`ok` or a failure kind label).
pub fn record_remote_call(endpoint: Endpoint, outcome: &'static str) {
    counter!(
        "movers_remote_calls_total",
        "endpoint" => endpoint.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a cache lookup.
pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    counter!(
        "movers_cache_lookups_total",
        "cache" => cache,
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Record a stream event.
pub fn record_stream_message(channel: Channel, kind: &'static str) {
    counter!(
        "movers_stream_messages_total",
        "channel" => channel.as_str(),
        "kind" => kind
    )
    .increment(1);
}

/// Record a dropped malformed frame.
pub fn record_frame_dropped(channel: Channel) {
    counter!(
        "movers_stream_frames_dropped_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a stream reconnection attempt.
pub fn record_reconnect(channel: Channel) {
    counter!(
        "movers_stream_reconnects_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Set the stream connection gauge.
pub fn set_stream_connected(channel: Channel, connected: bool) {
    gauge!(
        "movers_stream_connected",
        "channel" => channel.as_str()
    )
    .set(if connected { 1.0 } else { 0.0 });
}

/// Set the halt table size.
#[allow(clippy::cast_precision_loss)]
pub fn set_halt_table_size(size: usize) {
    gauge!("movers_halt_table_size").set(size as f64);
}

/// Set the aggregate table size.
#[allow(clippy::cast_precision_loss)]
pub fn set_aggregate_table_size(size: usize) {
    gauge!("movers_aggregate_table_size").set(size as f64);
}

/// Record a view build.
pub fn record_view_build(view: &'static str, success: bool, duration: Duration) {
    histogram!(
        "movers_view_build_seconds",
        "view" => view,
        "outcome" => if success { "ok" } else { "failed" }
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_as_str() {
        assert_eq!(Channel::Halts.as_str(), "halts");
        assert_eq!(Channel::Aggregates.as_str(), "aggregates");
    }

    #[test]
    fn endpoint_as_str() {
        assert_eq!(Endpoint::Movers.as_str(), "movers");
        assert_eq!(Endpoint::FullMarket.as_str(), "full_market");
        assert_eq!(Endpoint::DailyOpen.as_str(), "daily_open");
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_remote_call(Endpoint::Snapshot, "ok");
        record_cache_lookup("bars", true);
        record_view_build("movers", true, Duration::from_millis(5));
    }
}
