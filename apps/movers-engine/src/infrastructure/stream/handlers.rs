//! Ingest handlers applying decoded events to the shared tables.

use std::sync::Arc;

use super::messages::StreamFrame;
use crate::domain::aggregates::{AggregateStore, MinuteAggregate};
use crate::domain::halts::HaltStore;
use crate::infrastructure::metrics::{self, Channel};

/// Applies one channel's events.
pub trait IngestHandler: Send + Sync + 'static {
    /// Channel label.
    fn channel(&self) -> Channel;

    /// Subscription parameter, e.g. `LULD.*`.
    fn subscription(&self) -> &str;

    /// Apply one data event. Returns `false` when the event is not for
    /// this channel.
    fn handle(&self, frame: StreamFrame) -> bool;
}

/// Halt / resume ingester.
#[derive(Debug, Clone)]
pub struct HaltIngester {
    store: Arc<HaltStore>,
}

impl HaltIngester {
    /// Subscription for every symbol.
    pub const SUBSCRIPTION: &'static str = "LULD.*";

    /// Create an ingester writing to `store`.
    #[must_use]
    pub const fn new(store: Arc<HaltStore>) -> Self {
        Self { store }
    }
}

impl IngestHandler for HaltIngester {
    fn channel(&self) -> Channel {
        Channel::Halts
    }

    fn subscription(&self) -> &str {
        Self::SUBSCRIPTION
    }

    fn handle(&self, frame: StreamFrame) -> bool {
        let StreamFrame::Halt(msg) = frame else {
            return false;
        };
        let reason = msg.reason();
        if let Some(event) = self.store.apply_indicators(
            &msg.symbol,
            &msg.indicators,
            msg.timestamp_millis(),
            reason.as_deref(),
        ) {
            tracing::info!(symbol = %msg.symbol, event = event.as_str(), "halt state changed");
        }
        metrics::set_halt_table_size(self.store.len());
        true
    }
}

/// Minute-aggregate ingester.
#[derive(Debug, Clone)]
pub struct AggregateIngester {
    store: Arc<AggregateStore>,
}

impl AggregateIngester {
    /// Subscription for every symbol.
    pub const SUBSCRIPTION: &'static str = "AM.*";

    /// Create an ingester writing to `store`.
    #[must_use]
    pub const fn new(store: Arc<AggregateStore>) -> Self {
        Self { store }
    }
}

impl IngestHandler for AggregateIngester {
    fn channel(&self) -> Channel {
        Channel::Aggregates
    }

    fn subscription(&self) -> &str {
        Self::SUBSCRIPTION
    }

    fn handle(&self, frame: StreamFrame) -> bool {
        let StreamFrame::Aggregate(msg) = frame else {
            return false;
        };
        let evicted = self.store.upsert(MinuteAggregate::from(msg));
        if !evicted.is_empty() {
            tracing::debug!(evicted = evicted.len(), "aggregate table at capacity");
        }
        metrics::set_aggregate_table_size(self.store.len());
        true
    }
}
