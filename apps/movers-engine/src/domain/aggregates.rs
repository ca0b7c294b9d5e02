//! Minute-aggregate table fed by the `AM.*` stream.
//!
//! Keeps the latest aggregate per symbol with its receipt time. Bounded by
//! capacity: on overflow the symbol whose latest update is oldest is
//! evicted, regardless of age.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::row::{Row, RowSource};
use super::session::SessionClassifier;

/// One minute aggregate for a symbol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinuteAggregate {
    /// Uppercase ticker.
    pub symbol: String,
    /// Bar open.
    pub open: f64,
    /// Bar high.
    pub high: f64,
    /// Bar low.
    pub low: f64,
    /// Bar close.
    pub close: f64,
    /// Bar volume.
    pub volume: f64,
    /// Volume accumulated over the day.
    pub accumulated_volume: Option<f64>,
    /// Official open of the day.
    pub official_open: Option<f64>,
    /// Bar VWAP.
    pub vwap: Option<f64>,
    /// Day VWAP.
    pub day_vwap: Option<f64>,
    /// Bar start, epoch milliseconds.
    pub start_ms: i64,
    /// Bar end, epoch milliseconds.
    pub end_ms: i64,
}

impl MinuteAggregate {
    /// Volume used for ranking: day volume when known, else the bar's.
    #[must_use]
    pub fn ranking_volume(&self) -> f64 {
        self.accumulated_volume.unwrap_or(self.volume)
    }

    /// Project onto an unfinalized row.
    #[must_use]
    pub fn to_row(&self, classifier: &SessionClassifier) -> Row {
        let mut row = Row::new(&self.symbol, RowSource::Aggregate);
        row.price = Some(self.close).filter(|p| p.is_finite() && *p > 0.0);
        row.volume = Some(self.ranking_volume());
        row.open = self.official_open;
        let ts = if self.end_ms > 0 { self.end_ms } else { self.start_ms };
        if ts > 0 {
            row.updated_at = Some(ts);
            row.session = Some(classifier.classify_millis(ts));
        }
        row
    }
}

#[derive(Debug)]
struct Entry {
    aggregate: MinuteAggregate,
    received_at: Instant,
    sequence: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    order: VecDeque<(u64, String)>,
    next_sequence: u64,
}

impl Inner {
    fn compact(&mut self) {
        let mut live: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|(s, e)| (e.sequence, s.clone()))
            .collect();
        live.sort_unstable_by_key(|(seq, _)| *seq);
        self.order = live.into();
    }
}

/// Capacity-bounded latest-aggregate table.
#[derive(Debug)]
pub struct AggregateStore {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl AggregateStore {
    /// Create a store holding at most `capacity` symbols (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Maximum number of symbols.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert or replace a symbol's aggregate, received now.
    ///
    /// Returns the symbols evicted to stay within capacity.
    pub fn upsert(&self, aggregate: MinuteAggregate) -> Vec<String> {
        self.upsert_at(aggregate, Instant::now())
    }

    /// Insert or replace a symbol's aggregate with an explicit receipt time.
    pub fn upsert_at(&self, mut aggregate: MinuteAggregate, received_at: Instant) -> Vec<String> {
        aggregate.symbol = aggregate.symbol.trim().to_uppercase();
        if aggregate.symbol.is_empty() {
            return Vec::new();
        }

        let mut inner = self.inner.lock();
        inner.next_sequence += 1;
        let sequence = inner.next_sequence;
        let symbol = aggregate.symbol.clone();

        inner.order.push_back((sequence, symbol.clone()));
        inner.entries.insert(
            symbol,
            Entry {
                aggregate,
                received_at,
                sequence,
            },
        );

        let mut evicted = Vec::new();
        while inner.entries.len() > self.capacity {
            let Some((seq, oldest)) = inner.order.pop_front() else {
                break;
            };
            if inner.entries.get(&oldest).is_some_and(|e| e.sequence == seq) {
                inner.entries.remove(&oldest);
                evicted.push(oldest);
            }
        }

        if inner.order.len() > self.capacity.saturating_mul(4) {
            inner.compact();
        }
        evicted
    }

    /// Latest aggregate for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<MinuteAggregate> {
        self.inner
            .lock()
            .entries
            .get(&symbol.to_uppercase())
            .map(|e| e.aggregate.clone())
    }

    /// Receipt time of a symbol's latest aggregate.
    #[must_use]
    pub fn received_at(&self, symbol: &str) -> Option<Instant> {
        self.inner
            .lock()
            .entries
            .get(&symbol.to_uppercase())
            .map(|e| e.received_at)
    }

    /// Every aggregate currently held, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MinuteAggregate> {
        self.inner
            .lock()
            .entries
            .values()
            .map(|e| e.aggregate.clone())
            .collect()
    }

    /// Number of symbols held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(symbol: &str, close: f64) -> MinuteAggregate {
        MinuteAggregate {
            symbol: symbol.to_string(),
            close,
            volume: 10.0,
            ..MinuteAggregate::default()
        }
    }

    #[test]
    fn evicts_oldest_received_on_overflow() {
        let store = AggregateStore::new(2);
        assert!(store.upsert(agg("a", 1.0)).is_empty());
        assert!(store.upsert(agg("b", 1.0)).is_empty());
        assert_eq!(store.upsert(agg("c", 1.0)), vec!["A"]);
        assert_eq!(store.len(), 2);
        assert!(store.get("A").is_none());
    }

    #[test]
    fn update_refreshes_receipt_order() {
        let store = AggregateStore::new(2);
        store.upsert(agg("A", 1.0));
        store.upsert(agg("B", 1.0));
        store.upsert(agg("A", 2.0));
        assert_eq!(store.upsert(agg("C", 1.0)), vec!["B"]);
        assert_eq!(store.get("A").map(|a| a.close), Some(2.0));
    }

    #[test]
    fn repeated_updates_stay_bounded() {
        let store = AggregateStore::new(3);
        for i in 0..1_000 {
            store.upsert(agg(&format!("S{}", i % 5), f64::from(i)));
        }
        assert_eq!(store.len(), 3);
        assert!(store.inner.lock().order.len() <= 12 + 1);
    }

    #[test]
    fn to_row_classifies_session() {
        let mut aggregate = agg("ROW", 4.2);
        aggregate.accumulated_volume = Some(12_345.0);
        // 2024-01-01T09:00 New York
        aggregate.end_ms = 1_704_117_600_000;
        let row = aggregate.to_row(&SessionClassifier::default());
        assert_eq!(row.price, Some(4.2));
        assert_eq!(row.volume, Some(12_345.0));
        assert_eq!(row.source, RowSource::Aggregate);
        assert_eq!(row.session, Some(crate::domain::session::Session::Pre));
    }
}
