//! TTL Cache Layer
//!
//! Independent in-memory maps with per-entry TTL. Expiry is checked lazily
//! on read; an expired entry reads as absent and is replaced on the next
//! successful fetch. Reads never perform I/O, and only successful fetches
//! are inserted.
//!
//! | Cache | Key | Default TTL |
//! |-------|-----|-------------|
//! | minute bars | symbol + timeframe | 15s |
//! | float shares | symbol | 24h |
//! | daily open / prev close | symbol + exchange-local date | 6h |
//! | mini-chart | symbol | 15s |
//! | enriched rows | symbol | 15s |

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::domain::bar::{Bar, DailyOpenClose, MiniChart, Timeframe};
use crate::domain::row::Row;
use crate::infrastructure::config::CacheTtls;
use crate::infrastructure::metrics;

/// A cached value with its insertion time and TTL.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// Cached value.
    pub value: T,
    /// Insertion time.
    pub inserted_at: Instant,
    /// Time to live.
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Valid iff `now - inserted_at < ttl`.
    #[must_use]
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) < self.ttl
    }
}

/// Lock-guarded TTL map.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache.
    #[must_use]
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cache name, used as metric label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Value for `key` if present and unexpired.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Value for `key` if valid at `now`.
    #[must_use]
    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let value = self
            .entries
            .read()
            .get(key)
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| entry.value.clone());
        metrics::record_cache_lookup(self.name, value.is_some());
        value
    }

    /// Insert or replace a value, timestamped now.
    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// Insert or replace a value with an explicit insertion time.
    pub fn insert_at(&self, key: K, value: V, inserted_at: Instant) {
        self.entries.write().insert(
            key,
            CacheEntry {
                value,
                inserted_at,
                ttl: self.ttl,
            },
        );
    }

    /// Drop every entry expired at `now`. Returns the number removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid_at(now));
        before - entries.len()
    }

    /// Number of entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// The caches shared by every builder.
#[derive(Debug)]
pub struct CacheLayer {
    /// Minute bars, newest-first.
    pub bars: TtlCache<(String, Timeframe), Vec<Bar>>,
    /// Float share counts.
    pub floats: TtlCache<String, f64>,
    /// Daily open / previous close per exchange-local date.
    pub daily: TtlCache<(String, NaiveDate), DailyOpenClose>,
    /// Mini-chart payloads.
    pub charts: TtlCache<String, MiniChart>,
    /// Enriched snapshot rows for the aggregate fallback.
    pub enriched_rows: TtlCache<String, Row>,
}

impl CacheLayer {
    /// Create every cache with its TTL.
    #[must_use]
    pub fn new(ttls: &CacheTtls) -> Self {
        Self {
            bars: TtlCache::new("bars", ttls.bars),
            floats: TtlCache::new("float", ttls.floats),
            daily: TtlCache::new("daily_open", ttls.daily),
            charts: TtlCache::new("mini_chart", ttls.charts),
            enriched_rows: TtlCache::new("enriched_row", ttls.enriched_rows),
        }
    }

    /// Purge expired entries from every cache.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.bars.purge_expired(now)
            + self.floats.purge_expired(now)
            + self.daily.purge_expired(now)
            + self.charts.purge_expired(now)
            + self.enriched_rows.purge_expired(now)
    }
}

impl Default for CacheLayer {
    fn default() -> Self {
        Self::new(&CacheTtls::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_expires_exactly_at_ttl() {
        let ttl = Duration::from_millis(15_000);
        let cache: TtlCache<String, u32> = TtlCache::new("test", ttl);
        let t0 = Instant::now();
        cache.insert_at("A".into(), 1, t0);

        let just_before = t0 + ttl - Duration::from_millis(1);
        let just_after = t0 + ttl + Duration::from_millis(1);
        assert_eq!(cache.get_at(&"A".into(), just_before), Some(1));
        assert_eq!(cache.get_at(&"A".into(), t0 + ttl), None);
        assert_eq!(cache.get_at(&"A".into(), just_after), None);
    }

    #[test]
    fn insert_replaces_and_refreshes() {
        let ttl = Duration::from_secs(10);
        let cache: TtlCache<String, u32> = TtlCache::new("test", ttl);
        let t0 = Instant::now();
        cache.insert_at("A".into(), 1, t0);
        cache.insert_at("A".into(), 2, t0 + Duration::from_secs(8));
        assert_eq!(
            cache.get_at(&"A".into(), t0 + Duration::from_secs(12)),
            Some(2)
        );
    }

    #[test]
    fn purge_removes_only_expired() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new("test", Duration::from_secs(5));
        let t0 = Instant::now();
        cache.insert_at("old", 1, t0);
        cache.insert_at("new", 2, t0 + Duration::from_secs(4));
        assert_eq!(cache.purge_expired(t0 + Duration::from_secs(6)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bar_cache_keys_by_timeframe() {
        let layer = CacheLayer::default();
        layer
            .bars
            .insert(("X".into(), Timeframe::Minute), Vec::new());
        assert!(layer.bars.get(&("X".into(), Timeframe::Minute)).is_some());
        assert!(layer.bars.get(&("X".into(), Timeframe::FiveMinute)).is_none());
    }
}
