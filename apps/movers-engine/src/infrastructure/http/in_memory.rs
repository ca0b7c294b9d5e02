//! In-memory market data for testing.
//!
//! Scripted responses per endpoint and symbol, with call counters and an
//! in-flight high-water mark so tests can assert on fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::application::ports::{Direction, Feature, MarketDataPort};
use crate::domain::bar::{Bar, DailyOpenClose, Timeframe};
use crate::error::FetchFailure;

type Scripted<T> = Result<T, FetchFailure>;

#[derive(Debug, Default)]
struct Responses {
    movers: HashMap<Direction, Scripted<Value>>,
    full_market: Option<Scripted<Value>>,
    snapshots: HashMap<String, Scripted<Value>>,
    bars: HashMap<String, Scripted<Vec<Bar>>>,
    daily: HashMap<String, Scripted<DailyOpenClose>>,
    floats: HashMap<String, Scripted<Option<f64>>>,
    missing: HashMap<Feature, Vec<String>>,
}

/// In-memory implementation of [`MarketDataPort`].
///
/// Unscripted symbols answer with a 404 failure. Suitable for testing only.
#[derive(Debug, Default)]
pub struct InMemoryMarketData {
    responses: RwLock<Responses>,
    latency: RwLock<Duration>,
    calls: RwLock<HashMap<&'static str, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryMarketData {
    /// Create an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Script the movers list for a direction.
    pub fn set_movers(&self, direction: Direction, response: Scripted<Value>) {
        self.responses.write().movers.insert(direction, response);
    }

    /// Script the full-market snapshot.
    pub fn set_full_market(&self, response: Scripted<Value>) {
        self.responses.write().full_market = Some(response);
    }

    /// Script a single-symbol snapshot.
    pub fn set_snapshot(&self, symbol: &str, response: Scripted<Value>) {
        self.responses
            .write()
            .snapshots
            .insert(symbol.to_uppercase(), response);
    }

    /// Script minute bars (newest first).
    pub fn set_bars(&self, symbol: &str, response: Scripted<Vec<Bar>>) {
        self.responses
            .write()
            .bars
            .insert(symbol.to_uppercase(), response);
    }

    /// Script daily open / previous close.
    pub fn set_daily(&self, symbol: &str, response: Scripted<DailyOpenClose>) {
        self.responses
            .write()
            .daily
            .insert(symbol.to_uppercase(), response);
    }

    /// Script float shares.
    pub fn set_float(&self, symbol: &str, response: Scripted<Option<f64>>) {
        self.responses
            .write()
            .floats
            .insert(symbol.to_uppercase(), response);
    }

    /// Report settings as missing for a feature.
    pub fn set_missing(&self, feature: Feature, missing: &[&str]) {
        self.responses.write().missing.insert(
            feature,
            missing.iter().map(ToString::to_string).collect(),
        );
    }

    /// Calls made to an endpoint (`movers`, `snapshot`, `full_market`,
    /// `bars`, `daily`, `float`).
    #[must_use]
    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.read().get(endpoint).copied().unwrap_or(0)
    }

    /// Total calls across every endpoint.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.read().values().sum()
    }

    /// Highest number of calls observed in flight at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, endpoint: &'static str) {
        *self.calls.write().entry(endpoint).or_insert(0) += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn not_found(url: String) -> FetchFailure {
    FetchFailure::upstream(url, 404, &json!({"status": "NOT_FOUND"}).to_string())
}

#[async_trait]
impl MarketDataPort for InMemoryMarketData {
    async fn movers(&self, direction: Direction, _include_otc: bool) -> Result<Value, FetchFailure> {
        self.enter("movers").await;
        let result = self
            .responses
            .read()
            .movers
            .get(&direction)
            .cloned()
            .unwrap_or_else(|| Ok(json!({"tickers": []})));
        self.leave();
        result
    }

    async fn snapshot(&self, symbol: &str) -> Result<Value, FetchFailure> {
        self.enter("snapshot").await;
        let key = symbol.to_uppercase();
        let result = self
            .responses
            .read()
            .snapshots
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Err(not_found(format!("memory://snapshot/{key}"))));
        self.leave();
        result
    }

    async fn full_market_snapshot(&self, _include_otc: bool) -> Result<Value, FetchFailure> {
        self.enter("full_market").await;
        let result = self
            .responses
            .read()
            .full_market
            .clone()
            .unwrap_or_else(|| Ok(json!({"tickers": []})));
        self.leave();
        result
    }

    async fn minute_bars(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<Bar>, FetchFailure> {
        self.enter("bars").await;
        let result = self
            .responses
            .read()
            .bars
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()));
        self.leave();
        result
    }

    async fn daily_open_close(
        &self,
        symbol: &str,
        _date: NaiveDate,
    ) -> Result<DailyOpenClose, FetchFailure> {
        self.enter("daily").await;
        let result = self
            .responses
            .read()
            .daily
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_else(|| Ok(DailyOpenClose::default()));
        self.leave();
        result
    }

    async fn float_shares(&self, symbol: &str) -> Result<Option<f64>, FetchFailure> {
        self.enter("float").await;
        let result = self
            .responses
            .read()
            .floats
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or(Ok(None));
        self.leave();
        result
    }

    fn missing_settings(&self, feature: Feature) -> Vec<String> {
        self.responses
            .read()
            .missing
            .get(&feature)
            .cloned()
            .unwrap_or_default()
    }
}
