//! Port Interfaces
//!
//! Contracts the builders consume. Infrastructure adapters implement them.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`MarketDataPort`]: upstream REST data (movers, snapshots, bars,
//!   enrichment). Every call is a single attempt and returns a
//!   [`FetchFailure`] instead of raising.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::bar::{Bar, DailyOpenClose, Timeframe};
use crate::error::FetchFailure;

/// Movers list direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Largest gainers.
    Gainers,
    /// Largest losers.
    Losers,
}

impl Direction {
    /// Path segment used by the movers endpoint.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gainers => "gainers",
            Self::Losers => "losers",
        }
    }
}

/// Feature-flagged upstream capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Gainers / losers lists and per-symbol snapshots.
    Movers,
    /// Full-market snapshot.
    FullMarket,
    /// Float and daily open / previous close.
    Enrichment,
    /// Streaming socket.
    Stream,
}

/// Upstream market data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Raw movers list for a direction.
    async fn movers(&self, direction: Direction, include_otc: bool) -> Result<Value, FetchFailure>;

    /// Raw snapshot for one symbol.
    async fn snapshot(&self, symbol: &str) -> Result<Value, FetchFailure>;

    /// Raw snapshot of every ticker.
    async fn full_market_snapshot(&self, include_otc: bool) -> Result<Value, FetchFailure>;

    /// Bars for one symbol between two dates, newest first.
    async fn minute_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, FetchFailure>;

    /// Authoritative open and previous close from the secondary provider.
    async fn daily_open_close(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<DailyOpenClose, FetchFailure>;

    /// Authoritative float share count from the secondary provider.
    async fn float_shares(&self, symbol: &str) -> Result<Option<f64>, FetchFailure>;

    /// Setting names a feature needs but lacks. Empty when usable.
    fn missing_settings(&self, feature: Feature) -> Vec<String>;
}
