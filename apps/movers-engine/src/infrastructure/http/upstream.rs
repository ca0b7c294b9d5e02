//! Upstream REST Adapter
//!
//! Implements [`MarketDataPort`] over two providers:
//!
//! - the primary provider (movers lists, snapshots, minute bars), keyed by
//!   a bearer token
//! - the secondary enrichment provider (daily history for open / previous
//!   close, float shares), keyed by an `apikey` query parameter
//!
//! Each method issues exactly one request through [`SafeHttpClient`].

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde_json::Value;

use super::client::{Auth, HttpClientError, SafeHttpClient};
use crate::application::ports::{Direction, Feature, MarketDataPort};
use crate::domain::bar::{Bar, DailyOpenClose, Timeframe};
use crate::domain::normalize::fields;
use crate::domain::normalize::walk::as_number;
use crate::error::FetchFailure;
use crate::infrastructure::config::{EngineConfig, EnrichmentSettings, ProviderSettings};
use crate::infrastructure::metrics::Endpoint;

const SNAPSHOT_ROOT: &str = "/v2/snapshot/locale/us/markets/stocks";
const BARS_LIMIT: &str = "5000";
/// Calendar days of history requested so a prior session survives weekends
/// and holidays.
const DAILY_LOOKBACK_DAYS: u64 = 7;

/// REST adapter for the primary and enrichment providers.
#[derive(Debug, Clone)]
pub struct UpstreamRestAdapter {
    http: SafeHttpClient,
    provider: ProviderSettings,
    enrichment: EnrichmentSettings,
}

impl UpstreamRestAdapter {
    /// Create an adapter from explicit settings.
    #[must_use]
    pub const fn new(
        http: SafeHttpClient,
        provider: ProviderSettings,
        enrichment: EnrichmentSettings,
    ) -> Self {
        Self {
            http,
            provider,
            enrichment,
        }
    }

    /// Create an adapter from the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &EngineConfig) -> Result<Self, HttpClientError> {
        let http = SafeHttpClient::new(config.fetch.http_timeout)?;
        Ok(Self::new(
            http,
            config.provider.clone(),
            config.enrichment.clone(),
        ))
    }

    async fn primary(
        &self,
        endpoint: Endpoint,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, FetchFailure> {
        let url = format!("{}{path}", self.provider.rest_url);
        self.http
            .get_json(endpoint, &url, query, Auth::Bearer(&self.provider.api_key))
            .await
    }

    /// Raw enrichment response and the URL it came from.
    async fn secondary_body(
        &self,
        endpoint: Endpoint,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(String, Value), FetchFailure> {
        let url = format!("{}{path}", self.enrichment.rest_url);
        let Some(key) = &self.enrichment.api_key else {
            return Err(FetchFailure::network(url, "ENRICHMENT_API_KEY not configured"));
        };
        let body = self
            .http
            .get_json(endpoint, &url, query, Auth::Query("apikey", key))
            .await?;
        Ok((url, body))
    }

    /// First element of an enrichment list response.
    async fn secondary(
        &self,
        endpoint: Endpoint,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, FetchFailure> {
        let (url, body) = self.secondary_body(endpoint, path, query).await?;
        match body {
            Value::Array(items) => Ok(items.into_iter().next()),
            Value::Object(_) => Ok(Some(body)),
            other => Err(FetchFailure::malformed(url, &other.to_string())),
        }
    }
}

fn otc_flag(include_otc: bool) -> (&'static str, String) {
    ("include_otc", include_otc.to_string())
}

/// Bars from an aggregates response. A missing `results` key means no bars.
/// `{"historical": [{"date": "2024-01-02", "open": .., "close": ..}, ..]}`
/// in any order. An empty object or list means no history.
fn parse_daily_history(
    url: &str,
    body: &Value,
    date: NaiveDate,
) -> Result<DailyOpenClose, FetchFailure> {
    let entries = match body.get("historical") {
        None if body.is_object() || body.as_array().is_some_and(Vec::is_empty) => {
            return Ok(DailyOpenClose::default());
        }
        Some(Value::Array(entries)) => entries,
        _ => return Err(FetchFailure::malformed(url, &body.to_string())),
    };

    let mut sessions: Vec<(NaiveDate, &Value)> = entries
        .iter()
        .filter_map(|entry| {
            let day = entry.get("date")?.as_str()?;
            let day = NaiveDate::parse_from_str(day.get(..10)?, "%Y-%m-%d").ok()?;
            Some((day, entry))
        })
        .collect();
    sessions.sort_by_key(|(day, _)| std::cmp::Reverse(*day));

    let price = |entry: &Value, key: &str| {
        entry
            .get(key)
            .and_then(as_number)
            .filter(|v| *v > 0.0)
    };
    Ok(DailyOpenClose {
        open: sessions
            .iter()
            .find(|(day, _)| *day == date)
            .and_then(|(_, entry)| price(entry, "open")),
        prev_close: sessions
            .iter()
            .find(|(day, _)| *day < date)
            .and_then(|(_, entry)| price(entry, "close")),
    })
}

fn parse_bars(url: &str, body: &Value) -> Result<Vec<Bar>, FetchFailure> {
    match body.get("results") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(results) => serde_json::from_value(results.clone())
            .map_err(|_| FetchFailure::malformed(url, &results.to_string())),
    }
}

#[async_trait]
impl MarketDataPort for UpstreamRestAdapter {
    async fn movers(&self, direction: Direction, include_otc: bool) -> Result<Value, FetchFailure> {
        let path = format!("{SNAPSHOT_ROOT}/{}", direction.as_str());
        self.primary(Endpoint::Movers, &path, &[otc_flag(include_otc)])
            .await
    }

    async fn snapshot(&self, symbol: &str) -> Result<Value, FetchFailure> {
        let path = format!("{SNAPSHOT_ROOT}/tickers/{}", symbol.to_uppercase());
        self.primary(Endpoint::Snapshot, &path, &[]).await
    }

    async fn full_market_snapshot(&self, include_otc: bool) -> Result<Value, FetchFailure> {
        let path = format!("{SNAPSHOT_ROOT}/tickers");
        self.primary(Endpoint::FullMarket, &path, &[otc_flag(include_otc)])
            .await
    }

    async fn minute_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, FetchFailure> {
        let path = format!(
            "/v2/aggs/ticker/{}/range/{}/minute/{from}/{to}",
            symbol.to_uppercase(),
            timeframe.minutes()
        );
        let query = [
            ("adjusted", "true".to_string()),
            ("sort", "desc".to_string()),
            ("limit", BARS_LIMIT.to_string()),
        ];
        let body = self.primary(Endpoint::Bars, &path, &query).await?;
        parse_bars(&format!("{}{path}", self.provider.rest_url), &body)
    }

    /// Open of `date` and close of the session before it, from the daily
    /// history ending on `date`. Before the open `date` has no bar yet.
    async fn daily_open_close(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<DailyOpenClose, FetchFailure> {
        let path = format!("/api/v3/historical-price-full/{}", symbol.to_uppercase());
        let from = date
            .checked_sub_days(Days::new(DAILY_LOOKBACK_DAYS))
            .unwrap_or(date);
        let query = [("from", from.to_string()), ("to", date.to_string())];
        let (url, body) = self
            .secondary_body(Endpoint::DailyOpen, &path, &query)
            .await?;
        parse_daily_history(&url, &body, date)
    }

    async fn float_shares(&self, symbol: &str) -> Result<Option<f64>, FetchFailure> {
        let query = [("symbol", symbol.to_uppercase())];
        let entry = self
            .secondary(Endpoint::Float, "/api/v4/shares_float", &query)
            .await?;
        Ok(entry.and_then(|e| fields::FLOAT_SHARES.resolve(&e)))
    }

    fn missing_settings(&self, feature: Feature) -> Vec<String> {
        let mut missing = Vec::new();
        match feature {
            Feature::Movers | Feature::FullMarket => {
                if self.provider.rest_url.trim().is_empty() {
                    missing.push("MOVERS_REST_URL".to_string());
                }
            }
            Feature::Stream => {
                if self.provider.stream_url.trim().is_empty() {
                    missing.push("MOVERS_STREAM_URL".to_string());
                }
            }
            Feature::Enrichment => missing = self.enrichment.missing(),
        }
        missing
    }
}
