//! Row Enrichment
//!
//! Fills rows with data the primary snapshot lacks or gets wrong:
//!
//! - float shares and daily open / previous close from the secondary
//!   provider, which take priority over snapshot values
//! - minute-bar indicators (SMA, EMA, VWAP, AO, volume spike)
//! - mini-chart close series
//!
//! Every lookup goes through its cache first. Remote calls run through the
//! bounded [`FetchPool`]; a failed call leaves the field as it was and adds a
//! [`Diagnostic`].

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::fetch_pool::FetchPool;
use crate::application::ports::{Feature, MarketDataPort};
use crate::domain::bar::{Bar, DailyOpenClose, MiniChart, Timeframe};
use crate::domain::indicators::{IndicatorSnapshot, SpikeConfig};
use crate::domain::row::Row;
use crate::domain::scoring::ScoringConfig;
use crate::domain::session::SessionClassifier;
use crate::error::{Diagnostic, FetchFailure, PipelineError, Stage};
use crate::infrastructure::cache::CacheLayer;

/// Rows with the per-symbol failures collected while producing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedBatch {
    /// Rows in input order.
    pub rows: Vec<Row>,
    /// Per-symbol failures.
    pub diagnostics: Vec<Diagnostic>,
}

/// Enrichment settings shared by every request.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentOptions {
    /// Whether the secondary provider is consulted.
    pub enabled: bool,
    /// Session context for exchange-local dates.
    pub classifier: SessionClassifier,
    /// Scoring used when rows are re-finalized.
    pub scoring: ScoringConfig,
    /// Volume-spike detection.
    pub spike: SpikeConfig,
}

/// Cache-first enrichment over a [`MarketDataPort`].
pub struct Enricher {
    port: Arc<dyn MarketDataPort>,
    caches: Arc<CacheLayer>,
    pool: FetchPool,
    options: EnrichmentOptions,
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("pool", &self.pool)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Enricher {
    /// Create an enricher.
    #[must_use]
    pub fn new(
        port: Arc<dyn MarketDataPort>,
        caches: Arc<CacheLayer>,
        pool: FetchPool,
        options: EnrichmentOptions,
    ) -> Self {
        Self {
            port,
            caches,
            pool,
            options,
        }
    }

    /// Shared caches.
    #[must_use]
    pub const fn caches(&self) -> &Arc<CacheLayer> {
        &self.caches
    }

    /// Overwrite open, previous close and float of the first `cap` rows
    /// with the secondary provider's values, then re-finalize them.
    ///
    /// Rows past `cap` are returned untouched. When enrichment is disabled
    /// every row is returned untouched.
    ///
    /// # Errors
    ///
    /// `MissingConfiguration` when enrichment is enabled but its settings
    /// are incomplete. Checked before any remote call.
    pub async fn enrich_with_float_and_daily_open(
        &self,
        rows: Vec<Row>,
        cap: usize,
    ) -> Result<EnrichedBatch, PipelineError> {
        if !self.options.enabled {
            return Ok(EnrichedBatch {
                rows,
                diagnostics: Vec::new(),
            });
        }
        let missing = self.port.missing_settings(Feature::Enrichment);
        if !missing.is_empty() {
            return Err(PipelineError::MissingConfiguration { missing });
        }

        let date = self.options.classifier.today();
        let mut rows = rows;
        let tail = rows.split_off(cap.min(rows.len()));

        let enriched = self
            .pool
            .run(rows, |row| self.enrich_one(row, date))
            .await;

        let mut batch = EnrichedBatch::default();
        for (row, diagnostics) in enriched {
            batch.rows.push(row);
            batch.diagnostics.extend(diagnostics);
        }
        batch.rows.extend(tail);
        Ok(batch)
    }

    async fn enrich_one(&self, mut row: Row, date: NaiveDate) -> (Row, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();

        match self.daily_open_close(&row.symbol, date).await {
            Ok(daily) => {
                if daily.open.is_some() {
                    row.open = daily.open;
                }
                if daily.prev_close.is_some() {
                    row.prev_close = daily.prev_close;
                }
            }
            Err(failure) => {
                debug!(symbol = %row.symbol, error = %failure, "daily open lookup failed");
                diagnostics.push(Diagnostic::new(&row.symbol, Stage::DailyOpen, failure));
            }
        }

        match self.float_shares(&row.symbol).await {
            Ok(Some(float)) => row.float_shares = Some(float),
            Ok(None) => {}
            Err(failure) => {
                debug!(symbol = %row.symbol, error = %failure, "float lookup failed");
                diagnostics.push(Diagnostic::new(&row.symbol, Stage::Float, failure));
            }
        }

        row.finalize(&self.options.scoring);
        (row, diagnostics)
    }

    async fn daily_open_close(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<DailyOpenClose, FetchFailure> {
        let key = (symbol.to_string(), date);
        if let Some(hit) = self.caches.daily.get(&key) {
            return Ok(hit);
        }
        let daily = self.port.daily_open_close(symbol, date).await?;
        // No official open yet; leave uncached.
        if daily.open.is_some() {
            self.caches.daily.insert(key, daily);
        }
        Ok(daily)
    }

    async fn float_shares(&self, symbol: &str) -> Result<Option<f64>, FetchFailure> {
        let key = symbol.to_string();
        if let Some(hit) = self.caches.floats.get(&key) {
            return Ok(Some(hit));
        }
        let float = self
            .port
            .float_shares(symbol)
            .await?
            .filter(|f| f.is_finite() && *f > 0.0);
        if let Some(value) = float {
            self.caches.floats.insert(key, value);
        }
        Ok(float)
    }

    /// Attach minute-bar indicators to the first `cap` rows.
    ///
    /// A row whose bars cannot be fetched keeps null indicators.
    pub async fn attach_indicators(&self, rows: Vec<Row>, cap: usize) -> EnrichedBatch {
        let mut rows = rows;
        let tail = rows.split_off(cap.min(rows.len()));

        let attached = self
            .pool
            .run(rows, |mut row| async move {
                match self.minute_bars(&row.symbol).await {
                    Ok(bars) => {
                        IndicatorSnapshot::compute(&bars, &self.options.spike).apply_to(&mut row);
                        row.finalize(&self.options.scoring);
                        (row, None)
                    }
                    Err(failure) => {
                        debug!(symbol = %row.symbol, error = %failure, "bar fetch failed");
                        let diagnostic = Diagnostic::new(&row.symbol, Stage::Bars, failure);
                        (row, Some(diagnostic))
                    }
                }
            })
            .await;

        let mut batch = EnrichedBatch::default();
        for (row, diagnostic) in attached {
            batch.rows.push(row);
            batch.diagnostics.extend(diagnostic);
        }
        batch.rows.extend(tail);
        batch
    }

    /// Close-price sparkline for a symbol, from the chart cache or bars.
    ///
    /// # Errors
    ///
    /// The bar fetch failure when nothing is cached.
    pub async fn mini_chart(&self, symbol: &str) -> Result<MiniChart, FetchFailure> {
        let key = symbol.trim().to_uppercase();
        if let Some(hit) = self.caches.charts.get(&key) {
            return Ok(hit);
        }
        let bars = self.minute_bars(&key).await?;
        let chart = MiniChart::from_bars(&key, &bars);
        self.caches.charts.insert(key, chart.clone());
        Ok(chart)
    }

    /// Today's minute bars, newest first, from the bar cache or upstream.
    ///
    /// # Errors
    ///
    /// The upstream failure on a cache miss.
    pub async fn minute_bars(&self, symbol: &str) -> Result<Vec<Bar>, FetchFailure> {
        let key = (symbol.to_string(), Timeframe::Minute);
        if let Some(hit) = self.caches.bars.get(&key) {
            return Ok(hit);
        }
        let today = self.options.classifier.today();
        let bars = self
            .port
            .minute_bars(symbol, Timeframe::Minute, today, today)
            .await
            .inspect_err(|failure| {
                if failure.is_rate_limited() {
                    warn!(symbol = %symbol, "bars endpoint rate limited");
                }
            })?;
        self.caches.bars.insert(key, bars.clone());
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::application::ports::MockMarketDataPort;
    use crate::domain::row::RowSource;

    fn row(symbol: &str, price: f64, open: f64, prev: f64) -> Row {
        let mut row = Row::new(symbol, RowSource::Movers);
        row.price = Some(price);
        row.open = Some(open);
        row.prev_close = Some(prev);
        row.volume = Some(1_000_000.0);
        row.finalize(&ScoringConfig::default());
        row
    }

    fn enricher(port: MockMarketDataPort, enabled: bool) -> Enricher {
        Enricher::new(
            Arc::new(port),
            Arc::new(CacheLayer::default()),
            FetchPool::new(2),
            EnrichmentOptions {
                enabled,
                ..EnrichmentOptions::default()
            },
        )
    }

    fn flat_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| Bar {
                timestamp_ms: i64::try_from(count - i).unwrap_or_default() * 60_000,
                open: 10.0,
                high: 10.0,
                low: 10.0,
                close: 10.0,
                volume: 100.0,
            })
            .collect()
    }

    #[tokio::test]
    async fn secondary_values_overwrite_snapshot() {
        let mut port = MockMarketDataPort::new();
        port.expect_missing_settings().returning(|_| Vec::new());
        port.expect_daily_open_close().returning(|_, _| {
            Ok(DailyOpenClose {
                open: Some(12.0),
                prev_close: Some(10.0),
            })
        });
        port.expect_float_shares()
            .with(eq("ABC"))
            .returning(|_| Ok(Some(5_000_000.0)));

        let batch = enricher(port, true)
            .enrich_with_float_and_daily_open(vec![row("ABC", 13.0, 11.0, 10.0)], 10)
            .await
            .unwrap();

        let row = &batch.rows[0];
        assert_eq!(row.open, Some(12.0));
        assert_eq!(row.gap_pct, Some(20.0));
        assert_eq!(row.float_shares, Some(5_000_000.0));
        assert_eq!(row.float_turnover_pct, Some(20.0));
        assert!(batch.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn missing_configuration_fails_before_any_call() {
        let mut port = MockMarketDataPort::new();
        port.expect_missing_settings()
            .returning(|_| vec!["ENRICHMENT_API_KEY".to_string()]);
        port.expect_daily_open_close().never();
        port.expect_float_shares().never();

        let err = enricher(port, true)
            .enrich_with_float_and_daily_open(vec![row("ABC", 1.0, 1.0, 1.0)], 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingConfiguration { ref missing } if missing == &["ENRICHMENT_API_KEY"]
        ));
    }

    #[tokio::test]
    async fn disabled_enrichment_passes_rows_through() {
        let mut port = MockMarketDataPort::new();
        port.expect_missing_settings().never();
        let input = vec![row("ABC", 1.0, 1.0, 1.0)];
        let batch = enricher(port, false)
            .enrich_with_float_and_daily_open(input.clone(), 10)
            .await
            .unwrap();
        assert_eq!(batch.rows, input);
    }

    #[tokio::test]
    async fn failures_become_diagnostics_and_keep_the_row() {
        let mut port = MockMarketDataPort::new();
        port.expect_missing_settings().returning(|_| Vec::new());
        port.expect_daily_open_close()
            .returning(|_, _| Err(FetchFailure::upstream("http://x/quote", 429, "slow")));
        port.expect_float_shares()
            .returning(|_| Err(FetchFailure::network("http://x/float", "timeout")));

        let input = row("ABC", 13.0, 11.0, 10.0);
        let batch = enricher(port, true)
            .enrich_with_float_and_daily_open(vec![input.clone()], 10)
            .await
            .unwrap();
        assert_eq!(batch.rows[0].open, input.open);
        assert_eq!(batch.diagnostics.len(), 2);
        assert_eq!(batch.diagnostics[0].stage, Stage::DailyOpen);
        assert_eq!(batch.diagnostics[1].stage, Stage::Float);
    }

    #[tokio::test]
    async fn cap_limits_remote_calls() {
        let mut port = MockMarketDataPort::new();
        port.expect_missing_settings().returning(|_| Vec::new());
        port.expect_daily_open_close()
            .times(1)
            .returning(|_, _| Ok(DailyOpenClose::default()));
        port.expect_float_shares().times(1).returning(|_| Ok(None));

        let rows = vec![row("A", 1.0, 1.0, 1.0), row("B", 1.0, 1.0, 1.0)];
        let batch = enricher(port, true)
            .enrich_with_float_and_daily_open(rows, 1)
            .await
            .unwrap();
        let symbols: Vec<_> = batch.rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn float_is_served_from_cache_on_second_call() {
        let mut port = MockMarketDataPort::new();
        port.expect_missing_settings().returning(|_| Vec::new());
        port.expect_daily_open_close().times(1).returning(|_, _| {
            Ok(DailyOpenClose {
                open: Some(1.0),
                prev_close: Some(1.0),
            })
        });
        port.expect_float_shares()
            .times(1)
            .returning(|_| Ok(Some(1_000_000.0)));

        let enricher = enricher(port, true);
        for _ in 0..2 {
            let batch = enricher
                .enrich_with_float_and_daily_open(vec![row("ABC", 1.0, 1.0, 1.0)], 10)
                .await
                .unwrap();
            assert_eq!(batch.rows[0].float_shares, Some(1_000_000.0));
        }
    }

    #[tokio::test]
    async fn open_less_daily_reply_is_not_cached() {
        let mut port = MockMarketDataPort::new();
        let mut seq = mockall::Sequence::new();
        port.expect_missing_settings().returning(|_| Vec::new());
        port.expect_float_shares().returning(|_| Ok(None));
        port.expect_daily_open_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(DailyOpenClose {
                    open: None,
                    prev_close: Some(10.0),
                })
            });
        port.expect_daily_open_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(DailyOpenClose {
                    open: Some(15.0),
                    prev_close: Some(10.0),
                })
            });

        let enricher = enricher(port, true);
        let first = enricher
            .enrich_with_float_and_daily_open(vec![row("ABC", 16.0, 11.0, 10.0)], 10)
            .await
            .unwrap();
        assert_eq!(first.rows[0].open, Some(11.0));

        let second = enricher
            .enrich_with_float_and_daily_open(vec![row("ABC", 16.0, 11.0, 10.0)], 10)
            .await
            .unwrap();
        assert_eq!(second.rows[0].open, Some(15.0));
        assert_eq!(second.rows[0].gap_pct, Some(50.0));
    }

    #[tokio::test]
    async fn indicators_attach_from_bars() {
        let mut port = MockMarketDataPort::new();
        port.expect_minute_bars()
            .times(1)
            .returning(|_, _, _, _| Ok(flat_bars(40)));

        let enricher = enricher(port, false);
        let batch = enricher
            .attach_indicators(vec![row("ABC", 10.0, 10.0, 10.0)], 5)
            .await;
        let row = &batch.rows[0];
        assert_eq!(row.sma20, Some(10.0));
        assert_eq!(row.ema9, Some(10.0));
        assert_eq!(row.vwap, Some(10.0));
        assert_eq!(row.ao, Some(0.0));
        assert!(!row.volume_spike);

        // Served from the bar cache.
        let chart = enricher.mini_chart("abc").await.unwrap();
        assert_eq!(chart.points.len(), 40);
        assert!(chart.points.windows(2).all(|w| w[0].t < w[1].t));
    }

    #[tokio::test]
    async fn bar_failure_keeps_row_with_null_indicators() {
        let mut port = MockMarketDataPort::new();
        port.expect_minute_bars()
            .returning(|_, _, _, _| Err(FetchFailure::network("http://x/bars", "reset")));

        let batch = enricher(port, false)
            .attach_indicators(vec![row("ABC", 10.0, 10.0, 10.0)], 5)
            .await;
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].sma20, None);
        assert_eq!(batch.diagnostics[0].stage, Stage::Bars);
    }
}
