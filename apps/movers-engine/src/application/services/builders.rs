//! View Builders
//!
//! Orchestrate fetch, normalize, enrich and rank for each view:
//!
//! | View | Universe | Session filter |
//! |------|----------|----------------|
//! | gainers / losers | movers list | none |
//! | full market | full-market snapshot, else aggregate fallback | none |
//! | session | full-market snapshot, else aggregate fallback | per request |
//! | scan | explicit symbols | none |
//! | aggregates | minute-aggregate table | per request |
//!
//! Missing configuration fails a request before any remote call. After
//! that, per-symbol failures only add diagnostics. A failed universe call
//! fails the request, except for the full-market snapshot, which falls
//! back to the aggregate table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::enrichment::{EnrichedBatch, Enricher, EnrichmentOptions};
use super::fetch_pool::FetchPool;
use crate::application::ports::{Direction, Feature, MarketDataPort};
use crate::domain::aggregates::AggregateStore;
use crate::domain::bar::MiniChart;
use crate::domain::halts::HaltStore;
use crate::domain::normalize::Normalizer;
use crate::domain::ranking::{AoFilter, RankParams, RankStrategy, build_ranking};
use crate::domain::row::{Row, RowSource};
use crate::domain::session::{MissingTimestampPolicy, Session, SessionClassifier};
use crate::error::{BuildFailure, Diagnostic, FetchFailure, Stage};
use crate::infrastructure::cache::CacheLayer;
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::metrics;

// =============================================================================
// Requests and Reports
// =============================================================================

/// How a view is ranked and decorated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewRequest {
    /// Sort strategy.
    pub strategy: RankStrategy,
    /// Limit and oscillator filter.
    pub params: RankParams,
    /// Attach minute-bar indicators to the enriched rows.
    pub with_indicators: bool,
}

impl ViewRequest {
    /// Request for a strategy with default parameters.
    #[must_use]
    pub fn new(strategy: RankStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Limit the number of rows returned.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.params.limit = Some(limit);
        self
    }

    /// Apply an oscillator filter. Implies indicator attachment.
    #[must_use]
    pub const fn with_ao_filter(mut self, filter: AoFilter) -> Self {
        self.params.ao_filter = filter;
        self
    }

    /// Attach indicators.
    #[must_use]
    pub const fn with_indicators(mut self) -> Self {
        self.with_indicators = true;
        self
    }

    const fn needs_indicators(&self) -> bool {
        self.with_indicators || !matches!(self.params.ao_filter, AoFilter::Off)
    }
}

/// Sessions a view admits and what to do with rows lacking a timestamp.
///
/// An empty session list admits every row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionFilter {
    /// Admitted sessions.
    pub sessions: Vec<Session>,
    /// Policy for rows without a timestamp.
    pub missing_timestamp: MissingTimestampPolicy,
}

impl SessionFilter {
    /// Admit only the given sessions, keeping rows without a timestamp.
    #[must_use]
    pub fn only(sessions: &[Session]) -> Self {
        Self {
            sessions: sessions.to_vec(),
            missing_timestamp: MissingTimestampPolicy::Keep,
        }
    }

    /// Pre-market and after-hours.
    #[must_use]
    pub fn extended_hours() -> Self {
        Self::only(&[Session::Pre, Session::After])
    }

    /// Set the missing-timestamp policy.
    #[must_use]
    pub const fn with_missing_timestamp(mut self, policy: MissingTimestampPolicy) -> Self {
        self.missing_timestamp = policy;
        self
    }

    /// Whether a row timestamp passes.
    #[must_use]
    pub fn admits(&self, classifier: &SessionClassifier, timestamp_millis: Option<i64>) -> bool {
        self.sessions.is_empty()
            || classifier.admits(timestamp_millis, &self.sessions, self.missing_timestamp)
    }
}

/// View identity, used in reports, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Gainers list.
    Gainers,
    /// Losers list.
    Losers,
    /// Whole market.
    FullMarket,
    /// Session-filtered market.
    Session,
    /// Ad hoc symbol scan.
    Scan,
    /// Minute-aggregate table.
    Aggregates,
}

impl ViewKind {
    /// Label value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gainers => "gainers",
            Self::Losers => "losers",
            Self::FullMarket => "full_market",
            Self::Session => "session",
            Self::Scan => "scan",
            Self::Aggregates => "aggregates",
        }
    }
}

impl From<Direction> for ViewKind {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Gainers => Self::Gainers,
            Direction::Losers => Self::Losers,
        }
    }
}

/// A ranked view with the failures met while building it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewReport {
    /// Correlation ID.
    pub request_id: Uuid,
    /// View built.
    pub view: ViewKind,
    /// Strategy applied.
    pub strategy: RankStrategy,
    /// Ranked rows.
    pub rows: Vec<Row>,
    /// Per-symbol failures.
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the aggregate fallback supplied the universe.
    pub fallback: bool,
    /// Build completion time.
    pub generated_at: DateTime<Utc>,
}

// =============================================================================
// Settings
// =============================================================================

/// Sizing and feature flags for [`MoversService`].
#[derive(Debug, Clone)]
pub struct BuilderSettings {
    /// Fetch pool width.
    pub concurrency: usize,
    /// Rows enriched per request.
    pub enrich_cap: usize,
    /// Aggregate fallback universe size.
    pub fallback_top_n: usize,
    /// Include OTC symbols in list endpoints.
    pub include_otc: bool,
    /// Use the full-market snapshot endpoint.
    pub full_market_enabled: bool,
    /// Enrichment settings.
    pub enrichment: EnrichmentOptions,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            enrich_cap: 40,
            fallback_top_n: 60,
            include_otc: false,
            full_market_enabled: false,
            enrichment: EnrichmentOptions::default(),
        }
    }
}

impl BuilderSettings {
    /// Settings from the engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            concurrency: config.fetch.concurrency,
            enrich_cap: config.fetch.enrich_cap,
            fallback_top_n: config.fetch.fallback_top_n,
            include_otc: config.fetch.include_otc,
            full_market_enabled: config.fetch.full_market_enabled,
            enrichment: EnrichmentOptions {
                enabled: config.enrichment.enabled,
                classifier: SessionClassifier::new(config.timezone),
                scoring: config.scoring.clone(),
                spike: config.spike,
            },
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// Builds every ranked view from injected stores and a market-data port.
pub struct MoversService {
    port: Arc<dyn MarketDataPort>,
    enricher: Enricher,
    normalizer: Normalizer,
    halts: Arc<HaltStore>,
    aggregates: Arc<AggregateStore>,
    pool: FetchPool,
    settings: BuilderSettings,
}

impl std::fmt::Debug for MoversService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoversService")
            .field("settings", &self.settings)
            .field("halts", &self.halts.len())
            .field("aggregates", &self.aggregates.len())
            .finish_non_exhaustive()
    }
}

impl MoversService {
    /// Create a service.
    #[must_use]
    pub fn new(
        port: Arc<dyn MarketDataPort>,
        caches: Arc<CacheLayer>,
        halts: Arc<HaltStore>,
        aggregates: Arc<AggregateStore>,
        settings: BuilderSettings,
    ) -> Self {
        let pool = FetchPool::new(settings.concurrency);
        let enricher = Enricher::new(
            Arc::clone(&port),
            caches,
            pool,
            settings.enrichment.clone(),
        );
        let normalizer = Normalizer::new(
            settings.enrichment.classifier,
            settings.enrichment.scoring.clone(),
        );
        Self {
            port,
            enricher,
            normalizer,
            halts,
            aggregates,
            pool,
            settings,
        }
    }

    /// Halt table.
    #[must_use]
    pub const fn halts(&self) -> &Arc<HaltStore> {
        &self.halts
    }

    /// Minute-aggregate table.
    #[must_use]
    pub const fn aggregates(&self) -> &Arc<AggregateStore> {
        &self.aggregates
    }

    /// Gainers or losers.
    ///
    /// # Errors
    ///
    /// Missing configuration, or a failed / malformed movers list.
    pub async fn build_movers(
        &self,
        direction: Direction,
        request: &ViewRequest,
    ) -> Result<ViewReport, BuildFailure> {
        let started = Instant::now();
        let view = ViewKind::from(direction);
        let result = self.movers_inner(view, direction, request).await;
        observe(view, started, result)
    }

    /// Whole market, falling back to the aggregate table when the
    /// full-market endpoint is disabled or fails.
    ///
    /// # Errors
    ///
    /// Missing configuration or a malformed full-market payload.
    pub async fn build_full_market(
        &self,
        request: &ViewRequest,
    ) -> Result<ViewReport, BuildFailure> {
        let started = Instant::now();
        let result = self
            .market_inner(ViewKind::FullMarket, request, &SessionFilter::default())
            .await;
        observe(ViewKind::FullMarket, started, result)
    }

    /// Market restricted to the filter's sessions.
    ///
    /// # Errors
    ///
    /// Missing configuration or a malformed full-market payload.
    pub async fn build_session_view(
        &self,
        filter: &SessionFilter,
        request: &ViewRequest,
    ) -> Result<ViewReport, BuildFailure> {
        let started = Instant::now();
        let result = self.market_inner(ViewKind::Session, request, filter).await;
        observe(ViewKind::Session, started, result)
    }

    /// Explicit symbols. Duplicates and blanks are ignored; symbols whose
    /// snapshot fails are dropped with a diagnostic.
    ///
    /// # Errors
    ///
    /// Missing configuration.
    pub async fn scan_symbols<S: AsRef<str>>(
        &self,
        symbols: &[S],
        request: &ViewRequest,
    ) -> Result<ViewReport, BuildFailure> {
        let started = Instant::now();
        let result = self.scan_inner(symbols, request).await;
        observe(ViewKind::Scan, started, result)
    }

    /// Rows from the minute-aggregate table merged with enriched snapshots.
    ///
    /// # Errors
    ///
    /// Missing configuration.
    pub async fn build_from_aggregates(
        &self,
        filter: &SessionFilter,
        request: &ViewRequest,
    ) -> Result<ViewReport, BuildFailure> {
        let started = Instant::now();
        let result = self
            .aggregates_inner(ViewKind::Aggregates, request, filter, Vec::new())
            .await;
        observe(ViewKind::Aggregates, started, result)
    }

    /// Close-price sparkline for a symbol.
    ///
    /// # Errors
    ///
    /// The bar fetch failure when nothing is cached.
    pub async fn mini_chart(&self, symbol: &str) -> Result<MiniChart, FetchFailure> {
        self.enricher.mini_chart(symbol).await
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    async fn movers_inner(
        &self,
        view: ViewKind,
        direction: Direction,
        request: &ViewRequest,
    ) -> Result<ViewReport, BuildFailure> {
        self.preflight(&[Feature::Movers])?;
        let payload = self
            .port
            .movers(direction, self.settings.include_otc)
            .await?;
        let (rows, diagnostics) = self.normalize_universe(&payload, RowSource::Movers)?;
        debug!(view = view.as_str(), candidates = rows.len(), "movers universe loaded");
        self.finish(view, rows, diagnostics, request, false, true)
            .await
    }

    async fn market_inner(
        &self,
        view: ViewKind,
        request: &ViewRequest,
        filter: &SessionFilter,
    ) -> Result<ViewReport, BuildFailure> {
        if !self.settings.full_market_enabled {
            debug!(view = view.as_str(), "full-market polling disabled, using aggregates");
            return self
                .aggregates_inner(view, request, filter, Vec::new())
                .await;
        }
        self.preflight(&[Feature::FullMarket])?;

        match self
            .port
            .full_market_snapshot(self.settings.include_otc)
            .await
        {
            Ok(payload) => {
                let (rows, diagnostics) =
                    self.normalize_universe(&payload, RowSource::FullMarket)?;
                let classifier = self.normalizer.classifier();
                let rows = rows
                    .into_iter()
                    .filter(|row| filter.admits(classifier, row.updated_at))
                    .collect();
                self.finish(view, rows, diagnostics, request, false, true)
                    .await
            }
            Err(failure) => {
                warn!(
                    view = view.as_str(),
                    status = ?failure.status,
                    error = %failure,
                    "full-market snapshot failed, using aggregates"
                );
                let diagnostics = vec![Diagnostic::new("", Stage::Universe, failure)];
                self.aggregates_inner(view, request, filter, diagnostics)
                    .await
            }
        }
    }

    async fn scan_inner<S: AsRef<str>>(
        &self,
        symbols: &[S],
        request: &ViewRequest,
    ) -> Result<ViewReport, BuildFailure> {
        self.preflight(&[Feature::Movers])?;
        let mut seen = HashSet::new();
        let symbols: Vec<String> = symbols
            .iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        let batch = self.fetch_snapshots(symbols, RowSource::Scan).await;
        self.finish(ViewKind::Scan, batch.rows, batch.diagnostics, request, false, true)
            .await
    }

    async fn aggregates_inner(
        &self,
        view: ViewKind,
        request: &ViewRequest,
        filter: &SessionFilter,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<ViewReport, BuildFailure> {
        self.preflight(&[Feature::Movers])?;
        let classifier = self.normalizer.classifier();
        let scoring = self.normalizer.scoring();

        let mut candidates: Vec<Row> = self
            .aggregates
            .snapshot()
            .iter()
            .map(|aggregate| aggregate.to_row(classifier))
            .filter(|row| filter.admits(classifier, row.updated_at))
            .collect();
        candidates.sort_by(|a, b| {
            b.volume
                .unwrap_or(0.0)
                .total_cmp(&a.volume.unwrap_or(0.0))
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        candidates.truncate(self.settings.fallback_top_n);

        let cache = &self.enricher.caches().enriched_rows;
        let mut snapshots: HashMap<String, Row> = HashMap::new();
        let mut misses = Vec::new();
        for row in &candidates {
            match cache.get(&row.symbol) {
                Some(cached) => {
                    snapshots.insert(row.symbol.clone(), cached);
                }
                None => misses.push(row.symbol.clone()),
            }
        }
        debug!(
            view = view.as_str(),
            candidates = candidates.len(),
            cached = snapshots.len(),
            fetching = misses.len(),
            "aggregate fallback universe"
        );

        let fetched = self.fetch_snapshots(misses, RowSource::Snapshot).await;
        diagnostics.extend(fetched.diagnostics);
        let enriched = self
            .enricher
            .enrich_with_float_and_daily_open(fetched.rows, usize::MAX)
            .await?;
        // Rows with a failed enrichment stage are used once but not cached.
        let incomplete: HashSet<String> = enriched
            .diagnostics
            .iter()
            .map(|d| d.symbol.clone())
            .collect();
        diagnostics.extend(enriched.diagnostics);
        for row in enriched.rows {
            if !incomplete.contains(&row.symbol) {
                cache.insert(row.symbol.clone(), row.clone());
            }
            snapshots.insert(row.symbol.clone(), row);
        }

        let rows = candidates
            .into_iter()
            .map(|mut aggregate| match snapshots.get(&aggregate.symbol) {
                Some(snapshot) => Row::merge_realtime(&aggregate, snapshot, scoring),
                None => {
                    aggregate.finalize(scoring);
                    aggregate
                }
            })
            .collect();

        self.finish(view, rows, diagnostics, request, true, false)
            .await
    }

    // -------------------------------------------------------------------------
    // Shared steps
    // -------------------------------------------------------------------------

    /// Collect every missing setting for the features a request touches.
    fn preflight(&self, features: &[Feature]) -> Result<(), BuildFailure> {
        let mut needed = features.to_vec();
        if self.settings.enrichment.enabled {
            needed.push(Feature::Enrichment);
        }
        let mut missing: Vec<String> = Vec::new();
        for feature in needed {
            for key in self.port.missing_settings(feature) {
                if !missing.contains(&key) {
                    missing.push(key);
                }
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            warn!(missing = ?missing, "request rejected, configuration incomplete");
            Err(BuildFailure::missing_configuration(missing))
        }
    }

    fn normalize_universe(
        &self,
        payload: &Value,
        source: RowSource,
    ) -> Result<(Vec<Row>, Vec<Diagnostic>), BuildFailure> {
        let (rows, failures) = self.normalizer.normalize_list(payload, source)?;
        let diagnostics = failures
            .into_iter()
            .map(|(index, err)| {
                Diagnostic::new(
                    "",
                    Stage::Normalize,
                    FetchFailure::malformed("", &format!("item {index}: {err}")),
                )
            })
            .collect();
        Ok((rows, diagnostics))
    }

    async fn fetch_snapshots(&self, symbols: Vec<String>, source: RowSource) -> EnrichedBatch {
        let port = &self.port;
        let results = self
            .pool
            .run(symbols, |symbol| async move {
                let outcome = port.snapshot(&symbol).await;
                (symbol, outcome)
            })
            .await;

        let mut batch = EnrichedBatch::default();
        for (symbol, outcome) in results {
            match outcome {
                Ok(payload) => match self.normalizer.normalize(&symbol, &payload, source) {
                    Ok(row) => batch.rows.push(row),
                    Err(err) => {
                        let failure = FetchFailure::malformed("", &err.to_string());
                        batch
                            .diagnostics
                            .push(Diagnostic::new(&symbol, Stage::Normalize, failure));
                    }
                },
                Err(failure) => {
                    debug!(symbol = %symbol, error = %failure, "snapshot fetch failed");
                    batch
                        .diagnostics
                        .push(Diagnostic::new(&symbol, Stage::Snapshot, failure));
                }
            }
        }
        batch
    }

    async fn finish(
        &self,
        view: ViewKind,
        rows: Vec<Row>,
        mut diagnostics: Vec<Diagnostic>,
        request: &ViewRequest,
        fallback: bool,
        enrich: bool,
    ) -> Result<ViewReport, BuildFailure> {
        let cap = self.settings.enrich_cap;

        // Pre-rank so the enrichment cap covers the strongest candidates.
        let mut rows = build_ranking(
            request.strategy,
            dedupe_by_symbol(rows),
            &RankParams::default(),
        );

        if enrich {
            let batch = self
                .enricher
                .enrich_with_float_and_daily_open(rows, cap)
                .await?;
            rows = batch.rows;
            diagnostics.extend(batch.diagnostics);
        }

        if request.needs_indicators() {
            let batch = self.enricher.attach_indicators(rows, cap).await;
            rows = batch.rows;
            diagnostics.extend(batch.diagnostics);
        }

        self.overlay_halts(&mut rows);
        let rows = build_ranking(request.strategy, rows, &request.params);

        Ok(ViewReport {
            request_id: Uuid::new_v4(),
            view,
            strategy: request.strategy,
            rows,
            diagnostics,
            fallback,
            generated_at: Utc::now(),
        })
    }

    /// Stamp the halt flag from the halt table.
    fn overlay_halts(&self, rows: &mut [Row]) {
        for row in rows.iter_mut() {
            if let Some(record) = self.halts.get(&row.symbol)
                && record.halted != row.halted
            {
                row.halted = record.halted;
                row.finalize(self.normalizer.scoring());
            }
        }
    }
}

fn dedupe_by_symbol(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.symbol.clone()))
        .collect()
}

fn observe(
    view: ViewKind,
    started: Instant,
    result: Result<ViewReport, BuildFailure>,
) -> Result<ViewReport, BuildFailure> {
    let elapsed = started.elapsed();
    metrics::record_view_build(view.as_str(), result.is_ok(), elapsed);
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    match &result {
        Ok(report) => info!(
            view = view.as_str(),
            request_id = %report.request_id,
            rows = report.rows.len(),
            diagnostics = report.diagnostics.len(),
            fallback = report.fallback,
            elapsed_ms,
            "view built"
        ),
        Err(failure) => warn!(
            view = view.as_str(),
            status = ?failure.status,
            hint = %failure.hint,
            elapsed_ms,
            "view build failed"
        ),
    }
    result
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::ports::MockMarketDataPort;
    use crate::domain::aggregates::MinuteAggregate;

    fn service(port: MockMarketDataPort, settings: BuilderSettings) -> MoversService {
        MoversService::new(
            Arc::new(port),
            Arc::new(CacheLayer::default()),
            Arc::new(HaltStore::new()),
            Arc::new(AggregateStore::new(100)),
            settings,
        )
    }

    fn configured(port: &mut MockMarketDataPort) {
        port.expect_missing_settings().returning(|_| Vec::new());
    }

    fn ticker(symbol: &str, open: f64, prev: f64, price: f64, volume: f64) -> Value {
        json!({
            "ticker": symbol,
            "day": { "o": open, "c": price, "v": volume },
            "prevDay": { "c": prev },
            "lastTrade": { "p": price }
        })
    }

    #[tokio::test]
    async fn movers_are_ranked_by_gap() {
        let mut port = MockMarketDataPort::new();
        configured(&mut port);
        port.expect_movers().returning(|_, _| {
            Ok(json!({ "tickers": [
                ticker("SMALL", 10.5, 10.0, 11.0, 1_000.0),
                ticker("BIG", 15.0, 10.0, 16.0, 2_000.0),
            ]}))
        });

        let report = service(port, BuilderSettings::default())
            .build_movers(Direction::Gainers, &ViewRequest::new(RankStrategy::Gap))
            .await
            .unwrap();

        let symbols: Vec<_> = report.rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BIG", "SMALL"]);
        assert_eq!(report.rows[0].gap_pct, Some(50.0));
        assert_eq!(report.view, ViewKind::Gainers);
        assert!(!report.fallback);
    }

    #[tokio::test]
    async fn halted_symbols_are_flagged() {
        let mut port = MockMarketDataPort::new();
        configured(&mut port);
        port.expect_movers()
            .returning(|_, _| Ok(json!([ticker("HALT", 10.0, 10.0, 10.0, 1.0)])));

        let service = service(port, BuilderSettings::default());
        service.halts().apply_indicators("HALT", &[17], Some(1), None);

        let report = service
            .build_movers(Direction::Losers, &ViewRequest::default())
            .await
            .unwrap();
        assert!(report.rows[0].halted);
    }

    #[tokio::test]
    async fn missing_configuration_fails_before_remote_calls() {
        let mut port = MockMarketDataPort::new();
        port.expect_missing_settings().returning(|feature| match feature {
            Feature::Movers => vec!["MOVERS_API_KEY".to_string()],
            Feature::Enrichment => vec!["ENRICHMENT_API_KEY".to_string()],
            _ => Vec::new(),
        });
        port.expect_movers().never();

        let mut settings = BuilderSettings::default();
        settings.enrichment.enabled = true;
        let failure = service(port, settings)
            .build_movers(Direction::Gainers, &ViewRequest::default())
            .await
            .unwrap_err();
        assert_eq!(failure.missing, vec!["MOVERS_API_KEY", "ENRICHMENT_API_KEY"]);
    }

    #[tokio::test]
    async fn rate_limited_universe_surfaces_structured_failure() {
        let mut port = MockMarketDataPort::new();
        configured(&mut port);
        port.expect_movers().returning(|_, _| {
            Err(FetchFailure::upstream("http://up/movers", 429, "too many"))
        });

        let failure = service(port, BuilderSettings::default())
            .build_movers(Direction::Gainers, &ViewRequest::default())
            .await
            .unwrap_err();
        assert_eq!(failure.status, Some(429));
        assert_eq!(failure.body_preview, "too many");
    }

    #[tokio::test]
    async fn scan_dedupes_and_drops_failures() {
        let mut port = MockMarketDataPort::new();
        configured(&mut port);
        port.expect_snapshot().times(2).returning(|symbol| {
            if symbol == "BAD" {
                Err(FetchFailure::upstream("http://up/snap", 404, "unknown"))
            } else {
                Ok(json!({ "status": "OK", "ticker": ticker(symbol, 1.0, 1.0, 1.0, 1.0) }))
            }
        });

        let report = service(port, BuilderSettings::default())
            .scan_symbols(&["aaa", "AAA ", "bad", ""], &ViewRequest::default())
            .await
            .unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].symbol, "AAA");
        assert_eq!(report.rows[0].source, RowSource::Scan);
        assert_eq!(report.diagnostics[0].symbol, "BAD");
        assert_eq!(report.diagnostics[0].stage, Stage::Snapshot);
    }

    #[tokio::test]
    async fn full_market_failure_falls_back_to_aggregates() {
        let mut port = MockMarketDataPort::new();
        configured(&mut port);
        port.expect_full_market_snapshot()
            .returning(|_| Err(FetchFailure::network("http://up/all", "timeout")));
        port.expect_snapshot()
            .returning(|symbol| Ok(ticker(symbol, 9.0, 8.0, 9.5, 10.0)));

        let settings = BuilderSettings {
            full_market_enabled: true,
            ..BuilderSettings::default()
        };
        let service = service(port, settings);
        service.aggregates().upsert(MinuteAggregate {
            symbol: "AGG".to_string(),
            close: 10.0,
            volume: 500.0,
            accumulated_volume: Some(50_000.0),
            ..MinuteAggregate::default()
        });

        let report = service
            .build_full_market(&ViewRequest::default())
            .await
            .unwrap();
        assert!(report.fallback);
        assert_eq!(report.diagnostics[0].stage, Stage::Universe);
        let row = &report.rows[0];
        assert_eq!(row.source, RowSource::Merged);
        assert_eq!(row.price, Some(10.0));
        assert_eq!(row.volume, Some(50_000.0));
        assert_eq!(row.prev_close, Some(8.0));
        assert_eq!(row.price_pct, Some(25.0));
    }

    #[tokio::test]
    async fn aggregate_fallback_keeps_row_when_snapshot_fails() {
        let mut port = MockMarketDataPort::new();
        configured(&mut port);
        port.expect_snapshot()
            .returning(|_| Err(FetchFailure::network("http://up/snap", "reset")));

        let service = service(port, BuilderSettings::default());
        service.aggregates().upsert(MinuteAggregate {
            symbol: "AGG".to_string(),
            close: 10.0,
            volume: 500.0,
            ..MinuteAggregate::default()
        });

        let report = service
            .build_from_aggregates(&SessionFilter::default(), &ViewRequest::default())
            .await
            .unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].source, RowSource::Aggregate);
        assert_eq!(report.rows[0].price, Some(10.0));
        assert_eq!(report.diagnostics[0].stage, Stage::Snapshot);
    }

    #[tokio::test]
    async fn aggregate_fallback_uses_enriched_row_cache() {
        let mut port = MockMarketDataPort::new();
        configured(&mut port);
        port.expect_snapshot()
            .times(1)
            .returning(|symbol| Ok(ticker(symbol, 9.0, 8.0, 9.5, 10.0)));

        let service = service(port, BuilderSettings::default());
        service.aggregates().upsert(MinuteAggregate {
            symbol: "AGG".to_string(),
            close: 10.0,
            volume: 500.0,
            ..MinuteAggregate::default()
        });

        for _ in 0..2 {
            let report = service
                .build_from_aggregates(&SessionFilter::default(), &ViewRequest::default())
                .await
                .unwrap();
            assert_eq!(report.rows[0].prev_close, Some(8.0));
        }
    }

    #[tokio::test]
    async fn aggregate_fallback_caps_universe_by_volume() {
        let mut port = MockMarketDataPort::new();
        configured(&mut port);
        port.expect_snapshot()
            .times(2)
            .returning(|symbol| Ok(ticker(symbol, 1.0, 1.0, 1.0, 1.0)));

        let settings = BuilderSettings {
            fallback_top_n: 2,
            ..BuilderSettings::default()
        };
        let service = service(port, settings);
        for (symbol, volume) in [("LOW", 10.0), ("MID", 100.0), ("TOP", 1_000.0)] {
            service.aggregates().upsert(MinuteAggregate {
                symbol: symbol.to_string(),
                close: 1.0,
                volume,
                ..MinuteAggregate::default()
            });
        }

        let report = service
            .build_from_aggregates(
                &SessionFilter::default(),
                &ViewRequest::new(RankStrategy::Active),
            )
            .await
            .unwrap();
        let symbols: Vec<_> = report.rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["TOP", "MID"]);
    }

    #[test]
    fn empty_session_filter_admits_everything() {
        let classifier = SessionClassifier::default();
        assert!(SessionFilter::default().admits(&classifier, None));
        let drop = SessionFilter::extended_hours().with_missing_timestamp(MissingTimestampPolicy::Drop);
        assert!(!drop.admits(&classifier, None));
        assert!(SessionFilter::extended_hours().admits(&classifier, None));
    }
}
