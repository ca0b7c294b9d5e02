//! Movers Engine Binary
//!
//! Starts the halt and minute-aggregate ingesters, the health server, and a
//! refresh loop that rebuilds the ranked movers views on an interval.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin movers-engine
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MOVERS_API_KEY`: primary provider key
//!
//! ## Optional
//! - `MOVERS_REST_URL`, `MOVERS_STREAM_URL`: primary provider endpoints
//! - `ENRICHMENT_API_KEY`, `ENRICHMENT_REST_URL`
//! - `ENRICHMENT_ENABLED`: default on when `ENRICHMENT_API_KEY` is set
//! - `FETCH_CONCURRENCY`: fetch pool width (default: 8)
//! - `HTTP_TIMEOUT_MS`: per-request timeout (default: 8000)
//! - `FULL_MARKET_ENABLED`: use the full-market snapshot (default: false)
//! - `AO_FILTER`: off | positive | negative
//! - `HEALTH_PORT`: health check HTTP port (default: 8083)
//! - `REFRESH_INTERVAL_SECS`: view refresh interval (default: 30)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use movers_engine::application::ports::{Direction, MarketDataPort};
use movers_engine::application::services::{
    BuilderSettings, MoversService, ViewReport, ViewRequest,
};
use movers_engine::domain::aggregates::AggregateStore;
use movers_engine::domain::halts::HaltStore;
use movers_engine::domain::ranking::RankStrategy;
use movers_engine::infrastructure::cache::CacheLayer;
use movers_engine::infrastructure::config::EngineConfig;
use movers_engine::infrastructure::health::{HealthServer, HealthServerState};
use movers_engine::infrastructure::http::UpstreamRestAdapter;
use movers_engine::infrastructure::metrics::{Channel, init_metrics};
use movers_engine::infrastructure::stream::{AggregateIngester, HaltIngester, StreamSupervisor};
use movers_engine::infrastructure::telemetry;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Rows logged per view on each refresh.
const LOG_TOP_N: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting movers engine");

    let _metrics_handle = init_metrics().context("failed to install Prometheus recorder")?;

    let config = EngineConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let halts = Arc::new(HaltStore::new());
    let aggregates = Arc::new(AggregateStore::new(config.stream.aggregate_capacity));
    let caches = Arc::new(CacheLayer::new(&config.cache));
    let port: Arc<dyn MarketDataPort> = Arc::new(UpstreamRestAdapter::from_config(&config)?);

    let service = Arc::new(MoversService::new(
        port,
        Arc::clone(&caches),
        Arc::clone(&halts),
        Arc::clone(&aggregates),
        BuilderSettings::from_config(&config),
    ));

    let supervisor = Arc::new(StreamSupervisor::new(
        config.provider.stream_url.clone(),
        config.provider.api_key.clone(),
        config.stream.reconnect_delay,
        shutdown_token.child_token(),
    ));
    supervisor.ensure_started(HaltIngester::new(Arc::clone(&halts)));
    supervisor.ensure_started(AggregateIngester::new(Arc::clone(&aggregates)));

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        supervisor.state(Channel::Halts),
        supervisor.state(Channel::Aggregates),
        Arc::clone(&halts),
        Arc::clone(&aggregates),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let refresh = tokio::spawn(refresh_loop(
        Arc::clone(&service),
        Arc::clone(&supervisor),
        caches,
        halts,
        aggregates,
        ViewRequest::new(RankStrategy::GapFloatRank).with_ao_filter(config.ao_filter),
        config.server.refresh_interval,
        shutdown_token.clone(),
    ));

    tracing::info!("Movers engine ready");

    await_shutdown(shutdown_token).await;

    let drain = async {
        supervisor.shutdown().await;
        let _ = refresh.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("Shutdown timed out");
    }

    tracing::info!("Movers engine stopped");
    Ok(())
}

/// Rebuild the views on an interval until cancelled.
#[allow(clippy::too_many_arguments)]
async fn refresh_loop(
    service: Arc<MoversService>,
    supervisor: Arc<StreamSupervisor>,
    caches: Arc<CacheLayer>,
    halts: Arc<HaltStore>,
    aggregates: Arc<AggregateStore>,
    request: ViewRequest,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        // Restart any ingester whose task ended.
        supervisor.ensure_started(HaltIngester::new(Arc::clone(&halts)));
        supervisor.ensure_started(AggregateIngester::new(Arc::clone(&aggregates)));

        for direction in [Direction::Gainers, Direction::Losers] {
            match service.build_movers(direction, &request).await {
                Ok(report) => log_top(&report),
                Err(e) => tracing::warn!(view = direction.as_str(), error = %e, "view build failed"),
            }
        }
        // Serves the aggregate table itself when full-market polling is off.
        match service
            .build_full_market(&request.with_limit(LOG_TOP_N * 4))
            .await
        {
            Ok(report) => {
                if report.fallback {
                    tracing::debug!("market view built from minute aggregates");
                }
                log_top(&report);
            }
            Err(e) => tracing::warn!(view = "full_market", error = %e, "view build failed"),
        }

        let purged = caches.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "expired cache entries removed");
        }
    }
}

fn log_top(report: &ViewReport) {
    for (rank, row) in report.rows.iter().take(LOG_TOP_N).enumerate() {
        tracing::info!(
            view = report.view.as_str(),
            rank = rank + 1,
            symbol = %row.symbol,
            price = ?row.price,
            gap_pct = ?row.gap_pct,
            float_turnover_pct = ?row.float_turnover_pct,
            halted = row.halted,
            "mover"
        );
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    tracing::info!(
        concurrency = config.fetch.concurrency,
        enrich_cap = config.fetch.enrich_cap,
        enrichment = config.enrichment.enabled,
        full_market = config.fetch.full_market_enabled,
        timezone = %config.timezone,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        rest_url = %config.provider.rest_url,
        stream_url = %config.provider.stream_url,
        enrichment_url = %config.enrichment.rest_url,
        "Upstream endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
