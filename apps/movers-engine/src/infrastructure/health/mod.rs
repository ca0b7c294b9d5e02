//! Health Check and Metrics Endpoint
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status of both ingest channels and table sizes
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (at least one channel connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::aggregates::AggregateStore;
use crate::domain::halts::HaltStore;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::stream::{ConnectionState, FeedState};

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Engine version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Ingest channel status.
    pub feeds: FeedsStatus,
    /// Shared table sizes.
    pub tables: TableStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Both channels connected.
    Healthy,
    /// One channel connected.
    Degraded,
    /// No channel connected.
    Unhealthy,
}

/// Ingest channel status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedsStatus {
    /// Halt / resume channel.
    pub halts: FeedInfo,
    /// Minute-aggregate channel.
    pub aggregates: FeedInfo,
}

/// Status of one channel.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Connection state.
    pub state: ConnectionState,
    /// Authenticated and subscribed.
    pub connected: bool,
    /// Events applied.
    pub messages_received: u64,
    /// Frames dropped as malformed.
    pub frames_dropped: u64,
    /// Attempts since the last successful connection.
    pub reconnect_attempts: u32,
    /// Last error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared table sizes.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TableStatus {
    /// Symbols with halt state.
    pub halts: usize,
    /// Symbols with a live aggregate.
    pub aggregates: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    halts_feed: Arc<FeedState>,
    aggregates_feed: Arc<FeedState>,
    halts: Arc<HaltStore>,
    aggregates: Arc<AggregateStore>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        halts_feed: Arc<FeedState>,
        aggregates_feed: Arc<FeedState>,
        halts: Arc<HaltStore>,
        aggregates: Arc<AggregateStore>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            halts_feed,
            aggregates_feed,
            halts,
            aggregates,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.halts_feed.is_connected() || state.aggregates_feed.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let halts = feed_info(&state.halts_feed);
    let aggregates = feed_info(&state.aggregates_feed);
    let status = determine_health_status(&halts, &aggregates);

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feeds: FeedsStatus { halts, aggregates },
        tables: TableStatus {
            halts: state.halts.len(),
            aggregates: state.aggregates.len(),
        },
    }
}

fn feed_info(state: &FeedState) -> FeedInfo {
    FeedInfo {
        state: state.state(),
        connected: state.is_connected(),
        messages_received: state.messages_received(),
        frames_dropped: state.frames_dropped(),
        reconnect_attempts: state.reconnect_attempts(),
        error: state.error_message(),
    }
}

fn determine_health_status(halts: &FeedInfo, aggregates: &FeedInfo) -> HealthStatus {
    match (halts.connected, aggregates.connected) {
        (true, true) => HealthStatus::Healthy,
        (true, false) | (false, true) => HealthStatus::Degraded,
        (false, false) => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
