#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Movers Engine - Market Movers Aggregation Pipeline
//!
//! Pulls movers lists and snapshots from an upstream market-data provider,
//! normalizes heterogeneous payloads into canonical rows, enriches them with
//! float, daily open / previous close and minute-bar indicators, overlays
//! real-time halt state, and ranks the result.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: canonical rows and pure algorithms
//!   - `normalize`: alias and breadth-first field extraction
//!   - `scoring`, `ranking`: derived metrics and sort strategies
//!   - `indicators`, `session`: SMA/EMA/VWAP/AO and session classification
//!   - `halts`, `aggregates`: socket-fed shared tables
//!
//! - **Application**: use cases and port definitions
//!   - `ports`: the market-data contract
//!   - `services`: fetch pool, enrichment, view builders
//!
//! - **Infrastructure**: adapters and ambient concerns
//!   - `http`: safe remote calls and the REST adapter
//!   - `cache`: TTL caches
//!   - `stream`: halt and minute-aggregate ingesters
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! REST movers / snapshots ──► normalize ──► dedupe ──► enrich ──► indicators
//!                                                                    │
//! LULD socket ──► HaltStore ─────────────────────────► halt overlay ◄┘
//!                                                          │
//! AM socket ──► AggregateStore ──► fallback universe       ▼
//!                                                        rank ──► ViewReport
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Error taxonomy shared by every layer.
pub mod error;

/// Domain layer - Canonical rows and pure algorithms.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Errors
pub use error::{BuildFailure, Diagnostic, FailureKind, FetchFailure, PipelineError, Stage};

// Domain types
pub use domain::aggregates::{AggregateStore, MinuteAggregate};
pub use domain::halts::{HaltEvent, HaltRecord, HaltStore};
pub use domain::ranking::{AoFilter, RankParams, RankStrategy, build_ranking};
pub use domain::row::Row;
pub use domain::session::{Session, SessionClassifier};

// Application
pub use application::ports::{Direction, Feature, MarketDataPort};
pub use application::services::{
    BuilderSettings, FetchPool, MoversService, SessionFilter, ViewKind, ViewReport, ViewRequest,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, EngineConfig};

// Adapters (for integration tests)
pub use infrastructure::cache::CacheLayer;
pub use infrastructure::http::{InMemoryMarketData, SafeHttpClient, UpstreamRestAdapter};
pub use infrastructure::stream::{AggregateIngester, HaltIngester, StreamSupervisor};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
