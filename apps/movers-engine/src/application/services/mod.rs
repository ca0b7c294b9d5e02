//! Application Services
//!
//! - [`FetchPool`]: bounded, order-preserving concurrency for remote calls
//! - [`Enricher`]: cache-first float, daily open and indicator enrichment
//! - [`MoversService`]: ranked view builders, including the aggregate fallback

pub mod builders;
pub mod enrichment;
pub mod fetch_pool;

pub use builders::{
    BuilderSettings, MoversService, SessionFilter, ViewKind, ViewReport, ViewRequest,
};
pub use enrichment::{EnrichedBatch, Enricher, EnrichmentOptions};
pub use fetch_pool::{FetchPool, run_bounded};
