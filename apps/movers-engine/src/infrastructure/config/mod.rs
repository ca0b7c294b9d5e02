//! Configuration Module
//!
//! Environment-driven configuration for the movers engine.

mod settings;

pub use settings::{
    ApiKey, CacheTtls, ConfigError, DEFAULT_ENRICHMENT_URL, DEFAULT_REST_URL, DEFAULT_STREAM_URL,
    EngineConfig, EnrichmentSettings, FetchSettings, ProviderSettings, ServerSettings,
    StreamSettings,
};
