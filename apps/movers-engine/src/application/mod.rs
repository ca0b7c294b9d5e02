//! Application Layer - Use cases and port definitions.
//!
//! Builders orchestrate domain algorithms over the [`ports::MarketDataPort`]
//! contract. Shared state (caches, halt and aggregate tables) is injected.

/// Port interfaces for upstream market data.
pub mod ports;

/// Fetch pool, enrichment and view builders.
pub mod services;
