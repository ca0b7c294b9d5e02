//! HTTP Module
//!
//! Safe remote-call wrapper and the upstream REST adapter implementing
//! [`MarketDataPort`](crate::application::ports::MarketDataPort).

mod client;
mod in_memory;
mod upstream;

pub use client::{Auth, DEFAULT_MAX_BODY_BYTES, HttpClientError, SafeHttpClient};
pub use in_memory::InMemoryMarketData;
pub use upstream::UpstreamRestAdapter;
