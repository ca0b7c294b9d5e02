//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus the ambient runtime concerns.

/// Environment-driven configuration.
pub mod config;

/// Upstream REST adapters and the safe remote-call wrapper.
pub mod http;

/// TTL caches.
pub mod cache;

/// Halt and minute-aggregate socket ingesters.
pub mod stream;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
