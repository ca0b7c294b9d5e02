//! Streaming ingest (halts and minute aggregates).
//!
//! - [`codec`]: lenient JSON decoding of socket frames
//! - [`auth`]: auth-then-subscribe handshake
//! - [`reconnect`]: fixed-delay, unlimited reconnection
//! - [`client`]: one reconnecting socket per channel
//! - [`handlers`]: apply events to the halt and aggregate tables
//! - [`supervisor`]: idempotent start of the background clients

pub mod auth;
pub mod client;
pub mod codec;
pub mod handlers;
pub mod messages;
pub mod reconnect;
pub mod state;
pub mod supervisor;

pub use auth::{AuthError, AuthHandler, AuthState, AuthStep};
pub use client::{StreamClient, StreamClientConfig, StreamClientError};
pub use codec::{CodecError, Decoded, StreamCodec};
pub use handlers::{AggregateIngester, HaltIngester, IngestHandler};
pub use messages::{
    AggregateMessage, ControlRequest, HaltMessage, StatusKind, StatusMessage, StreamFrame,
};
pub use reconnect::ReconnectPolicy;
pub use state::{ConnectionState, FeedState};
pub use supervisor::StreamSupervisor;
