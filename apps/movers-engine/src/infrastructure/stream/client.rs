//! Streaming Socket Client
//!
//! One client per channel. Each connection authenticates, subscribes only
//! after `auth_success`, and feeds data events to its [`IngestHandler`].
//! Any disconnect (close, error, auth rejection) is followed by a fixed
//! delay and a fresh connection, forever, until cancelled.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::auth::{AuthError, AuthHandler, AuthStep};
use super::codec::StreamCodec;
use super::handlers::IngestHandler;
use super::messages::{ControlRequest, StreamFrame};
use super::reconnect::ReconnectPolicy;
use super::state::{ConnectionState, FeedState};
use crate::infrastructure::config::ApiKey;
use crate::infrastructure::metrics;

/// Client errors. All of them end the current connection only.
#[derive(Debug, Error)]
pub enum StreamClientError {
    /// Socket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Handshake failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Server closed the socket.
    #[error("connection closed")]
    ConnectionClosed,

    /// A control frame could not be sent.
    #[error("send failed: {0}")]
    Send(String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// Socket URL.
    pub url: String,
    /// Key sent in the auth frame.
    pub api_key: ApiKey,
    /// Fixed delay between attempts.
    pub reconnect_delay: Duration,
}

/// Reconnecting socket client for one channel.
pub struct StreamClient<H: IngestHandler> {
    config: StreamClientConfig,
    handler: H,
    codec: StreamCodec,
    state: Arc<FeedState>,
    cancel: CancellationToken,
}

impl<H: IngestHandler> StreamClient<H> {
    /// Create a client.
    #[must_use]
    pub fn new(
        config: StreamClientConfig,
        handler: H,
        state: Arc<FeedState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            handler,
            codec: StreamCodec::new(),
            state,
            cancel,
        }
    }

    /// Shared connection state.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    /// Run until cancelled, reconnecting after every disconnect.
    pub async fn run(self: Arc<Self>) {
        let channel = self.handler.channel();
        let mut policy = ReconnectPolicy::new(self.config.reconnect_delay);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.connect_and_run(&mut policy).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(channel = channel.as_str(), error = %e, "stream disconnected");
                    self.state.set_error(e.to_string());
                }
            }

            let delay = policy.next_delay();
            self.state.increment_reconnect_attempts();
            self.state.set_state(ConnectionState::Reconnecting);
            tracing::info!(
                channel = channel.as_str(),
                attempt = policy.attempt_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "reconnecting"
            );

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.state.set_state(ConnectionState::Disconnected);
        tracing::info!(channel = channel.as_str(), "stream client stopped");
    }

    /// One connection. `Ok` only on cancellation.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), StreamClientError> {
        let channel = self.handler.channel();
        self.state.set_state(ConnectionState::Connecting);
        tracing::info!(channel = channel.as_str(), url = %self.config.url, "connecting");

        let connect = tokio_tungstenite::connect_async(self.config.url.as_str());
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = connect => result?,
        };
        let (mut write, mut read) = ws_stream.split();

        let mut auth = AuthHandler::new(self.config.api_key.clone());
        auth.on_connected();
        if let Some(request) = auth.create_auth_request() {
            send_control(&mut write, &request).await?;
        }

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(&text, &mut auth, &mut write, policy).await?;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        auth.on_disconnected();
                        return Err(StreamClientError::ConnectionClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        auth.on_disconnected();
                        return Err(e.into());
                    }
                },
            }
        }
    }

    async fn handle_text<W>(
        &self,
        text: &str,
        auth: &mut AuthHandler,
        write: &mut W,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), StreamClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let channel = self.handler.channel();
        let decoded = match self.codec.decode(text) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(channel = channel.as_str(), error = %e, "dropping malformed frame");
                metrics::record_frame_dropped(channel);
                self.state.add_dropped(1);
                return Ok(());
            }
        };
        if decoded.dropped > 0 {
            metrics::record_frame_dropped(channel);
            self.state
                .add_dropped(u64::try_from(decoded.dropped).unwrap_or(u64::MAX));
        }

        for frame in decoded.frames {
            metrics::record_stream_message(channel, frame.kind());
            match frame {
                StreamFrame::Status(status) => match auth.on_status(&status) {
                    AuthStep::Subscribe => {
                        let request = auth.subscribe_request(self.handler.subscription())?;
                        send_control(write, &request).await?;
                        policy.reset();
                        self.state.set_state(ConnectionState::Connected);
                        tracing::info!(
                            channel = channel.as_str(),
                            subscription = self.handler.subscription(),
                            "stream authenticated and subscribed"
                        );
                    }
                    AuthStep::Fail(e) => return Err(e.into()),
                    AuthStep::Wait => {
                        tracing::debug!(channel = channel.as_str(), status = %status.status, "status");
                    }
                },
                StreamFrame::Other(_) => {}
                data => {
                    if self.handler.handle(data) {
                        self.state.increment_messages();
                    }
                }
            }
        }
        Ok(())
    }
}

async fn send_control<W>(write: &mut W, request: &ControlRequest) -> Result<(), StreamClientError>
where
    W: SinkExt<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    let json = serde_json::to_string(request)
        .map_err(|e| StreamClientError::Send(format!("serialize {}: {e}", request.action)))?;
    write
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| StreamClientError::Send(format!("{}: {e}", request.action)))
}
