//! Stream Authentication
//!
//! # Flow
//!
//! 1. Connect to the socket endpoint
//! 2. Send `{"action":"auth","params":"<key>"}`
//! 3. Receive `{"ev":"status","status":"auth_success"}` or `auth_failed`
//! 4. Only then send `{"action":"subscribe","params":"<channel>"}`
//!
//! The server may also emit `{"ev":"status","status":"connected"}` before
//! the auth reply; it does not change the handshake.

use thiserror::Error;

use super::messages::{ControlRequest, StatusKind, StatusMessage};
use crate::infrastructure::config::ApiKey;

/// Authentication errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Subscription attempted before `auth_success`.
    #[error("not authenticated: subscribe is only allowed after auth_success")]
    NotAuthenticated,

    /// Server rejected the key.
    #[error("authentication failed: {0}")]
    Rejected(String),
}

/// Handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No socket.
    #[default]
    Disconnected,
    /// Socket open, auth not yet sent.
    Connected,
    /// Auth sent, awaiting reply.
    Authenticating,
    /// `auth_success` received.
    Authenticated,
    /// `auth_failed` received.
    Failed,
}

impl AuthState {
    /// Check if subscriptions may be sent.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Check if the auth frame may be sent.
    #[must_use]
    pub const fn can_authenticate(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// What the client should do after a status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStep {
    /// Nothing to do.
    Wait,
    /// Authenticated: send the subscription.
    Subscribe,
    /// Rejected: drop the connection.
    Fail(AuthError),
}

/// Per-connection handshake tracker.
#[derive(Debug)]
pub struct AuthHandler {
    api_key: ApiKey,
    state: AuthState,
}

impl AuthHandler {
    /// Create a handler for one key.
    #[must_use]
    pub const fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            state: AuthState::Disconnected,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Socket opened.
    pub fn on_connected(&mut self) {
        self.state = AuthState::Connected;
    }

    /// Socket closed.
    pub fn on_disconnected(&mut self) {
        self.state = AuthState::Disconnected;
    }

    /// Build the auth frame and move to `Authenticating`.
    ///
    /// Returns `None` unless the socket is connected and auth has not yet
    /// been sent.
    pub fn create_auth_request(&mut self) -> Option<ControlRequest> {
        if !self.state.can_authenticate() {
            return None;
        }
        self.state = AuthState::Authenticating;
        Some(ControlRequest::auth(self.api_key.expose()))
    }

    /// Advance on a status event.
    pub fn on_status(&mut self, status: &StatusMessage) -> AuthStep {
        match status.kind() {
            StatusKind::AuthSuccess if self.state != AuthState::Authenticated => {
                self.state = AuthState::Authenticated;
                AuthStep::Subscribe
            }
            StatusKind::AuthFailed => {
                self.state = AuthState::Failed;
                AuthStep::Fail(AuthError::Rejected(
                    status.message.clone().unwrap_or_else(|| "auth_failed".to_string()),
                ))
            }
            _ => AuthStep::Wait,
        }
    }

    /// Build a subscription frame.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`] before `auth_success`.
    pub fn subscribe_request(&self, channels: &str) -> Result<ControlRequest, AuthError> {
        if !self.state.is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }
        Ok(ControlRequest::subscribe(channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(s: &str) -> StatusMessage {
        StatusMessage {
            status: s.to_string(),
            message: Some("detail".to_string()),
        }
    }

    fn handler() -> AuthHandler {
        AuthHandler::new(ApiKey::new("secret").unwrap())
    }

    #[test]
    fn subscribe_is_refused_before_auth_success() {
        let mut auth = handler();
        auth.on_connected();
        let request = auth.create_auth_request().unwrap();
        assert_eq!(request.params, "secret");
        assert_eq!(auth.state(), AuthState::Authenticating);

        assert_eq!(
            auth.subscribe_request("LULD.*"),
            Err(AuthError::NotAuthenticated)
        );
        assert_eq!(auth.on_status(&status("connected")), AuthStep::Wait);
        assert_eq!(auth.on_status(&status("auth_success")), AuthStep::Subscribe);
        assert_eq!(auth.subscribe_request("LULD.*").unwrap().params, "LULD.*");
    }

    #[test]
    fn auth_is_sent_once_per_connection() {
        let mut auth = handler();
        assert!(auth.create_auth_request().is_none());
        auth.on_connected();
        assert!(auth.create_auth_request().is_some());
        assert!(auth.create_auth_request().is_none());
    }

    #[test]
    fn repeated_success_does_not_resubscribe() {
        let mut auth = handler();
        auth.on_connected();
        let _ = auth.create_auth_request();
        assert_eq!(auth.on_status(&status("auth_success")), AuthStep::Subscribe);
        assert_eq!(auth.on_status(&status("auth_success")), AuthStep::Wait);
    }

    #[test]
    fn rejection_fails_the_handshake() {
        let mut auth = handler();
        auth.on_connected();
        let _ = auth.create_auth_request();
        assert_eq!(
            auth.on_status(&status("auth_failed")),
            AuthStep::Fail(AuthError::Rejected("detail".to_string()))
        );
        assert_eq!(auth.state(), AuthState::Failed);
        auth.on_disconnected();
        assert_eq!(auth.state(), AuthState::Disconnected);
    }
}
