//! Safe Remote-Call Wrapper
//!
//! A single timed GET that never raises. Every outcome is either the parsed
//! JSON body or a [`FetchFailure`]:
//!
//! | Outcome | Kind |
//! |---------|------|
//! | timeout, DNS, connection reset | `NetworkFailure` |
//! | status >= 400 (incl. 429) | `UpstreamHttpError` |
//! | 2xx with an unparseable body | `MalformedPayload` |
//!
//! Query parameters (which may carry API keys) are never part of the URL
//! recorded in a failure. Bodies are read chunk by chunk: error bodies stop
//! once the preview is full, success bodies at [`DEFAULT_MAX_BODY_BYTES`].

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::error::{BODY_PREVIEW_LIMIT, FetchFailure};
use crate::infrastructure::config::ApiKey;
use crate::infrastructure::metrics::{self, Endpoint};

/// Largest success body accepted (full-market snapshots are the biggest).
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Bytes read from an error body; enough for a full preview of 4-byte chars.
const ERROR_BODY_BYTES: usize = BODY_PREVIEW_LIMIT * 4;

/// HTTP client construction error.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The underlying client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Authentication attached to a request.
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    /// `Authorization: Bearer <key>`.
    Bearer(&'a ApiKey),
    /// Key passed as a query parameter with the given name.
    Query(&'static str, &'a ApiKey),
    /// No credentials.
    None,
}

/// Timed GET returning JSON or a structured failure.
#[derive(Debug, Clone)]
pub struct SafeHttpClient {
    client: Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl SafeHttpClient {
    /// Create a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("movers-engine/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Override the largest success body accepted.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` with `query` and parse the body as JSON.
    ///
    /// # Errors
    ///
    /// A [`FetchFailure`] classifying what went wrong. Never panics.
    pub async fn get_json(
        &self,
        endpoint: Endpoint,
        url: &str,
        query: &[(&str, String)],
        auth: Auth<'_>,
    ) -> Result<Value, FetchFailure> {
        let result = self.fetch(url, query, auth).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(failure) => failure.kind.as_str(),
        };
        metrics::record_remote_call(endpoint, outcome);
        if let Err(failure) = &result {
            tracing::warn!(
                endpoint = endpoint.as_str(),
                url = %failure.url,
                status = ?failure.status,
                kind = failure.kind.as_str(),
                hint = %failure.hint,
                "remote call failed"
            );
        }
        result
    }

    async fn fetch(
        &self,
        url: &str,
        query: &[(&str, String)],
        auth: Auth<'_>,
    ) -> Result<Value, FetchFailure> {
        let mut request = self.client.get(url).query(query);
        request = match auth {
            Auth::Bearer(key) => request.bearer_auth(key.expose()),
            Auth::Query(name, key) => request.query(&[(name, key.expose())]),
            Auth::None => request,
        };

        let network = |e: reqwest::Error| FetchFailure::network(url, &e.without_url().to_string());

        let mut response = request.send().await.map_err(network)?;
        let status = response.status().as_u16();

        if status >= 400 {
            let (body, _) = read_capped(&mut response, ERROR_BODY_BYTES)
                .await
                .map_err(network)?;
            return Err(FetchFailure::upstream(url, status, &String::from_utf8_lossy(&body)));
        }

        let oversized = |preview: &[u8]| {
            let mut failure = FetchFailure::malformed(url, &String::from_utf8_lossy(preview));
            failure.hint = format!("response body exceeds {} bytes", self.max_body_bytes);
            failure
        };
        if response
            .content_length()
            .is_some_and(|len| len > u64::try_from(self.max_body_bytes).unwrap_or(u64::MAX))
        {
            return Err(oversized(&[]));
        }

        let (body, truncated) = read_capped(&mut response, self.max_body_bytes)
            .await
            .map_err(network)?;
        if truncated {
            return Err(oversized(&body[..body.len().min(ERROR_BODY_BYTES)]));
        }

        serde_json::from_slice(&body)
            .map_err(|_| FetchFailure::malformed(url, &String::from_utf8_lossy(&body)))
    }
}

/// Read at most `limit` bytes of the body. The flag reports whether more
/// was available.
async fn read_capped(
    response: &mut reqwest::Response,
    limit: usize,
) -> Result<(Vec<u8>, bool), reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_timeout() {
        let client = SafeHttpClient::new(Duration::from_millis(250)).unwrap();
        assert_eq!(client.timeout(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_failure() {
        let client = SafeHttpClient::new(Duration::from_millis(500)).unwrap();
        // Port 9 (discard) on loopback is closed in test environments.
        let failure = client
            .get_json(Endpoint::Snapshot, "http://127.0.0.1:9/v2/x", &[], Auth::None)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, crate::error::FailureKind::NetworkFailure);
        assert_eq!(failure.status, None);
        assert_eq!(failure.url, "http://127.0.0.1:9/v2/x");
    }
}
