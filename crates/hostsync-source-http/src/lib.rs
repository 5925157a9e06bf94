// # HTTP Source Transport
//
// This crate provides the HTTP(S) transport used to fetch remote hosts lists.
//
// ## Purpose
//
// One plain GET per call, bounded by the per-attempt timeout the fetcher
// passes in. Retries, delays and fallback between sources are owned by
// `hostsync_core::Fetcher`; this transport never retries on its own.
//
// ## Errors
//
// Connection failures, timeouts, non-success statuses and unreadable bodies
// are all reported as `Error::Transport`, which the fetcher treats as
// transient.

use hostsync_core::traits::SourceTransport;
use hostsync_core::{Error, Result};

use std::time::Duration;

/// User agent sent with every request
const USER_AGENT: &str = concat!("hostsync/", env!("CARGO_PKG_VERSION"));

/// HTTP(S) transport backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP client (connection pool shared by clones)
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create with a preconfigured client (proxies, custom roots, ...)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SourceTransport for HttpTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::transport(url, format!("timed out after {:?}", timeout))
                } else {
                    Error::transport(url, format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(url, format!("HTTP error: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(url, format!("failed to read response: {}", e)))?;

        tracing::debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(body)
    }

    fn transport_name(&self) -> &'static str {
        "http"
    }
}
