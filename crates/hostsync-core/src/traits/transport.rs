// # Source Transport Trait
//
// Defines the single-shot network read used by the fetcher.
//
// ## Implementations
//
// - HTTP(S): `hostsync-source-http` crate
// - Tests: scripted transports returning canned bodies and failures
//
// ## Usage
//
// ```rust,ignore
// use hostsync_core::SourceTransport;
// use std::time::Duration;
//
// let body = transport.get("https://raw.hellogithub.com/hosts", Duration::from_secs(10)).await?;
// ```

use async_trait::async_trait;
use std::time::Duration;

/// Trait for transport implementations
///
/// A transport performs exactly one request per call. Retries, delays and
/// fallback between sources are owned by [`crate::fetch::Fetcher`], never by
/// the transport.
///
/// # Errors
///
/// Any failure that may succeed on a later attempt (timeout, connection
/// error, non-success status) must be reported as
/// [`crate::Error::Transport`] so the fetcher treats it as transient.
#[async_trait]
pub trait SourceTransport: Send + Sync {
    /// Fetch the body at `url` as UTF-8 text
    ///
    /// # Parameters
    ///
    /// - `url`: Absolute URL of the source
    /// - `timeout`: Upper bound for this single attempt
    async fn get(&self, url: &str, timeout: Duration) -> Result<String, crate::Error>;

    /// Short name used in logs
    fn transport_name(&self) -> &'static str;
}
