//! Source fetching with bounded retries and a one-step fallback
//!
//! The [`Fetcher`] owns the retry policy: it calls a [`SourceTransport`] at
//! most `retries` times, sleeping a fixed delay between attempts, and wraps
//! the final failure in [`Error::Network`]. Transports are single-shot.
//!
//! [`Fetcher::fetch_with_fallback`] layers the fallback policy on top: when
//! the preferred source is exhausted, exactly one alternate serving the same
//! service is tried. If that is exhausted too, the caller gets a labeled
//! placeholder that contains only comment lines.

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::registry::{HostSource, ServiceTag, SourceRegistry};
use crate::traits::SourceTransport;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tag embedded in every placeholder payload
pub const PLACEHOLDER_TAG: &str = "hostsync:placeholder";

/// Retry policy for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Total attempts per source (at least 1)
    pub retries: u32,
    /// Upper bound for each attempt
    pub per_attempt_timeout: Duration,
    /// Pause between consecutive attempts
    pub delay_between: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            per_attempt_timeout: Duration::from_secs(10),
            delay_between: Duration::from_secs(2),
        }
    }
}

impl From<&FetchConfig> for FetchPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            retries: config.retries.max(1),
            per_attempt_timeout: Duration::from_secs(config.timeout_secs),
            delay_between: Duration::from_secs(config.retry_delay_secs),
        }
    }
}

/// Text fetched from one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Raw body, or the placeholder payload
    pub body: String,
    /// Source the body came from
    pub source_name: String,
    /// When the fetch completed
    pub timestamp: DateTime<Utc>,
    /// Failure that led here (set when a fallback or placeholder was used)
    pub error: Option<String>,
    /// Whether an alternate source supplied the body
    pub used_fallback: bool,
    /// Whether the body is the sample/unavailable placeholder
    pub placeholder: bool,
}

impl FetchResult {
    fn fetched(source: &HostSource, body: String) -> Self {
        Self {
            body,
            source_name: source.name.clone(),
            timestamp: Utc::now(),
            error: None,
            used_fallback: false,
            placeholder: false,
        }
    }
}

/// Build the labeled payload returned when every source is exhausted
pub fn placeholder_payload(service: &ServiceTag, tried: &[&str]) -> String {
    format!(
        "# {PLACEHOLDER_TAG}\n\
         # SAMPLE DATA - remote sources unavailable for service '{service}'\n\
         # tried: {}\n\
         # no host entries are included; refresh later or fetch the source manually\n",
        tried.join(", ")
    )
}

/// Whether a body is a placeholder produced by this module
pub fn is_placeholder(body: &str) -> bool {
    let tag_line = format!("# {PLACEHOLDER_TAG}");
    body.lines().any(|line| line.trim() == tag_line)
}

/// Fetcher with an engine-owned retry policy
///
/// Cheap to clone; clones share the transport, so a fetch can be moved onto
/// a spawned task while the caller keeps its control path free.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn SourceTransport>,
    policy: FetchPolicy,
}

impl Fetcher {
    /// Create a fetcher
    pub fn new(transport: Arc<dyn SourceTransport>, policy: FetchPolicy) -> Self {
        Self { transport, policy }
    }

    /// The active retry policy
    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    /// Fetch one source with retries
    ///
    /// Makes at most `policy.retries` attempts. Non-transient errors stop the
    /// loop early. On exhaustion returns [`Error::Network`] wrapping the last
    /// failure and the number of attempts made.
    pub async fn fetch(&self, source: &HostSource) -> Result<String> {
        let retries = self.policy.retries.max(1);
        let mut attempts = 0;
        let mut last_error = None;

        for attempt in 1..=retries {
            attempts = attempt;
            info!(
                "Fetching {} ({}) attempt {}/{} via {}",
                source.name,
                source.url,
                attempt,
                retries,
                self.transport.transport_name()
            );

            match self
                .transport
                .get(&source.url, self.policy.per_attempt_timeout)
                .await
            {
                Ok(body) => {
                    debug!("Fetched {} bytes from {}", body.len(), source.name);
                    return Ok(body);
                }
                Err(e) => {
                    warn!("Fetch attempt {}/{} for {} failed: {}", attempt, retries, source.name, e);
                    let transient = e.is_transient();
                    last_error = Some(e);

                    if !transient {
                        break;
                    }
                    // Wait before retry (unless this was the last attempt)
                    if attempt < retries {
                        tokio::time::sleep(self.policy.delay_between).await;
                    }
                }
            }
        }

        let last = last_error.unwrap_or_else(|| Error::Other("no attempt was made".to_string()));
        error!("All {} fetch attempt(s) failed for {}", attempts, source.name);
        Err(Error::Network {
            source_name: source.name.clone(),
            url: source.url.clone(),
            attempts,
            last: Box::new(last),
        })
    }

    /// Fetch a registered source, falling back to one alternate
    ///
    /// - preferred succeeds: its body
    /// - preferred exhausted, alternate succeeds: alternate body, `used_fallback`
    /// - both exhausted: placeholder payload, `placeholder`
    /// - preferred exhausted, no alternate registered: the preferred error
    pub async fn fetch_with_fallback(
        &self,
        registry: &SourceRegistry,
        source_name: &str,
    ) -> Result<FetchResult> {
        let preferred = registry.source(source_name)?;

        let first_error = match self.fetch(preferred).await {
            Ok(body) => return Ok(FetchResult::fetched(preferred, body)),
            Err(e) => e,
        };

        let Some(alternate) = registry.fallback_for(source_name) else {
            debug!("No alternate source registered for {}", source_name);
            return Err(first_error);
        };

        info!("Switching from {} to alternate source {}", preferred.name, alternate.name);
        match self.fetch(alternate).await {
            Ok(body) => {
                let mut result = FetchResult::fetched(alternate, body);
                result.used_fallback = true;
                result.error = Some(first_error.to_string());
                Ok(result)
            }
            Err(second_error) => {
                warn!(
                    "Both {} and {} are unavailable, returning placeholder",
                    preferred.name, alternate.name
                );
                Ok(FetchResult {
                    body: placeholder_payload(
                        &preferred.service,
                        &[preferred.name.as_str(), alternate.name.as_str()],
                    ),
                    source_name: alternate.name.clone(),
                    timestamp: Utc::now(),
                    error: Some(second_error.to_string()),
                    used_fallback: true,
                    placeholder: true,
                })
            }
        }
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("transport", &self.transport.transport_name())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails with the given errors in order, then succeeds with `body`
    struct FlakyTransport {
        failures: Mutex<Vec<Error>>,
        body: String,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl SourceTransport for FlakyTransport {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                Ok(self.body.clone())
            } else {
                Err(failures.remove(0))
            }
        }

        fn transport_name(&self) -> &'static str {
            "flaky"
        }
    }

    fn quick_policy(retries: u32) -> FetchPolicy {
        FetchPolicy {
            retries,
            per_attempt_timeout: Duration::from_millis(50),
            delay_between: Duration::ZERO,
        }
    }

    fn source() -> HostSource {
        HostSource::new("A", "http://a.invalid/hosts", "github", true)
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let transport = Arc::new(FlakyTransport {
            failures: Mutex::new(vec![
                Error::transport("http://a.invalid/hosts", "timeout"),
                Error::transport("http://a.invalid/hosts", "503"),
            ]),
            body: "1.2.3.4 github.com\n".to_string(),
            calls: Mutex::new(0),
        });
        let fetcher = Fetcher::new(transport.clone(), quick_policy(3));

        let body = tokio_test::assert_ok!(fetcher.fetch(&source()).await);
        assert_eq!(body, "1.2.3.4 github.com\n");
        assert_eq!(*transport.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn non_transient_error_stops_retrying() {
        let transport = Arc::new(FlakyTransport {
            failures: Mutex::new(vec![Error::Other("bad utf-8".to_string())]),
            body: String::new(),
            calls: Mutex::new(0),
        });
        let fetcher = Fetcher::new(transport.clone(), quick_policy(3));

        let err = tokio_test::assert_err!(fetcher.fetch(&source()).await);
        assert!(matches!(err, Error::Network { attempts: 1, .. }));
        assert_eq!(*transport.calls.lock().unwrap(), 1);
    }

    #[test]
    fn placeholder_is_comment_only_and_detectable() {
        let body = placeholder_payload(&ServiceTag::new("steam"), &["A", "B"]);
        assert!(is_placeholder(&body));
        assert!(body.lines().all(|l| l.trim().is_empty() || l.trim_start().starts_with('#')));
        assert!(!is_placeholder("1.2.3.4 github.com"));
    }

    #[test]
    fn policy_from_config_never_drops_below_one_attempt() {
        let config = FetchConfig {
            retries: 0,
            timeout_secs: 10,
            retry_delay_secs: 2,
        };
        assert_eq!(FetchPolicy::from(&config).retries, 1);
    }
}
