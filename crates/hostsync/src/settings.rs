// # Environment configuration
//
// Configuration is read from environment variables only:
//
// - `HOSTSYNC_HOSTS_PATH`: hosts file to manage (default: the platform hosts file)
// - `HOSTSYNC_DATA_DIR`: where backups and history live (default: `~/.hostsync`)
// - `HOSTSYNC_FETCH_RETRIES`: attempts per source, 1-10 (default: 3)
// - `HOSTSYNC_FETCH_TIMEOUT_SECS`: per-attempt timeout, 1-300 (default: 10)
// - `HOSTSYNC_RETRY_DELAY_SECS`: pause between attempts, 0-300 (default: 2)
// - `HOSTSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default: info)

use anyhow::{Context, Result};
use hostsync_core::SyncConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// Name of the data directory under the user's home
const DATA_DIR_NAME: &str = ".hostsync";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub hosts_path: PathBuf,
    pub data_dir: PathBuf,
    pub fetch_retries: Option<u32>,
    pub fetch_timeout_secs: Option<u64>,
    pub retry_delay_secs: Option<u64>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let hosts_path = env::var_os("HOSTSYNC_HOSTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_hosts_path);

        let data_dir = match env::var_os("HOSTSYNC_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => home_dir()
                .map(|home| home.join(DATA_DIR_NAME))
                .context(
                    "cannot determine a home directory. \
                    Set it via: export HOSTSYNC_DATA_DIR=/path/to/dir",
                )?,
        };

        Ok(Self {
            hosts_path,
            data_dir,
            fetch_retries: parse_env("HOSTSYNC_FETCH_RETRIES")?,
            fetch_timeout_secs: parse_env("HOSTSYNC_FETCH_TIMEOUT_SECS")?,
            retry_delay_secs: parse_env("HOSTSYNC_RETRY_DELAY_SECS")?,
            log_level: env::var("HOSTSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.hosts_path.as_os_str().is_empty() {
            anyhow::bail!("HOSTSYNC_HOSTS_PATH cannot be empty");
        }
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("HOSTSYNC_DATA_DIR cannot be empty");
        }

        if let Some(retries) = self.fetch_retries
            && !(1..=10).contains(&retries)
        {
            anyhow::bail!("HOSTSYNC_FETCH_RETRIES must be between 1 and 10. Got: {}", retries);
        }

        if let Some(timeout) = self.fetch_timeout_secs
            && !(1..=300).contains(&timeout)
        {
            anyhow::bail!(
                "HOSTSYNC_FETCH_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                timeout
            );
        }

        if let Some(delay) = self.retry_delay_secs
            && delay > 300
        {
            anyhow::bail!(
                "HOSTSYNC_RETRY_DELAY_SECS must be between 0 and 300 seconds. Got: {}",
                delay
            );
        }

        self.level()?;
        Ok(())
    }

    /// Tracing level from `HOSTSYNC_LOG_LEVEL`
    pub fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "HOSTSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Engine configuration with the built-in registry
    pub fn to_sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(&self.hosts_path, &self.data_dir);
        if let Some(retries) = self.fetch_retries {
            config.fetch.retries = retries;
        }
        if let Some(timeout) = self.fetch_timeout_secs {
            config.fetch.timeout_secs = timeout;
        }
        if let Some(delay) = self.retry_delay_secs {
            config.fetch.retry_delay_secs = delay;
        }
        config
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is not a valid number ('{}'): {}", name, raw, e)),
        Err(_) => Ok(None),
    }
}

/// The platform hosts file
pub fn default_hosts_path() -> PathBuf {
    if cfg!(windows) {
        let root = env::var_os("SystemRoot").unwrap_or_else(|| "C:\\Windows".into());
        PathBuf::from(root)
            .join("System32")
            .join("drivers")
            .join("etc")
            .join("hosts")
    } else {
        PathBuf::from("/etc/hosts")
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}
