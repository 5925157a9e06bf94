//! Configuration types for the hostsync engine
//!
//! This module defines all configuration structures used throughout the crate.

use crate::registry::{self, HostSource, ManagedBlock, SourceRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// File name of the persisted history ledger inside the data directory
pub const HISTORY_FILE_NAME: &str = "hostsync_history.json";

/// Directory name of the backup store inside the data directory
pub const BACKUP_DIR_NAME: &str = "backup";

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// The shared hosts file the engine rewrites
    pub hosts_path: PathBuf,

    /// Directory holding full-content snapshots
    pub backup_dir: PathBuf,

    /// JSON file holding the operation history
    pub history_path: PathBuf,

    /// Fetch retry settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Apply pipeline settings
    #[serde(default)]
    pub apply: ApplyConfig,

    /// Remote sources
    #[serde(default = "registry::default_sources")]
    pub sources: Vec<HostSource>,

    /// Managed block definitions
    #[serde(default = "registry::default_services")]
    pub services: Vec<ManagedBlock>,
}

impl SyncConfig {
    /// Create a configuration rooted at `data_dir` with built-in sources
    pub fn new(hosts_path: impl Into<PathBuf>, data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            hosts_path: hosts_path.into(),
            backup_dir: data_dir.join(BACKUP_DIR_NAME),
            history_path: data_dir.join(HISTORY_FILE_NAME),
            fetch: FetchConfig::default(),
            apply: ApplyConfig::default(),
            sources: registry::default_sources(),
            services: registry::default_services(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.hosts_path.as_os_str().is_empty() {
            return Err(crate::Error::config("hosts path cannot be empty"));
        }
        if self.backup_dir.as_os_str().is_empty() {
            return Err(crate::Error::config("backup directory cannot be empty"));
        }
        if self.history_path.as_os_str().is_empty() {
            return Err(crate::Error::config("history path cannot be empty"));
        }
        if self.sources.is_empty() {
            return Err(crate::Error::config("no sources configured"));
        }

        self.fetch.validate()?;

        let mut tags = HashSet::new();
        for block in &self.services {
            if !tags.insert(block.service.clone()) {
                return Err(crate::Error::config(format!(
                    "duplicate service tag: {}",
                    block.service
                )));
            }
            if block.begin_marker.trim().is_empty() || block.end_marker.trim().is_empty() {
                return Err(crate::Error::config(format!(
                    "service {} needs non-empty block markers",
                    block.service
                )));
            }
        }

        for source in &self.sources {
            if !source.url.starts_with("https://") && !source.url.starts_with("http://") {
                return Err(crate::Error::config(format!(
                    "source {} must use an http or https URL, got: {}",
                    source.name, source.url
                )));
            }
        }

        // Cross references (duplicate names, unknown services)
        self.registry().map(|_| ())
    }

    /// Build the source registry described by this configuration
    pub fn registry(&self) -> Result<SourceRegistry, crate::Error> {
        SourceRegistry::from_parts(self.sources.clone(), self.services.clone())
    }
}

/// Fetch retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Attempts per source
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Timeout of a single attempt (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay between attempts (in seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl FetchConfig {
    /// Validate the fetch settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.retries == 0 {
            return Err(crate::Error::config("fetch retries must be >= 1"));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("fetch timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            timeout_secs: default_timeout_secs(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

/// Apply pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_event_channel_capacity() -> usize {
    64
}
