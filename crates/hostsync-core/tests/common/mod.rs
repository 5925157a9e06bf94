//! Test doubles and common utilities for contract tests
//!
//! Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use hostsync_core::error::{Error, Result};
use hostsync_core::traits::{ConfirmApply, ConfirmRequest, SourceTransport};
use hostsync_core::{HostSource, SyncConfig};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub const URL_A: &str = "http://source-a.invalid/hosts";
pub const URL_B: &str = "http://source-b.invalid/hosts";
pub const STEAM_URL: &str = "http://steam.invalid/hosts";

/// A GitHub520-style full hosts list with `n` entries
pub fn github_hosts(n: usize) -> String {
    let mut out = String::from("# GitHub520 Host Start\n");
    out.push_str("140.82.112.3 github.com\n");
    out.push_str("185.199.108.133 raw.githubusercontent.com\n");
    for i in 2..n {
        out.push_str(&format!("185.199.108.{} asset{}.github.io\n", i, i));
    }
    out.push_str("# Update time: 2026-01-01T00:00:00+08:00\n");
    out.push_str("# GitHub520 Host End\n");
    out
}

/// An upstream Steam list with a sentinel section
pub const STEAM_SOURCE: &str = "\
# Steam mirror list
23.9.9.9 unrelated.example.com
#steam Start
23.1.1.1 steamcommunity.com
# inline note
23.1.1.2 store.steampowered.com
23.1.1.3 api.steampowered.com
10.0.0.1 not-steam.example.com
#steam End
23.1.1.4 media.steampowered.com
";

/// Transport that replays scripted responses per URL
///
/// When a URL's queue is empty every further call fails with a transient
/// error, so an unscripted URL behaves like an unreachable source.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<String>>>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response
    pub fn respond(&self, url: &str, body: impl Into<String>) -> &Self {
        self.push(url, Ok(body.into()));
        self
    }

    /// Queue `times` transient failures
    pub fn fail(&self, url: &str, times: usize) -> &Self {
        for i in 0..times {
            self.push(url, Err(Error::transport(url, format!("scripted failure {}", i + 1))));
        }
        self
    }

    fn push(&self, url: &str, response: Result<String>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Number of calls made for one URL
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// Number of calls made overall
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SourceTransport for ScriptedTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<String> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

        self.responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Err(Error::transport(url, "unreachable")))
    }

    fn transport_name(&self) -> &'static str {
        "scripted"
    }
}

/// Confirmer that answers a fixed value and records every request
pub struct RecordingConfirm {
    answer: bool,
    requests: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingConfirm {
    pub fn accepting() -> Self {
        Self {
            answer: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn declining() -> Self {
        Self {
            answer: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of confirmation requests seen
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Warnings passed with the most recent request
    pub fn last_warnings(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, warnings)| warnings.clone())
            .unwrap_or_default()
    }

    /// Action text of the most recent request
    pub fn last_action(&self) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|(action, _)| action.clone())
    }
}

impl ConfirmApply for RecordingConfirm {
    fn confirm(&self, request: &ConfirmRequest) -> bool {
        self.requests.lock().unwrap().push((
            request.action.to_string(),
            request.warnings.iter().map(|w| w.to_string()).collect(),
        ));
        self.answer
    }
}

/// Temporary hosts file plus data directory
pub struct Fixture {
    pub dir: TempDir,
    pub hosts: PathBuf,
}

impl Fixture {
    /// Fixture with `initial` as the hosts content (`None`: no hosts file)
    pub fn new(initial: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("hosts");
        if let Some(content) = initial {
            std::fs::write(&hosts, content).unwrap();
        }
        Self { dir, hosts }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Built-in registry with zero retry delay
    pub fn config(&self) -> SyncConfig {
        quick(SyncConfig::new(&self.hosts, self.data_dir()))
    }

    /// Built-in services with an explicit source list
    pub fn config_with_sources(&self, sources: Vec<HostSource>) -> SyncConfig {
        let mut config = self.config();
        config.sources = sources;
        config
    }

    pub fn read_hosts(&self) -> String {
        std::fs::read_to_string(&self.hosts).unwrap()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Zero delay and a short timeout for tests
pub fn quick(mut config: SyncConfig) -> SyncConfig {
    config.fetch.retry_delay_secs = 0;
    config.fetch.timeout_secs = 1;
    config
}

/// Primary source A and alternate source B, both serving `github`
pub fn github_pair() -> Vec<HostSource> {
    vec![
        HostSource::new("A", URL_A, "github", true),
        HostSource::new("B", URL_B, "github", true),
        HostSource::new("SteamTest", STEAM_URL, "steam", false),
    ]
}
