//! Source and service registry
//!
//! The registry holds the immutable set of remote sources and the managed
//! block definitions for every service the engine may touch. It is built once
//! (from defaults or configuration) and then shared read-only.
//!
//! ## Usage
//!
//! ```rust
//! use hostsync_core::registry::{SourceRegistry, ServiceTag};
//!
//! let registry = SourceRegistry::with_defaults();
//! let source = registry.source("GitHub520").unwrap();
//! assert_eq!(source.service, ServiceTag::new("github"));
//!
//! // TinsFox is the alternate for the GitHub service
//! let fallback = registry.fallback_for("GitHub520").unwrap();
//! assert_eq!(fallback.name, "TinsFox");
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of the domain set a block or history entry belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTag(String);

impl ServiceTag {
    /// Create a service tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Borrow the tag as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// A named remote endpoint supplying raw host-mapping text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSource {
    /// Registry name (e.g., "GitHub520")
    pub name: String,

    /// URL fetched with a plain GET
    pub url: String,

    /// Service whose block this source feeds
    pub service: ServiceTag,

    /// Whether the fallback policy may pick this source as an alternate
    #[serde(default)]
    pub is_fallback: bool,
}

impl HostSource {
    /// Create a source entry
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        service: impl Into<ServiceTag>,
        is_fallback: bool,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            service: service.into(),
            is_fallback,
        }
    }
}

/// How fetched text becomes a candidate block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// The raw text is the candidate, verbatim
    Full,
    /// Only allow-listed lines are kept, optionally inside a sentinel pair
    Scoped,
}

/// Upstream begin/end markers that delimit the relevant section of a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinels {
    pub begin: String,
    pub end: String,
}

/// What the extractor and merge engine may touch for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedBlock {
    /// Service this block belongs to
    pub service: ServiceTag,

    /// Human-readable title used in generated headers
    pub title: String,

    /// Extraction mode
    pub mode: ExtractMode,

    /// First line of every block written by the engine
    pub begin_marker: String,

    /// Last line of every block written by the engine
    pub end_marker: String,

    /// Section markers in upstream text (scoped mode only)
    #[serde(default)]
    pub sentinels: Option<Sentinels>,

    /// Domains whose lines the scoped extractor keeps, in priority order
    #[serde(default)]
    pub domain_allow_list: Vec<String>,

    /// Domains that must appear in a candidate for it to pass the sanity check
    #[serde(default)]
    pub required_domains: Vec<String>,

    /// Lines containing any of these start a pre-marker managed region
    #[serde(default)]
    pub legacy_keywords: Vec<String>,

    /// Host names whose individual entries outside a region are dropped
    #[serde(default)]
    pub legacy_entries: Vec<String>,
}

impl ManagedBlock {
    /// Create a block definition with engine-owned markers derived from the tag
    pub fn new(service: impl Into<ServiceTag>, title: impl Into<String>, mode: ExtractMode) -> Self {
        let service = service.into();
        Self {
            begin_marker: format!("# hostsync:{} begin", service),
            end_marker: format!("# hostsync:{} end", service),
            service,
            title: title.into(),
            mode,
            sentinels: None,
            domain_allow_list: Vec::new(),
            required_domains: Vec::new(),
            legacy_keywords: Vec::new(),
            legacy_entries: Vec::new(),
        }
    }

    /// Set the upstream sentinel pair
    pub fn with_sentinels(mut self, begin: impl Into<String>, end: impl Into<String>) -> Self {
        self.sentinels = Some(Sentinels {
            begin: begin.into(),
            end: end.into(),
        });
        self
    }

    /// Set the domain allow list
    pub fn with_allow_list<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain_allow_list = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Set the required literal domains
    pub fn with_required<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Set the legacy region keywords
    pub fn with_legacy_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legacy_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Set the legacy single-line entries
    pub fn with_legacy_entries<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legacy_entries = hosts.into_iter().map(Into::into).collect();
        self
    }
}

const STEAM_DOMAINS: &[&str] = &[
    "steamcommunity.com",
    "store.steampowered.com",
    "api.steampowered.com",
    "media.steampowered.com",
    "cloud-ops.steamstatic.com",
    "client-download.steamstatic.com",
    "cm.steampowered.com",
    "content.steampowered.com",
    "content1.steampowered.com",
    "content2.steampowered.com",
    "content3.steampowered.com",
    "content4.steampowered.com",
    "content5.steampowered.com",
    "content6.steampowered.com",
    "content7.steampowered.com",
    "content8.steampowered.com",
    "edge.steam-dns.top.comcast.net",
];

const STEAM_HOSTS_URL: &str = "https://raw.githubusercontent.com/Clov614/SteamHostSync/main/Hosts_steam";
const STEAM_MIRROR_URL: &str =
    "https://hub.gitmirror.com/raw.githubusercontent.com/Clov614/SteamHostSync/main/Hosts_steam";

/// Immutable registry of sources and managed blocks
///
/// Sources keep their registration order; it decides which alternate the
/// fallback policy picks when several are eligible.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<HostSource>,
    services: HashMap<ServiceTag, ManagedBlock>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in GitHub and Steam services
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for service in default_services() {
            registry.register_service(service);
        }
        for source in default_sources() {
            // Defaults are consistent by construction
            let _ = registry.register_source(source);
        }
        registry
    }

    /// Build a registry from explicit lists, validating cross references
    pub fn from_parts(sources: Vec<HostSource>, services: Vec<ManagedBlock>) -> Result<Self> {
        let mut registry = Self::new();
        for service in services {
            registry.register_service(service);
        }
        for source in sources {
            registry.register_source(source)?;
        }
        Ok(registry)
    }

    /// Register a managed block definition, replacing any with the same tag
    pub fn register_service(&mut self, block: ManagedBlock) {
        self.services.insert(block.service.clone(), block);
    }

    /// Register a source
    ///
    /// Fails if the name is taken or the source names an unregistered service.
    pub fn register_source(&mut self, source: HostSource) -> Result<()> {
        if self.sources.iter().any(|s| s.name == source.name) {
            return Err(Error::config(format!(
                "duplicate source name: {}",
                source.name
            )));
        }
        if !self.services.contains_key(&source.service) {
            return Err(Error::UnknownService(source.service.to_string()));
        }
        self.sources.push(source);
        Ok(())
    }

    /// Look up a source by name
    pub fn source(&self, name: &str) -> Result<&HostSource> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::UnknownSource(name.to_string()))
    }

    /// Look up a managed block by service tag
    pub fn service(&self, tag: &ServiceTag) -> Result<&ManagedBlock> {
        self.services
            .get(tag)
            .ok_or_else(|| Error::UnknownService(tag.to_string()))
    }

    /// The alternate source the fallback policy should try after `preferred`
    ///
    /// Returns the first fallback-eligible source serving the same service,
    /// excluding the preferred one itself.
    pub fn fallback_for(&self, preferred: &str) -> Option<&HostSource> {
        let preferred = self.source(preferred).ok()?;
        self.sources
            .iter()
            .find(|s| s.service == preferred.service && s.name != preferred.name && s.is_fallback)
    }

    /// All sources in registration order
    pub fn sources(&self) -> &[HostSource] {
        &self.sources
    }

    /// Sources serving one service
    pub fn sources_for(&self, tag: &ServiceTag) -> Vec<&HostSource> {
        self.sources.iter().filter(|s| &s.service == tag).collect()
    }

    /// All managed block definitions, sorted by tag
    pub fn services(&self) -> Vec<&ManagedBlock> {
        let mut blocks: Vec<_> = self.services.values().collect();
        blocks.sort_by(|a, b| a.service.cmp(&b.service));
        blocks
    }
}

/// Built-in managed block definitions
pub fn default_services() -> Vec<ManagedBlock> {
    vec![
        ManagedBlock::new("github", "GitHub Hosts", ExtractMode::Full)
            .with_required(["github.com", "raw.githubusercontent.com"])
            .with_legacy_keywords(["GitHub520 Host Start"]),
        ManagedBlock::new("steam", "Steam Hosts", ExtractMode::Scoped)
            .with_sentinels("#steam Start", "#steam End")
            .with_allow_list(STEAM_DOMAINS.iter().copied())
            .with_required(["steamcommunity.com", "store.steampowered.com"])
            .with_legacy_keywords(["Steam Hosts", "SteamHostSync"])
            .with_legacy_entries(["steamcommunity.com", "store.steampowered.com"]),
    ]
}

/// Built-in sources
pub fn default_sources() -> Vec<HostSource> {
    vec![
        HostSource::new("GitHub520", "https://raw.hellogithub.com/hosts", "github", true),
        HostSource::new("TinsFox", "https://github-hosts.tinsfox.com/hosts", "github", true),
        HostSource::new("SteamGitMirror", STEAM_MIRROR_URL, "steam", true),
        HostSource::new("SteamGitHub", STEAM_HOSTS_URL, "steam", true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_registered() {
        let registry = SourceRegistry::with_defaults();
        assert_eq!(registry.sources().len(), 4);
        assert_eq!(registry.services().len(), 2);
        assert_eq!(
            registry.service(&ServiceTag::new("steam")).unwrap().mode,
            ExtractMode::Scoped
        );
    }

    #[test]
    fn fallback_stays_within_service() {
        let registry = SourceRegistry::with_defaults();
        assert_eq!(registry.fallback_for("SteamGitMirror").unwrap().name, "SteamGitHub");
        assert_eq!(registry.fallback_for("SteamGitHub").unwrap().name, "SteamGitMirror");
        assert_eq!(registry.fallback_for("TinsFox").unwrap().name, "GitHub520");
        assert!(registry.fallback_for("nope").is_none());
    }

    #[test]
    fn fallback_requires_eligibility() {
        let registry = SourceRegistry::from_parts(
            vec![
                HostSource::new("A", "http://a", "github", false),
                HostSource::new("B", "http://b", "github", false),
            ],
            default_services(),
        )
        .unwrap();
        assert!(registry.fallback_for("A").is_none());
    }

    #[test]
    fn duplicate_and_orphan_sources_are_rejected() {
        let mut registry = SourceRegistry::with_defaults();
        let dup = HostSource::new("GitHub520", "http://x", "github", false);
        assert!(matches!(registry.register_source(dup), Err(Error::Config(_))));

        let orphan = HostSource::new("X", "http://x", "epic", false);
        assert!(matches!(
            registry.register_source(orphan),
            Err(Error::UnknownService(_))
        ));
    }

    #[test]
    fn markers_derive_from_tag() {
        let block = ManagedBlock::new("steam", "Steam Hosts", ExtractMode::Scoped);
        assert_eq!(block.begin_marker, "# hostsync:steam begin");
        assert_eq!(block.end_marker, "# hostsync:steam end");
    }
}
