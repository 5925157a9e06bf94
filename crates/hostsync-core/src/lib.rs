// # hostsync-core
//
// Core library for keeping curated host mappings in a shared hosts file.
//
// ## Architecture Overview
//
// - **SourceTransport**: Trait for one network read of a remote hosts list
// - **Fetcher**: Engine-owned retries and the one-step fallback between sources
// - **extract**: Full (verbatim) and scoped (allow-listed) candidate extraction
// - **merge**: Managed block scanner and full-content rewrite of the hosts file
// - **BackupStore**: Full-content snapshots, with an immutable original
// - **HistoryLedger**: Bounded, self-healing operation history
// - **HostsEngine**: Owns all of the above and runs the apply state machine
//
// ## Design Principles
//
// 1. **Full rewrites**: The hosts file is only ever replaced atomically, as a whole
// 2. **Backup first**: No mutation proceeds without a snapshot of what it replaces
// 3. **Explicit consent**: Every mutation passes an injected confirmation gate
// 4. **Library-First**: The binary is a thin layer over this crate

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod fsutil;
pub mod history;
pub mod merge;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use backup::{BackupSnapshot, BackupStore, SnapshotKind};
pub use config::{ApplyConfig, FetchConfig, SyncConfig};
pub use engine::{
    ApplyOutcome, ApplyState, EngineEvent, FetchHandle, HostsEngine, HostsState, HostsStatus,
    RestoreOutcome,
};
pub use error::{Error, Result};
pub use extract::Candidate;
pub use fetch::{FetchPolicy, FetchResult, Fetcher};
pub use history::{HistoryEntry, HistoryLedger};
pub use registry::{ExtractMode, HostSource, ManagedBlock, ServiceTag, SourceRegistry};
pub use traits::{ConfirmApply, ConfirmRequest, NetworkMaintenance, SourceTransport};
