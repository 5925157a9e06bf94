// # History Ledger
//
// Bounded, persisted list of the operations the engine performed.
//
// ## File Format
//
// ```json
// {
//   "update_history": [
//     { "type": "update", "timestamp": "2026-01-02T03:04:05Z", "count": 120,
//       "backup_id": "hosts.pre-update_20260102_030405_000001" },
//     { "type": "service_update", "timestamp": "...", "service": "steam", "count": 9 },
//     { "type": "restore", "timestamp": "...", "backup_id": "hosts.manual_...",
//       "note": "..." },
//     { "type": "restore_original", "timestamp": "..." }
//   ]
// }
// ```
//
// Entries are kept oldest first. Every save clamps the list to the
// `MAX_HISTORY` most recent entries.
//
// ## Crash Recovery
//
// - Atomic writes: temp file in the same directory, then rename
// - Backup: the previous good file is kept as `<name>.backup`
// - A file that is not valid JSON is recovered from the backup, else the
//   ledger starts empty
// - Individual records that do not match the schema are dropped with a
//   warning; the cleaned ledger is written back once, at load

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::fsutil;
use crate::registry::ServiceTag;

/// Maximum number of retained history entries
pub const MAX_HISTORY: usize = 10;

/// One recorded operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEntry {
    /// Full update of the primary service block
    Update {
        timestamp: DateTime<Utc>,
        /// Entry lines in the written block
        count: usize,
        /// Pre-update snapshot, absent on first run
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backup_id: Option<String>,
    },
    /// Update of a scoped service block
    ServiceUpdate {
        timestamp: DateTime<Utc>,
        service: ServiceTag,
        count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backup_id: Option<String>,
    },
    /// Hosts file replaced by a stored snapshot
    Restore {
        timestamp: DateTime<Utc>,
        /// Snapshot that was restored
        backup_id: String,
        #[serde(default)]
        note: String,
    },
    /// Hosts file replaced by the original snapshot
    RestoreOriginal {
        timestamp: DateTime<Utc>,
        /// Pre-restore snapshot taken before the write
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backup_id: Option<String>,
    },
}

impl HistoryEntry {
    /// When the operation completed
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Update { timestamp, .. }
            | Self::ServiceUpdate { timestamp, .. }
            | Self::Restore { timestamp, .. }
            | Self::RestoreOriginal { timestamp, .. } => *timestamp,
        }
    }

    /// Persisted `type` value
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Update { .. } => "update",
            Self::ServiceUpdate { .. } => "service_update",
            Self::Restore { .. } => "restore",
            Self::RestoreOriginal { .. } => "restore_original",
        }
    }

    /// Entry count of an update, `None` for restores
    pub fn record_count(&self) -> Option<usize> {
        match self {
            Self::Update { count, .. } | Self::ServiceUpdate { count, .. } => Some(*count),
            _ => None,
        }
    }

    /// Snapshot referenced by this entry
    pub fn backup_id(&self) -> Option<&str> {
        match self {
            Self::Update { backup_id, .. }
            | Self::ServiceUpdate { backup_id, .. }
            | Self::RestoreOriginal { backup_id, .. } => backup_id.as_deref(),
            Self::Restore { backup_id, .. } => Some(backup_id),
        }
    }

    /// Service of a scoped update
    pub fn service(&self) -> Option<&ServiceTag> {
        match self {
            Self::ServiceUpdate { service, .. } => Some(service),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct LedgerFile<'a> {
    update_history: &'a [HistoryEntry],
}

#[derive(Deserialize)]
struct RawLedgerFile {
    #[serde(default)]
    update_history: Vec<serde_json::Value>,
}

/// Parse raw records, dropping the ones that do not match the schema
///
/// Idempotent: feeding the serialized output back in drops nothing.
pub fn sanitize(records: Vec<serde_json::Value>) -> (Vec<HistoryEntry>, Vec<Error>) {
    let mut entries = Vec::with_capacity(records.len());
    let mut dropped = Vec::new();

    for (index, value) in records.into_iter().enumerate() {
        match serde_json::from_value::<HistoryEntry>(value) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                let err = Error::MalformedHistoryRecord {
                    index,
                    reason: e.to_string(),
                };
                warn!("Dropping {}", err);
                dropped.push(err);
            }
        }
    }

    (entries, dropped)
}

/// Persisted, bounded operation history
#[derive(Debug)]
pub struct HistoryLedger {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl HistoryLedger {
    /// Empty ledger that will persist to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Load the ledger, recovering from corruption
    ///
    /// Malformed records never fail the load. When anything was dropped or
    /// clamped, the cleaned ledger is written back once; a failure to do so
    /// is logged and ignored.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (entries, dirty) = Self::load_with_recovery(&path)?;

        let mut ledger = Self { path, entries };
        let clamped = ledger.clamp();

        if dirty || clamped {
            if let Err(e) = ledger.save() {
                warn!("Failed to persist sanitized history: {}", e);
            }
        }
        debug!("Loaded {} history entries", ledger.entries.len());
        Ok(ledger)
    }

    fn load_with_recovery(path: &Path) -> Result<(Vec<HistoryEntry>, bool)> {
        let records = match Self::read_records(path) {
            Ok(Some(records)) => records,
            Ok(None) => return Ok((Vec::new(), false)),
            Err(Error::Json(e)) => {
                warn!(
                    "History file {} is corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );
                let backup = Self::backup_path(path);
                match Self::read_records(&backup) {
                    Ok(Some(records)) => {
                        info!("Recovered history from {}", backup.display());
                        // Forces a rewrite of the corrupted file
                        let (entries, _) = sanitize(records);
                        return Ok((entries, true));
                    }
                    Ok(None) => {
                        warn!("No history backup found. Starting with empty history.");
                        return Ok((Vec::new(), true));
                    }
                    Err(backup_err) => {
                        error!(
                            "History backup also unreadable: {}. Starting with empty history.",
                            backup_err
                        );
                        return Ok((Vec::new(), true));
                    }
                }
            }
            Err(e) => return Err(e),
        };

        let (entries, dropped) = sanitize(records);
        Ok((entries, !dropped.is_empty()))
    }

    fn read_records(path: &Path) -> Result<Option<Vec<serde_json::Value>>> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io("read history", path, e)),
        };
        // Invalid UTF-8 surfaces as a JSON error and takes the recovery path
        let file: RawLedgerFile = serde_json::from_slice(&content)?;
        Ok(Some(file.update_history))
    }

    /// Path of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries, oldest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Most recent entry matching `predicate`
    pub fn latest_where<F>(&self, predicate: F) -> Option<&HistoryEntry>
    where
        F: Fn(&HistoryEntry) -> bool,
    {
        self.entries.iter().rev().find(|entry| predicate(entry))
    }

    /// Add an entry in memory; call [`save`](Self::save) to persist
    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        self.clamp();
    }

    /// Drop every entry and persist the empty ledger
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.save()
    }

    /// Persist the ledger atomically, clamped to [`MAX_HISTORY`]
    pub fn save(&self) -> Result<()> {
        let start = self.entries.len().saturating_sub(MAX_HISTORY);
        let json = serde_json::to_string_pretty(&LedgerFile {
            update_history: &self.entries[start..],
        })?;

        fsutil::ensure_dir(fsutil::parent_dir(&self.path), "create history directory")?;

        if self.path.exists() {
            let backup = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup) {
                warn!("Failed to back up history file: {}", e);
            }
        }

        fsutil::replace_file(&self.path, json.as_bytes(), "save history")?;
        debug!("History written to {}", self.path.display());
        Ok(())
    }

    fn clamp(&mut self) -> bool {
        let excess = self.entries.len().saturating_sub(MAX_HISTORY);
        if excess > 0 {
            self.entries.drain(..excess);
        }
        excess > 0
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.as_os_str().to_owned();
        backup.push(".backup");
        PathBuf::from(backup)
    }
}
