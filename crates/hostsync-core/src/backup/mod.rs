//! Full-content snapshots of the hosts file
//!
//! Snapshots live as plain files in one directory, named
//! `hosts.<kind>_<timestamp>`:
//!
//! | kind          | name                                  |
//! |---------------|---------------------------------------|
//! | original      | `hosts.original_backup` (exactly one) |
//! | pre-update    | `hosts.pre-update_20260102_030405_123456` |
//! | pre-restore   | `hosts.pre-restore_...`               |
//! | manual        | `hosts.manual_...`                    |
//!
//! The original snapshot is written with a no-clobber rename, so once it
//! exists nothing in this module can overwrite it, and [`BackupStore::delete`]
//! refuses to remove it. When there was no hosts file to preserve before the
//! first change, an empty `.original_absent` marker takes its place for good.
//! Names from older releases (`hosts.backup_*`,
//! `hosts.steam_backup_*`, `hosts.before_restore_*`) are listed too.
//!
//! The store has no internal lock. Uniqueness of names relies on the
//! microsecond timestamp plus a counter suffix under sequential use.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fsutil;

/// Reserved name of the original snapshot
pub const ORIGINAL_BACKUP_NAME: &str = "hosts.original_backup";

/// Marker left when no hosts file existed before the first mutation
pub const ORIGINAL_ABSENT_MARKER: &str = ".original_absent";

const LEGACY_PREFIXES: &[(&str, SnapshotKind)] = &[
    ("hosts.backup_", SnapshotKind::PreUpdate),
    ("hosts.steam_backup_", SnapshotKind::PreUpdate),
    ("hosts.before_restore_", SnapshotKind::PreRestore),
];

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// First observed state of the hosts file
    Original,
    /// Taken before an apply
    PreUpdate,
    /// Taken before a restore
    PreRestore,
    /// Taken on request
    Manual,
}

impl SnapshotKind {
    /// Short name used in file names and listings
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::PreUpdate => "pre-update",
            Self::PreRestore => "pre-restore",
            Self::Manual => "manual",
        }
    }

    /// Classify a file name, `None` if it is not a snapshot
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name == ORIGINAL_BACKUP_NAME {
            return Some(Self::Original);
        }
        for kind in [Self::PreUpdate, Self::PreRestore, Self::Manual] {
            if name.starts_with(&format!("hosts.{}_", kind.as_str())) {
                return Some(kind);
            }
        }
        LEGACY_PREFIXES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSnapshot {
    /// File name, used as the snapshot id
    pub id: String,
    /// Modification time of the snapshot file
    pub created_at: DateTime<Utc>,
    /// Size in bytes
    pub size_bytes: u64,
    /// Full path
    pub path: PathBuf,
    /// Snapshot kind
    pub kind: SnapshotKind,
}

impl BackupSnapshot {
    /// Size formatted for people
    pub fn human_size(&self) -> String {
        format_size(self.size_bytes)
    }
}

/// Format a byte count as `B`, `KB` or `MB`
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Directory of hosts snapshots
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Store rooted at `dir`; the directory is created on first capture
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Snapshot directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn original_path(&self) -> PathBuf {
        self.dir.join(ORIGINAL_BACKUP_NAME)
    }

    fn absent_marker_path(&self) -> PathBuf {
        self.dir.join(ORIGINAL_ABSENT_MARKER)
    }

    /// Whether the hosts file did not exist before the first mutation
    pub fn original_was_absent(&self) -> bool {
        !self.original_path().exists() && self.absent_marker_path().exists()
    }

    /// Capture the original snapshot unless one already exists
    ///
    /// Returns `true` when a snapshot was written by this call. A missing
    /// hosts file is not an error: there is nothing to preserve yet.
    pub fn ensure_original(&self, hosts_path: &Path) -> Result<bool> {
        self.capture_original(hosts_path, false)
    }

    /// Like [`ensure_original`](Self::ensure_original), called right before
    /// the hosts file is mutated
    ///
    /// When the hosts file is missing, records that fact instead, so content
    /// written later is never mistaken for the original.
    pub fn seal_original(&self, hosts_path: &Path) -> Result<bool> {
        self.capture_original(hosts_path, true)
    }

    fn capture_original(&self, hosts_path: &Path, before_mutation: bool) -> Result<bool> {
        if self.original_path().exists() || self.absent_marker_path().exists() {
            return Ok(false);
        }
        let Some(bytes) = read_if_present(hosts_path, "read hosts for original backup")? else {
            if before_mutation {
                fsutil::ensure_dir(&self.dir, "create backup directory")?;
                fsutil::replace_file(&self.absent_marker_path(), b"", "record absent original")?;
                info!(
                    "No hosts file at {} before first change, original recorded as absent",
                    hosts_path.display()
                );
            } else {
                debug!("No hosts file at {}, original backup deferred", hosts_path.display());
            }
            return Ok(false);
        };

        fsutil::ensure_dir(&self.dir, "create backup directory")?;
        let target = self.original_path();
        let temp = fsutil::staged_copy(&target, &bytes, "write original backup")?;
        match temp.persist_noclobber(&target) {
            Ok(_) => {
                info!("Captured original hosts snapshot at {}", target.display());
                Ok(true)
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::io("write original backup", &target, e.error)),
        }
    }

    /// Copy the full content of `hosts_path` into a new snapshot
    ///
    /// Returns the new snapshot id, or `None` when the hosts file does not
    /// exist. Capturing [`SnapshotKind::Original`] only ever creates the
    /// reserved snapshot once and returns its id.
    pub fn capture(&self, hosts_path: &Path, kind: SnapshotKind) -> Result<Option<String>> {
        if kind == SnapshotKind::Original {
            self.ensure_original(hosts_path)?;
            return Ok(self
                .original_path()
                .exists()
                .then(|| ORIGINAL_BACKUP_NAME.to_string()));
        }

        let operation = format!("write {kind} backup");
        let Some(bytes) = read_if_present(hosts_path, "read hosts for backup")? else {
            debug!("No hosts file at {}, skipping {} backup", hosts_path.display(), kind);
            return Ok(None);
        };
        fsutil::ensure_dir(&self.dir, "create backup directory")?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        let base = format!("hosts.{}_{}", kind.as_str(), stamp);

        for n in 0u32..100 {
            let id = if n == 0 { base.clone() } else { format!("{base}-{n}") };
            let target = self.dir.join(&id);
            if target.exists() {
                continue;
            }
            let temp = fsutil::staged_copy(&target, &bytes, &operation)?;
            match temp.persist_noclobber(&target) {
                Ok(_) => {
                    info!("Captured {} snapshot {} ({})", kind, id, format_size(bytes.len() as u64));
                    return Ok(Some(id));
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(Error::io(operation, &target, e.error)),
            }
        }

        Err(Error::Other(format!(
            "could not find a free snapshot name for {base} in {}",
            self.dir.display()
        )))
    }

    /// All snapshots, newest first by modification time
    pub fn list(&self) -> Result<Vec<BackupSnapshot>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io("list backups", &self.dir, e)),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io("list backups", &self.dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if SnapshotKind::from_file_name(&name).is_none() {
                continue;
            }
            if let Some(snapshot) = self.describe(&name)? {
                snapshots.push(snapshot);
            }
        }

        snapshots.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(snapshots)
    }

    /// Look up a snapshot by id
    pub fn get(&self, id: &str) -> Result<BackupSnapshot> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(Error::snapshot_not_found(id));
        }
        if SnapshotKind::from_file_name(id).is_none() {
            return Err(Error::snapshot_not_found(id));
        }
        self.describe(id)?
            .ok_or_else(|| Error::snapshot_not_found(id))
    }

    /// The original snapshot, if captured
    pub fn original(&self) -> Result<Option<BackupSnapshot>> {
        self.describe(ORIGINAL_BACKUP_NAME)
    }

    /// Full content of a snapshot
    pub fn read(&self, id: &str) -> Result<Vec<u8>> {
        let snapshot = self.get(id)?;
        fs::read(&snapshot.path).map_err(|e| Error::io("read backup", &snapshot.path, e))
    }

    /// Delete a snapshot; the original is protected
    pub fn delete(&self, id: &str) -> Result<()> {
        let snapshot = self.get(id)?;
        if snapshot.kind == SnapshotKind::Original {
            return Err(Error::ProtectedSnapshot(snapshot.id));
        }
        fs::remove_file(&snapshot.path).map_err(|e| Error::io("delete backup", &snapshot.path, e))?;
        info!("Deleted snapshot {}", snapshot.id);
        Ok(())
    }

    fn describe(&self, id: &str) -> Result<Option<BackupSnapshot>> {
        let Some(kind) = SnapshotKind::from_file_name(id) else {
            return Ok(None);
        };
        let path = self.dir.join(id);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io("inspect backup", &path, e)),
        };
        let created_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(BackupSnapshot {
            id: id.to_string(),
            created_at,
            size_bytes: metadata.len(),
            path,
            kind,
        }))
    }
}

fn read_if_present(path: &Path, operation: &str) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(operation, path, e)),
    }
}
