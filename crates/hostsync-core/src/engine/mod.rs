//! Core hosts engine
//!
//! The HostsEngine owns everything that touches the shared hosts file:
//! - the source registry and the fetcher (read side, spawnable)
//! - the backup store and the history ledger (write side)
//! - the apply state machine
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   Candidate   ┌──────────────┐
//! │ FetchHandle  │──────────────▶│ HostsEngine  │
//! │ (async task) │               │ (&mut self)  │
//! └──────────────┘               └──────────────┘
//!                                       │
//!         ┌─────────────────┬───────────┼──────────────┬──────────────┐
//!         ▼                 ▼           ▼              ▼              ▼
//! ┌──────────────┐  ┌─────────────┐ ┌────────┐ ┌──────────────┐ ┌──────────┐
//! │ ConfirmApply │  │ BackupStore │ │ merge  │ │ HistoryLedger│ │  Events  │
//! │ (gate)       │  │ (snapshot)  │ │(write) │ │ (record)     │ │ (notify) │
//! └──────────────┘  └─────────────┘ └────────┘ └──────────────┘ └──────────┘
//! ```
//!
//! ## Apply Flow
//!
//! `Idle → Confirming → BackingUp → Writing → Recording → Idle`
//!
//! 1. Sanity check the candidate; warnings go to the confirmer
//! 2. Abort on a negative confirmation, with no side effects
//! 3. Capture a pre-update snapshot (skipped when the file does not exist)
//! 4. Replace the file with `remove_managed_block(current) + block`
//! 5. Append a history entry; a failure here is logged, never rolled back
//!
//! A failure while backing up or writing moves the engine to `Failed` and
//! leaves the live file as it was.
//!
//! ## Concurrency
//!
//! Mutating operations take `&mut self`, so one engine value can never run
//! two of them at once. Fetches only need a [`FetchHandle`], which is
//! `Clone + Send + 'static` and can be moved onto a spawned task.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backup::{BackupSnapshot, BackupStore, ORIGINAL_BACKUP_NAME, SnapshotKind};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::extract::{self, Candidate};
use crate::fetch::{FetchPolicy, Fetcher};
use crate::fsutil;
use crate::history::{HistoryEntry, HistoryLedger};
use crate::merge;
use crate::registry::{ExtractMode, ManagedBlock, ServiceTag, SourceRegistry};
use crate::traits::{ConfirmAction, ConfirmApply, ConfirmRequest, SourceTransport};

/// Apply state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    Idle,
    Confirming,
    BackingUp,
    Writing,
    Recording,
    Failed,
}

/// Events emitted by the HostsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A fetch produced a candidate
    FetchCompleted {
        source_name: String,
        service: ServiceTag,
        used_fallback: bool,
        placeholder: bool,
    },

    /// The apply state machine moved
    StateChanged { from: ApplyState, to: ApplyState },

    /// The candidate failed a sanity check
    ValidationWarning { service: ServiceTag, message: String },

    /// The confirmer declined
    Aborted { action: String },

    /// A managed block was written
    Applied {
        service: ServiceTag,
        record_count: usize,
        backup_id: Option<String>,
    },

    /// The live file was replaced by a snapshot
    Restored {
        snapshot_id: String,
        pre_restore_id: Option<String>,
    },

    /// The history ledger could not be saved
    HistoryNotRecorded { error: String },

    /// A mutating operation failed
    Failed { operation: String, error: String },
}

/// Result of [`HostsEngine::confirm_and_apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The block was written
    Applied {
        /// Pre-update snapshot, `None` when the file did not exist
        backup_id: Option<String>,
        /// Entry lines in the written block
        record_count: usize,
        /// Whether the history ledger was saved
        history_recorded: bool,
    },
    /// Declined by the confirmer; nothing was touched
    Aborted,
}

/// Result of a restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The live file now holds the snapshot bytes
    Restored {
        snapshot_id: String,
        /// Snapshot of the content that was replaced
        pre_restore_id: Option<String>,
        history_recorded: bool,
    },
    /// Declined by the confirmer; nothing was touched
    Aborted,
}

/// What the live file looks like for one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostsState {
    /// Every required domain is present
    Configured {
        /// Whether an engine-written block for the service exists
        managed_block: bool,
    },
    /// Some required domains are missing
    NeedsUpdate { missing: Vec<String> },
    /// The hosts file does not exist
    MissingFile,
    /// The hosts file could not be read
    Unreadable(String),
}

/// Status report for one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostsStatus {
    pub service: ServiceTag,
    pub hosts_path: PathBuf,
    pub state: HostsState,
    /// Most recent history entry for the service
    pub last_update: Option<HistoryEntry>,
}

/// Read side of the engine: fetch and extract
///
/// Cheap to clone; holds no reference to the write side.
#[derive(Debug, Clone)]
pub struct FetchHandle {
    fetcher: Fetcher,
    registry: Arc<SourceRegistry>,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl FetchHandle {
    /// Fetch a source (with fallback) and extract it for the source's own service
    pub async fn fetch_primary(&self, source_name: &str) -> Result<Candidate> {
        let service = self.registry.source(source_name)?.service.clone();
        self.fetch_for(source_name, &service).await
    }

    /// Fetch a source (with fallback) and extract it for `service`
    ///
    /// The source must serve `service`.
    pub async fn fetch_scoped(&self, source_name: &str, service: &ServiceTag) -> Result<Candidate> {
        let source = self.registry.source(source_name)?;
        if &source.service != service {
            return Err(Error::config(format!(
                "source {} serves '{}', not '{}'",
                source_name, source.service, service
            )));
        }
        self.fetch_for(source_name, service).await
    }

    async fn fetch_for(&self, source_name: &str, service: &ServiceTag) -> Result<Candidate> {
        let block = self.registry.service(service)?;
        let fetched = self
            .fetcher
            .fetch_with_fallback(&self.registry, source_name)
            .await?;

        if let Some(reason) = &fetched.error {
            warn!("Fetch for {} degraded: {}", service, reason);
        }

        let candidate = extract::extract(block, &fetched);
        info!(
            "Candidate for {} from {}: {} entries{}",
            service,
            candidate.source_name,
            candidate.entry_count(),
            if candidate.placeholder { " (placeholder)" } else { "" }
        );

        emit(
            &self.event_tx,
            EngineEvent::FetchCompleted {
                source_name: candidate.source_name.clone(),
                service: service.clone(),
                used_fallback: candidate.used_fallback,
                placeholder: candidate.placeholder,
            },
        );
        Ok(candidate)
    }

    /// The registry the handle resolves sources against
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }
}

/// Core hosts engine
///
/// One value per hosts file. Create with [`HostsEngine::open`], which also
/// captures the original snapshot when the store has none yet.
#[derive(Debug)]
pub struct HostsEngine {
    hosts_path: PathBuf,
    fetch: FetchHandle,
    backups: BackupStore,
    history: HistoryLedger,
    state: ApplyState,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl HostsEngine {
    /// Open an engine for the configured hosts file
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn open(
        config: SyncConfig,
        transport: Arc<dyn SourceTransport>,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;
        let registry = Arc::new(config.registry()?);

        let capacity = config.apply.event_channel_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        let fetcher = Fetcher::new(transport, FetchPolicy::from(&config.fetch));
        let backups = BackupStore::new(&config.backup_dir);
        let history = HistoryLedger::load(&config.history_path)?;

        // Mutations retry this and fail hard; here a problem is only logged
        if let Err(e) = backups.ensure_original(&config.hosts_path) {
            warn!("Could not capture original hosts snapshot yet: {}", e);
        }

        let engine = Self {
            hosts_path: config.hosts_path,
            fetch: FetchHandle {
                fetcher,
                registry,
                event_tx: tx.clone(),
            },
            backups,
            history,
            state: ApplyState::Idle,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Handle for fetching off the control path
    pub fn fetch_handle(&self) -> FetchHandle {
        self.fetch.clone()
    }

    /// See [`FetchHandle::fetch_primary`]
    pub async fn fetch_primary(&self, source_name: &str) -> Result<Candidate> {
        self.fetch.fetch_primary(source_name).await
    }

    /// See [`FetchHandle::fetch_scoped`]
    pub async fn fetch_scoped(&self, source_name: &str, service: &ServiceTag) -> Result<Candidate> {
        self.fetch.fetch_scoped(source_name, service).await
    }

    /// Source and service registry
    pub fn registry(&self) -> &SourceRegistry {
        &self.fetch.registry
    }

    /// Path of the managed hosts file
    pub fn hosts_path(&self) -> &Path {
        &self.hosts_path
    }

    /// State after the last transition
    pub fn state(&self) -> ApplyState {
        self.state
    }

    /// Replace the managed block of `service` with `candidate_body`
    ///
    /// Runs the full apply state machine. Validation problems never stop the
    /// apply by themselves; they are handed to `confirm`, which decides.
    pub fn confirm_and_apply(
        &mut self,
        candidate_body: &str,
        service: &ServiceTag,
        confirm: &dyn ConfirmApply,
    ) -> Result<ApplyOutcome> {
        let block = self.registry().service(service)?.clone();
        self.state = ApplyState::Idle;

        let warnings = merge::validate_candidate(&block, candidate_body);
        for warning in &warnings {
            warn!("{}", warning);
            self.emit_event(EngineEvent::ValidationWarning {
                service: service.clone(),
                message: warning.to_string(),
            });
        }

        self.transition(ApplyState::Confirming);
        let request = ConfirmRequest {
            action: ConfirmAction::Apply {
                service: service.clone(),
                entry_count: merge::block_entry_count(&block, candidate_body),
            },
            warnings,
        };
        if !confirm.confirm(&request) {
            info!("Update of {} aborted by confirmation", service);
            self.transition(ApplyState::Idle);
            self.emit_event(EngineEvent::Aborted {
                action: request.action.to_string(),
            });
            return Ok(ApplyOutcome::Aborted);
        }

        self.transition(ApplyState::BackingUp);
        let backup_id = match self.snapshot_before_mutation(SnapshotKind::PreUpdate) {
            Ok(id) => id,
            Err(e) => return Err(self.fail("backup before update", e)),
        };

        self.transition(ApplyState::Writing);
        let record_count = match self.write_block(&block, candidate_body) {
            Ok(count) => count,
            Err(e) => return Err(self.fail("write hosts", e)),
        };
        info!("Wrote {} block with {} entries to {}", service, record_count, self.hosts_path.display());

        self.transition(ApplyState::Recording);
        let timestamp = Utc::now();
        let entry = match block.mode {
            ExtractMode::Full => HistoryEntry::Update {
                timestamp,
                count: record_count,
                backup_id: backup_id.clone(),
            },
            ExtractMode::Scoped => HistoryEntry::ServiceUpdate {
                timestamp,
                service: service.clone(),
                count: record_count,
                backup_id: backup_id.clone(),
            },
        };
        let history_recorded = self.record(entry);

        self.transition(ApplyState::Idle);
        self.emit_event(EngineEvent::Applied {
            service: service.clone(),
            record_count,
            backup_id: backup_id.clone(),
        });

        Ok(ApplyOutcome::Applied {
            backup_id,
            record_count,
            history_recorded,
        })
    }

    /// Overwrite the live file with a stored snapshot
    ///
    /// Fails with [`Error::SnapshotNotFound`] before touching anything when
    /// the id is unknown.
    pub fn restore(&mut self, snapshot_id: &str, confirm: &dyn ConfirmApply) -> Result<RestoreOutcome> {
        let snapshot = self.backups.get(snapshot_id)?;
        self.restore_snapshot(snapshot, confirm)
    }

    /// Overwrite the live file with the original snapshot
    pub fn restore_original(&mut self, confirm: &dyn ConfirmApply) -> Result<RestoreOutcome> {
        let Some(snapshot) = self.backups.original()? else {
            if self.backups.original_was_absent() {
                info!(
                    "{} did not exist before its first change; there is no original to restore",
                    self.hosts_path.display()
                );
            }
            return Err(Error::snapshot_not_found(ORIGINAL_BACKUP_NAME));
        };
        self.restore_snapshot(snapshot, confirm)
    }

    fn restore_snapshot(
        &mut self,
        snapshot: BackupSnapshot,
        confirm: &dyn ConfirmApply,
    ) -> Result<RestoreOutcome> {
        let bytes = self.backups.read(&snapshot.id)?;
        self.state = ApplyState::Idle;

        self.transition(ApplyState::Confirming);
        let request = ConfirmRequest {
            action: ConfirmAction::Restore {
                snapshot_id: snapshot.id.clone(),
            },
            warnings: Vec::new(),
        };
        if !confirm.confirm(&request) {
            info!("Restore of {} aborted by confirmation", snapshot.id);
            self.transition(ApplyState::Idle);
            self.emit_event(EngineEvent::Aborted {
                action: request.action.to_string(),
            });
            return Ok(RestoreOutcome::Aborted);
        }

        self.transition(ApplyState::BackingUp);
        let pre_restore_id = match self.snapshot_before_mutation(SnapshotKind::PreRestore) {
            Ok(id) => id,
            Err(e) => return Err(self.fail("backup before restore", e)),
        };

        self.transition(ApplyState::Writing);
        if let Err(e) = fsutil::replace_file(&self.hosts_path, &bytes, "restore hosts") {
            return Err(self.fail("restore hosts", e));
        }
        info!("Restored {} from {}", self.hosts_path.display(), snapshot.id);

        self.transition(ApplyState::Recording);
        let timestamp = Utc::now();
        let entry = if snapshot.kind == SnapshotKind::Original {
            HistoryEntry::RestoreOriginal {
                timestamp,
                backup_id: pre_restore_id.clone(),
            }
        } else {
            HistoryEntry::Restore {
                timestamp,
                backup_id: snapshot.id.clone(),
                note: match &pre_restore_id {
                    Some(id) => format!("replaced content saved as {id}"),
                    None => "no previous hosts file".to_string(),
                },
            }
        };
        let history_recorded = self.record(entry);

        self.transition(ApplyState::Idle);
        self.emit_event(EngineEvent::Restored {
            snapshot_id: snapshot.id.clone(),
            pre_restore_id: pre_restore_id.clone(),
        });

        Ok(RestoreOutcome::Restored {
            snapshot_id: snapshot.id,
            pre_restore_id,
            history_recorded,
        })
    }

    /// Snapshots, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupSnapshot>> {
        self.backups.list()
    }

    /// Content of one snapshot
    pub fn read_backup(&self, snapshot_id: &str) -> Result<Vec<u8>> {
        self.backups.read(snapshot_id)
    }

    /// Take a manual snapshot of the live file
    pub fn capture_manual(&mut self) -> Result<Option<String>> {
        self.backups.ensure_original(&self.hosts_path)?;
        self.backups.capture(&self.hosts_path, SnapshotKind::Manual)
    }

    /// Delete a snapshot; the original is protected
    pub fn delete_backup(&mut self, snapshot_id: &str) -> Result<()> {
        self.backups.delete(snapshot_id)
    }

    /// History entries, oldest first
    pub fn history(&self) -> &[HistoryEntry] {
        self.history.entries()
    }

    /// Drop and persist an empty history
    pub fn clear_history(&mut self) -> Result<()> {
        self.history.clear()?;
        info!("History cleared");
        Ok(())
    }

    /// Check the live file for the required domains of `service`
    pub fn status(&self, service: &ServiceTag) -> Result<HostsStatus> {
        let block = self.registry().service(service)?;

        let state = match fs::read_to_string(&self.hosts_path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => HostsState::MissingFile,
            Err(e) => HostsState::Unreadable(e.to_string()),
            Ok(content) => {
                let missing: Vec<String> = block
                    .required_domains
                    .iter()
                    .filter(|domain| !content.contains(domain.as_str()))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    HostsState::Configured {
                        managed_block: content
                            .lines()
                            .any(|line| line.trim() == block.begin_marker),
                    }
                } else {
                    HostsState::NeedsUpdate { missing }
                }
            }
        };

        let mode = block.mode;
        let last_update = self
            .history
            .latest_where(|entry| match entry {
                HistoryEntry::Update { .. } => mode == ExtractMode::Full,
                HistoryEntry::ServiceUpdate { service: s, .. } => s == service,
                _ => false,
            })
            .cloned();

        Ok(HostsStatus {
            service: service.clone(),
            hosts_path: self.hosts_path.clone(),
            state,
            last_update,
        })
    }

    /// Original snapshot, then the requested one
    fn snapshot_before_mutation(&self, kind: SnapshotKind) -> Result<Option<String>> {
        self.backups.seal_original(&self.hosts_path)?;
        self.backups.capture(&self.hosts_path, kind)
    }

    fn write_block(&self, block: &ManagedBlock, candidate_body: &str) -> Result<usize> {
        let current = match fs::read_to_string(&self.hosts_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No hosts file at {}, starting empty", self.hosts_path.display());
                String::new()
            }
            Err(e) => return Err(Error::io("read hosts", &self.hosts_path, e)),
        };

        let new_body = merge::compose(&current, block, candidate_body);
        fsutil::replace_file(&self.hosts_path, new_body.as_bytes(), "write hosts")?;
        Ok(merge::block_entry_count(block, candidate_body))
    }

    /// Append and persist; a save failure is non-fatal
    fn record(&mut self, entry: HistoryEntry) -> bool {
        self.history.append(entry);
        match self.history.save() {
            Ok(()) => true,
            Err(e) => {
                warn!("History not recorded (hosts file already updated): {}", e);
                self.emit_event(EngineEvent::HistoryNotRecorded {
                    error: e.to_string(),
                });
                false
            }
        }
    }

    fn fail(&mut self, operation: &str, err: Error) -> Error {
        error!("{} failed: {}", operation, err);
        self.transition(ApplyState::Failed);
        self.emit_event(EngineEvent::Failed {
            operation: operation.to_string(),
            error: err.to_string(),
        });
        err
    }

    fn transition(&mut self, to: ApplyState) {
        let from = self.state;
        debug!("Apply state {:?} -> {:?}", from, to);
        self.state = to;
        self.emit_event(EngineEvent::StateChanged { from, to });
    }

    fn emit_event(&self, event: EngineEvent) {
        emit(&self.event_tx, event);
    }
}

/// Send an event, logging a warning if the channel is full
fn emit(tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
        // Nobody is listening
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
