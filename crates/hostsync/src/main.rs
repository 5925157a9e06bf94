// # hostsync - hosts file synchronization CLI
//
// This binary is a THIN integration layer: every hosts, backup and history
// rule lives in hostsync-core.
//
// The binary is responsible for:
// 1. Reading configuration from environment variables (see `settings`)
// 2. Initializing logging and the runtime
// 3. Running fetches on a spawned task and handing the candidate back
// 4. Asking for confirmation on the terminal
// 5. Providing the platform `NetworkMaintenance` implementation
//
// ## Example
//
// ```bash
// export HOSTSYNC_LOG_LEVEL=debug
//
// hostsync fetch GitHub520
// sudo -E hostsync apply GitHub520
// sudo -E hostsync apply SteamGitMirror --service steam --yes
// hostsync backups
// sudo -E hostsync restore-original
// ```

mod confirm;
mod maintenance;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hostsync_core::traits::{MaintenanceReport, NetworkMaintenance};
use hostsync_core::{
    ApplyOutcome, Candidate, HistoryEntry, HostsEngine, HostsState, RestoreOutcome, ServiceTag,
};
use hostsync_source_http::HttpTransport;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

use crate::confirm::StdinConfirm;
use crate::maintenance::SystemMaintenance;
use crate::settings::Config;

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy)]
enum HostsyncExitCode {
    /// Command completed
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (network, I/O, unknown snapshot, ...)
    RuntimeError = 2,
    /// The hosts file or data directory needs elevated rights
    PermissionError = 3,
}

impl From<HostsyncExitCode> for ExitCode {
    fn from(code: HostsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Keep curated host mappings in the system hosts file, with backups and rollback.
#[derive(Parser)]
#[command(name = "hostsync", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a source and print the candidate block
    Fetch {
        /// Source name (see `hostsync sources`)
        source: String,
        /// Service to extract for (must match the source's service)
        #[arg(long)]
        service: Option<String>,
    },

    /// Fetch a source and write its block into the hosts file
    Apply {
        source: String,
        /// Service to extract for (must match the source's service)
        #[arg(long)]
        service: Option<String>,
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// List snapshots, newest first
    Backups,

    /// Print the content of a snapshot
    ShowBackup { id: String },

    /// Take a manual snapshot of the hosts file
    Snapshot,

    /// Replace the hosts file with a snapshot
    Restore {
        id: String,
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Replace the hosts file with the original snapshot
    RestoreOriginal {
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Delete a snapshot (the original is protected)
    DeleteBackup { id: String },

    /// Show the operation history
    History,

    /// Delete the operation history
    ClearHistory,

    /// Check whether the hosts file carries a service's domains
    Status {
        #[arg(long)]
        service: Option<String>,
    },

    /// List configured sources
    Sources,

    /// Flush the system DNS cache
    FlushDns,

    /// Reset the network stack (Windows only)
    ResetNetwork,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return HostsyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return HostsyncExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return HostsyncExitCode::ConfigError.into();
        }
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HostsyncExitCode::ConfigError.into();
    }

    debug!("Hosts file: {}", config.hosts_path.display());
    debug!("Data directory: {}", config.data_dir.display());

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HostsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(run(cli.command, config));
    match result {
        Ok(()) => HostsyncExitCode::Success.into(),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            exit_code_for(&e).into()
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> HostsyncExitCode {
    match err.downcast_ref::<hostsync_core::Error>() {
        Some(e) if e.is_permission() => HostsyncExitCode::PermissionError,
        Some(hostsync_core::Error::Config(_)) => HostsyncExitCode::ConfigError,
        _ => HostsyncExitCode::RuntimeError,
    }
}

async fn run(command: Commands, config: Config) -> Result<()> {
    // Maintenance commands do not need the engine
    match &command {
        Commands::FlushDns => return report(SystemMaintenance.flush_dns_cache()),
        Commands::ResetNetwork => return report(SystemMaintenance.reset_stack()),
        _ => {}
    }

    let transport = Arc::new(HttpTransport::new());
    let (mut engine, mut events) = HostsEngine::open(config.to_sync_config(), transport)?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    match command {
        Commands::Fetch { source, service } => {
            let candidate = fetch(&engine, source, service).await?;
            print_candidate_summary(&candidate);
            print!("{}", candidate.body);
        }

        Commands::Apply {
            source,
            service,
            yes,
        } => {
            let candidate = fetch(&engine, source, service).await?;
            print_candidate_summary(&candidate);

            let outcome = engine.confirm_and_apply(
                &candidate.body,
                &candidate.service,
                &StdinConfirm { assume_yes: yes },
            )?;
            match outcome {
                ApplyOutcome::Applied {
                    backup_id,
                    record_count,
                    history_recorded,
                } => {
                    println!(
                        "Updated {} block with {} entries in {}",
                        candidate.service,
                        record_count,
                        engine.hosts_path().display()
                    );
                    match backup_id {
                        Some(id) => println!("Previous content saved as {}", id),
                        None => println!("No previous hosts file to back up"),
                    }
                    if !history_recorded {
                        println!("Note: the history ledger could not be saved");
                    }
                    println!("Run `hostsync flush-dns` to make the change visible immediately.");
                }
                ApplyOutcome::Aborted => println!("Aborted, nothing changed"),
            }
        }

        Commands::Backups => {
            let backups = engine.list_backups()?;
            if backups.is_empty() {
                println!("No snapshots");
            }
            for snapshot in backups {
                println!(
                    "{:<45} {:<12} {}  {:>9}",
                    snapshot.id,
                    snapshot.kind,
                    snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    snapshot.human_size()
                );
            }
        }

        Commands::ShowBackup { id } => {
            let bytes = engine.read_backup(&id)?;
            print!("{}", String::from_utf8_lossy(&bytes));
        }

        Commands::Snapshot => match engine.capture_manual()? {
            Some(id) => println!("Saved snapshot {}", id),
            None => println!("No hosts file at {}, nothing to save", engine.hosts_path().display()),
        },

        Commands::Restore { id, yes } => {
            let outcome = engine.restore(&id, &StdinConfirm { assume_yes: yes })?;
            print_restore(outcome);
        }

        Commands::RestoreOriginal { yes } => {
            let outcome = engine.restore_original(&StdinConfirm { assume_yes: yes })?;
            print_restore(outcome);
        }

        Commands::DeleteBackup { id } => {
            engine.delete_backup(&id)?;
            println!("Deleted snapshot {}", id);
        }

        Commands::History => {
            let history = engine.history();
            if history.is_empty() {
                println!("No history");
            }
            // Newest first
            for entry in history.iter().rev() {
                println!("{}", describe_entry(entry));
            }
        }

        Commands::ClearHistory => {
            engine.clear_history()?;
            println!("History cleared");
        }

        Commands::Status { service } => {
            let tags: Vec<ServiceTag> = match service {
                Some(tag) => vec![ServiceTag::new(tag)],
                None => engine
                    .registry()
                    .services()
                    .into_iter()
                    .map(|block| block.service.clone())
                    .collect(),
            };
            for tag in tags {
                let status = engine.status(&tag)?;
                let state = match &status.state {
                    HostsState::Configured { managed_block: true } => "configured".to_string(),
                    HostsState::Configured { managed_block: false } => {
                        "configured (not managed by hostsync)".to_string()
                    }
                    HostsState::NeedsUpdate { missing } => {
                        format!("needs update (missing {})", missing.join(", "))
                    }
                    HostsState::MissingFile => "hosts file missing".to_string(),
                    HostsState::Unreadable(reason) => format!("unreadable: {}", reason),
                };
                println!("{:<8} {}", tag, state);
                if let Some(entry) = &status.last_update {
                    println!("         last update: {}", describe_entry(entry));
                }
            }
        }

        Commands::Sources => {
            for source in engine.registry().sources() {
                println!(
                    "{:<16} {:<8} {}{}",
                    source.name,
                    source.service,
                    source.url,
                    if source.is_fallback { "" } else { " (no fallback)" }
                );
            }
        }

        // Handled above
        Commands::FlushDns | Commands::ResetNetwork => {}
    }

    Ok(())
}

/// Run the fetch on its own task and wait for the candidate
async fn fetch(engine: &HostsEngine, source: String, service: Option<String>) -> Result<Candidate> {
    let handle = engine.fetch_handle();
    let task = tokio::spawn(async move {
        match service {
            Some(tag) => handle.fetch_scoped(&source, &ServiceTag::new(tag)).await,
            None => handle.fetch_primary(&source).await,
        }
    });

    let candidate = task
        .await
        .map_err(|e| anyhow::anyhow!("fetch task failed: {}", e))??;
    info!("Fetched candidate from {}", candidate.source_name);
    Ok(candidate)
}

fn print_candidate_summary(candidate: &Candidate) {
    eprintln!(
        "Candidate for {} from {}: {} entries",
        candidate.service,
        candidate.source_name,
        candidate.entry_count()
    );
    if candidate.used_fallback {
        eprintln!("  the preferred source was unavailable, an alternate source was used");
    }
    if candidate.placeholder {
        eprintln!("  all sources were unavailable; this is SAMPLE data, not real entries");
    }
}

fn print_restore(outcome: RestoreOutcome) {
    match outcome {
        RestoreOutcome::Restored {
            snapshot_id,
            pre_restore_id,
            history_recorded,
        } => {
            println!("Restored hosts file from {}", snapshot_id);
            if let Some(id) = pre_restore_id {
                println!("Replaced content saved as {}", id);
            }
            if !history_recorded {
                println!("Note: the history ledger could not be saved");
            }
        }
        RestoreOutcome::Aborted => println!("Aborted, nothing changed"),
    }
}

fn describe_entry(entry: &HistoryEntry) -> String {
    let when = entry.timestamp().format("%Y-%m-%d %H:%M:%S UTC");
    match entry {
        HistoryEntry::Update { count, .. } => format!("{}  update ({} entries)", when, count),
        HistoryEntry::ServiceUpdate { service, count, .. } => {
            format!("{}  {} update ({} entries)", when, service, count)
        }
        HistoryEntry::Restore { backup_id, note, .. } => {
            format!("{}  restore from {} {}", when, backup_id, note)
        }
        HistoryEntry::RestoreOriginal { .. } => format!("{}  restore original", when),
    }
}

fn report(result: MaintenanceReport) -> Result<()> {
    match result {
        MaintenanceReport::Done(msg) => {
            println!("Done: {}", msg);
            Ok(())
        }
        MaintenanceReport::Unsupported(msg) => {
            println!("Not available: {}", msg);
            Ok(())
        }
        MaintenanceReport::Failed(msg) => anyhow::bail!("maintenance command failed: {}", msg),
    }
}
