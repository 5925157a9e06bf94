//! Contract Test: Apply State Machine and History Ledger
//!
//! Constraints verified:
//! - Every accepted apply writes one managed block and one history entry
//! - The ledger never holds more than ten entries
//! - Malformed persisted records are dropped on open
//! - A declined confirmation leaves the file, backups and history untouched
//! - Backup failure stops the apply before the hosts file is written
//! - Write failure leaves the live file as it was and its pre-update snapshot
//! - A history save failure is reported but does not undo the write
//! - Scoped updates only touch their own block and keep foreign lines

mod common;

use common::*;
use hostsync_core::history::MAX_HISTORY;
use hostsync_core::{
    ApplyOutcome, ApplyState, EngineEvent, HistoryEntry, HostsEngine, HostsState, ServiceTag,
    SnapshotKind, SyncConfig,
};
use std::sync::Arc;

const USER_HOSTS: &str = "127.0.0.1 localhost\n10.0.0.5 nas.lan  # my NAS\n";

fn github() -> ServiceTag {
    ServiceTag::new("github")
}

fn steam() -> ServiceTag {
    ServiceTag::new("steam")
}

#[tokio::test]
async fn sequential_full_updates_are_recorded_in_order() {
    let fixture = Fixture::new(Some(USER_HOSTS));
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(URL_A, github_hosts(3));
    transport.respond(URL_A, github_hosts(5));

    let (mut engine, _events) =
        HostsEngine::open(fixture.config_with_sources(github_pair()), transport).unwrap();
    let confirm = RecordingConfirm::accepting();

    for _ in 0..2 {
        let candidate = engine.fetch_primary("A").await.unwrap();
        engine
            .confirm_and_apply(&candidate.body, &candidate.service, &confirm)
            .unwrap();
    }

    let counts: Vec<_> = engine
        .history()
        .iter()
        .map(|entry| (entry.kind(), entry.record_count()))
        .collect();
    assert_eq!(counts, vec![("update", Some(3)), ("update", Some(5))]);
    assert!(engine.history()[0].timestamp() <= engine.history()[1].timestamp());
    assert_eq!(confirm.request_count(), 2);

    // Exactly one managed block, holding the second candidate
    let hosts = fixture.read_hosts();
    assert_eq!(hosts.matches("# hostsync:github begin").count(), 1);
    assert!(hosts.contains("asset4.github.io"));
    assert!(hosts.starts_with(USER_HOSTS));
}

#[tokio::test]
async fn ledger_keeps_only_the_latest_ten_entries() {
    let fixture = Fixture::new(Some(USER_HOSTS));
    let transport = Arc::new(ScriptedTransport::new());
    let (mut engine, _events) = HostsEngine::open(fixture.config(), transport).unwrap();
    let confirm = RecordingConfirm::accepting();

    for n in 2..14 {
        engine
            .confirm_and_apply(&github_hosts(n), &github(), &confirm)
            .unwrap();
    }

    let history = engine.history();
    assert_eq!(history.len(), MAX_HISTORY);
    assert_eq!(history.first().unwrap().record_count(), Some(4));
    assert_eq!(history.last().unwrap().record_count(), Some(13));

    // The persisted file agrees after a reopen
    drop(engine);
    let (reopened, _events) =
        HostsEngine::open(fixture.config(), Arc::new(ScriptedTransport::new())).unwrap();
    assert_eq!(reopened.history().len(), MAX_HISTORY);
}

#[tokio::test]
async fn malformed_records_are_dropped_on_open() {
    let fixture = Fixture::new(Some(USER_HOSTS));
    let config = fixture.config();
    std::fs::create_dir_all(config.history_path.parent().unwrap()).unwrap();
    std::fs::write(
        &config.history_path,
        r#"{
  "update_history": [
    {"type": "update", "timestamp": "2026-01-01T00:00:00Z", "count": 3},
    {"type": "mystery", "timestamp": "2026-01-02T00:00:00Z"},
    {"type": "update", "count": "many"},
    42,
    {"type": "service_update", "timestamp": "2026-01-03T00:00:00Z", "service": "steam", "count": 2}
  ]
}"#,
    )
    .unwrap();

    let (engine, _events) =
        HostsEngine::open(config.clone(), Arc::new(ScriptedTransport::new())).unwrap();

    let kinds: Vec<_> = engine.history().iter().map(HistoryEntry::kind).collect();
    assert_eq!(kinds, vec!["update", "service_update"]);

    let persisted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config.history_path).unwrap()).unwrap();
    assert_eq!(persisted["update_history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn declined_apply_has_no_side_effects() {
    let fixture = Fixture::new(Some(USER_HOSTS));
    let (mut engine, mut events) =
        HostsEngine::open(fixture.config(), Arc::new(ScriptedTransport::new())).unwrap();
    let snapshots_before = engine.list_backups().unwrap();

    let confirm = RecordingConfirm::declining();
    let outcome = engine
        .confirm_and_apply(&github_hosts(4), &github(), &confirm)
        .unwrap();

    assert_eq!(outcome, ApplyOutcome::Aborted);
    assert_eq!(engine.state(), ApplyState::Idle);
    assert_eq!(fixture.read_hosts(), USER_HOSTS);
    assert!(engine.history().is_empty());
    assert_eq!(engine.list_backups().unwrap(), snapshots_before);
    assert_eq!(
        confirm.last_action().as_deref(),
        Some("replace the 'github' block with 4 entries")
    );

    let mut saw_abort = false;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, EngineEvent::Applied { .. }));
        saw_abort |= matches!(event, EngineEvent::Aborted { .. });
    }
    assert!(saw_abort);
}

#[tokio::test]
async fn backup_failure_leaves_hosts_unchanged() {
    let fixture = Fixture::new(Some(USER_HOSTS));
    let mut config = fixture.config();
    // A regular file where the backup directory should be
    config.backup_dir = fixture.path().join("not-a-dir");
    std::fs::write(&config.backup_dir, "occupied").unwrap();

    let (mut engine, _events) =
        HostsEngine::open(config, Arc::new(ScriptedTransport::new())).unwrap();

    let result = engine.confirm_and_apply(&github_hosts(4), &github(), &RecordingConfirm::accepting());

    assert!(result.is_err());
    assert_eq!(engine.state(), ApplyState::Failed);
    assert_eq!(fixture.read_hosts(), USER_HOSTS);
    assert!(engine.history().is_empty());
}

/// Checks shared by every failure in the `Writing` state
fn assert_write_failed(
    engine: &HostsEngine,
    events: &mut tokio::sync::mpsc::Receiver<EngineEvent>,
    hosts: &std::path::Path,
    previous: &[u8],
) {
    assert_eq!(engine.state(), ApplyState::Failed);
    assert_eq!(std::fs::read(hosts).unwrap(), previous);
    assert!(engine.history().is_empty());

    let snapshots = engine.list_backups().unwrap();
    let pre_update = snapshots
        .iter()
        .find(|s| s.kind == SnapshotKind::PreUpdate)
        .expect("pre-update snapshot taken before the write");
    assert_eq!(engine.read_backup(&pre_update.id).unwrap(), previous);

    let mut failed_operation = None;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, EngineEvent::Applied { .. }));
        if let EngineEvent::Failed { operation, .. } = event {
            failed_operation = Some(operation);
        }
    }
    assert_eq!(failed_operation.as_deref(), Some("write hosts"));
}

#[tokio::test]
async fn unreadable_hosts_content_fails_in_writing_state() {
    let fixture = Fixture::new(None);
    let previous = b"127.0.0.1 localhost\n10.0.0.7 \xff\xfe-box\n".to_vec();
    std::fs::write(&fixture.hosts, &previous).unwrap();

    let (mut engine, mut events) =
        HostsEngine::open(fixture.config(), Arc::new(ScriptedTransport::new())).unwrap();

    let result = engine.confirm_and_apply(&github_hosts(4), &github(), &RecordingConfirm::accepting());

    assert!(result.is_err());
    assert_write_failed(&engine, &mut events, &fixture.hosts, &previous);
}

#[cfg(unix)]
#[tokio::test]
async fn replace_failure_leaves_hosts_and_snapshot_intact() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new(None);
    let etc = fixture.path().join("etc");
    std::fs::create_dir(&etc).unwrap();
    let hosts = etc.join("hosts");
    std::fs::write(&hosts, USER_HOSTS).unwrap();

    let config = quick(SyncConfig::new(&hosts, fixture.data_dir()));
    let (mut engine, mut events) =
        HostsEngine::open(config, Arc::new(ScriptedTransport::new())).unwrap();

    // Snapshots still go to the data directory; only the hosts directory is locked
    std::fs::set_permissions(&etc, std::fs::Permissions::from_mode(0o555)).unwrap();
    if std::fs::write(etc.join(".write-check"), b"").is_ok() {
        // Privileged runs ignore directory permissions
        std::fs::set_permissions(&etc, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = engine.confirm_and_apply(&github_hosts(4), &github(), &RecordingConfirm::accepting());
    std::fs::set_permissions(&etc, std::fs::Permissions::from_mode(0o755)).unwrap();

    let err = result.unwrap_err();
    assert!(err.is_permission(), "unexpected error: {err}");
    assert_write_failed(&engine, &mut events, &hosts, USER_HOSTS.as_bytes());
}

#[tokio::test]
async fn history_save_failure_does_not_undo_the_write() {
    let fixture = Fixture::new(Some(USER_HOSTS));
    let mut config = fixture.config();
    config.history_path = fixture.path().join("ledger").join("history.json");

    let (mut engine, mut events) =
        HostsEngine::open(config, Arc::new(ScriptedTransport::new())).unwrap();
    // The ledger's parent directory can no longer be created
    std::fs::write(fixture.path().join("ledger"), "occupied").unwrap();

    let outcome = engine
        .confirm_and_apply(&github_hosts(4), &github(), &RecordingConfirm::accepting())
        .unwrap();

    match outcome {
        ApplyOutcome::Applied {
            backup_id,
            record_count,
            history_recorded,
        } => {
            assert!(backup_id.is_some());
            assert_eq!(record_count, 4);
            assert!(!history_recorded);
        }
        other => panic!("expected an applied outcome, got {other:?}"),
    }
    assert_eq!(engine.state(), ApplyState::Idle);
    assert!(fixture.read_hosts().contains("# hostsync:github begin"));

    let mut reported = false;
    while let Ok(event) = events.try_recv() {
        reported |= matches!(event, EngineEvent::HistoryNotRecorded { .. });
    }
    assert!(reported);
}

#[tokio::test]
async fn apply_walks_the_state_machine_in_order() {
    let fixture = Fixture::new(Some(USER_HOSTS));
    let (mut engine, mut events) =
        HostsEngine::open(fixture.config(), Arc::new(ScriptedTransport::new())).unwrap();

    engine
        .confirm_and_apply(&github_hosts(4), &github(), &RecordingConfirm::accepting())
        .unwrap();

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::StateChanged { to, .. } = event {
            states.push(to);
        }
    }
    assert_eq!(
        states,
        vec![
            ApplyState::Confirming,
            ApplyState::BackingUp,
            ApplyState::Writing,
            ApplyState::Recording,
            ApplyState::Idle,
        ]
    );
}

#[tokio::test]
async fn scoped_update_keeps_user_lines_and_other_blocks() {
    let fixture = Fixture::new(Some(USER_HOSTS));
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(STEAM_URL, STEAM_SOURCE);
    transport.respond(STEAM_URL, STEAM_SOURCE);

    let (mut engine, _events) =
        HostsEngine::open(fixture.config_with_sources(github_pair()), transport).unwrap();
    let confirm = RecordingConfirm::accepting();

    engine
        .confirm_and_apply(&github_hosts(3), &github(), &confirm)
        .unwrap();

    let candidate = engine.fetch_scoped("SteamTest", &steam()).await.unwrap();
    let outcome = engine
        .confirm_and_apply(&candidate.body, &steam(), &confirm)
        .unwrap();
    assert!(matches!(outcome, ApplyOutcome::Applied { record_count: 3, .. }));
    let after_first = fixture.read_hosts();

    // A second scoped update replaces the block instead of adding one
    let candidate = engine.fetch_scoped("SteamTest", &steam()).await.unwrap();
    engine
        .confirm_and_apply(&candidate.body, &steam(), &confirm)
        .unwrap();
    let hosts = fixture.read_hosts();

    assert!(hosts.starts_with(USER_HOSTS));
    assert_eq!(hosts.matches("# hostsync:steam begin").count(), 1);
    assert_eq!(hosts.matches("# hostsync:github begin").count(), 1);
    assert!(hosts.contains("140.82.112.3 github.com"));
    assert!(!hosts.contains("not-steam.example.com"));
    assert_eq!(hosts.lines().count(), after_first.lines().count());

    let kinds: Vec<_> = engine.history().iter().map(HistoryEntry::kind).collect();
    assert_eq!(kinds, vec!["update", "service_update", "service_update"]);
    assert_eq!(engine.history()[2].service(), Some(&steam()));

    let status = engine.status(&steam()).unwrap();
    assert_eq!(status.state, HostsState::Configured { managed_block: true });
    assert!(matches!(
        status.last_update,
        Some(HistoryEntry::ServiceUpdate { count: 3, .. })
    ));
}

#[tokio::test]
async fn apply_creates_a_missing_hosts_file() {
    let fixture = Fixture::new(None);
    let (mut engine, _events) =
        HostsEngine::open(fixture.config(), Arc::new(ScriptedTransport::new())).unwrap();

    let outcome = engine
        .confirm_and_apply(&github_hosts(2), &github(), &RecordingConfirm::accepting())
        .unwrap();

    assert!(matches!(
        outcome,
        ApplyOutcome::Applied {
            backup_id: None,
            record_count: 2,
            history_recorded: true,
        }
    ));
    assert!(fixture.read_hosts().starts_with("# hostsync:github begin\n"));
    assert!(engine.list_backups().unwrap().is_empty());
}
