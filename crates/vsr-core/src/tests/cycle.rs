use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backup::{
    BackupCycle, CycleSettings, PruneRunner, ResticRunner, TreeSplitter, BACKUPS_DIR,
    GENBACKUP_COMMAND,
};
use crate::error::{Result, VsrError};
use crate::testutil::{Booted, DeadServer, FakeServer, Players};
use crate::vcdbtree::SyncStats;

struct Env {
    _dir: tempfile::TempDir,
    data: PathBuf,
    staging: PathBuf,
}

fn env() -> Env {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("gamedata");
    let staging = dir.path().join("staging");
    std::fs::create_dir_all(data.join("Logs")).unwrap();
    std::fs::write(data.join("Logs/server-main.log"), b"started").unwrap();
    std::fs::write(
        data.join("serverconfig.json"),
        br#"{"WorldConfig": {"SaveFileLocation": "/gamedata/Saves/myworld.vcdbs"}}"#,
    )
    .unwrap();
    Env {
        _dir: dir,
        data,
        staging,
    }
}

impl Env {
    fn settings(&self) -> CycleSettings {
        let mut settings = CycleSettings::new(&self.data, &self.staging);
        settings.timeout = Duration::from_secs(10);
        settings
    }
}

#[derive(Default)]
struct Calls {
    snapshots: Mutex<Vec<PathBuf>>,
    prunes: Mutex<Vec<String>>,
}

impl Calls {
    fn restic(self: &Arc<Self>) -> ResticRunner {
        let calls = self.clone();
        Arc::new(move |path: &Path, _: &AtomicBool| {
            calls.snapshots.lock().unwrap().push(path.to_path_buf());
            Ok(())
        })
    }

    fn prune(self: &Arc<Self>) -> PruneRunner {
        let calls = self.clone();
        Arc::new(move |retention: &str, _: &AtomicBool| {
            calls.prunes.lock().unwrap().push(retention.to_string());
            Ok(())
        })
    }
}

fn not_stopped() -> AtomicBool {
    AtomicBool::new(false)
}

#[test]
fn full_cycle_converts_stages_and_snapshots() {
    let env = env();
    let server = Arc::new(FakeServer::new(&env.data));
    let calls = Arc::new(Calls::default());
    let cycle = BackupCycle::new(env.settings(), server.clone())
        .with_boot_checker(Arc::new(Booted(true)))
        .with_restic_runner(calls.restic())
        .with_prune_runner(calls.prune());

    let report = cycle.run(false, &not_stopped()).unwrap();
    assert_eq!(report.save_name, "myworld");
    assert_eq!(report.tree.written, 11);
    assert!(!report.pruned);
    assert_eq!(server.sent(), [GENBACKUP_COMMAND]);

    let tree = env.staging.join("Saves/myworld");
    assert!(tree.join("chunks/0/0/0000000000000000.bin").is_file());
    assert!(tree.join("playerdata/SimplePlayer.bin").is_file());
    assert_eq!(
        std::fs::read(env.staging.join("Logs/server-main.log")).unwrap(),
        b"started"
    );
    assert!(env.staging.join("serverconfig.json").is_file());

    let leftovers: Vec<_> = std::fs::read_dir(env.data.join(BACKUPS_DIR))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty(), "backup file should be consumed");

    assert_eq!(*calls.snapshots.lock().unwrap(), [env.staging.clone()]);
    assert!(calls.prunes.lock().unwrap().is_empty());
}

#[test]
fn second_cycle_skips_unchanged_rows() {
    let env = env();
    let calls = Arc::new(Calls::default());
    let cycle = BackupCycle::new(env.settings(), Arc::new(FakeServer::new(&env.data)))
        .with_restic_runner(calls.restic());

    cycle.run(false, &not_stopped()).unwrap();
    let report = cycle.run(false, &not_stopped()).unwrap();
    assert_eq!(report.tree.written, 0);
    assert_eq!(report.tree.skipped, 11);
    assert_eq!(report.staged.written, 0);
    assert_eq!(calls.snapshots.lock().unwrap().len(), 2);
}

#[test]
fn unset_save_location_uses_default_tree() {
    let env = env();
    std::fs::write(env.data.join("serverconfig.json"), br#"{"WorldConfig": {}}"#).unwrap();
    let calls = Arc::new(Calls::default());
    let cycle = BackupCycle::new(env.settings(), Arc::new(FakeServer::new(&env.data)))
        .with_restic_runner(calls.restic());

    let report = cycle.run(false, &not_stopped()).unwrap();
    assert_eq!(report.save_name, "default");
    assert!(env.staging.join("Saves/default/gamedata/1.bin").is_file());
}

#[test]
fn unreadable_server_config_fails_before_trigger() {
    for body in [None, Some("not json")] {
        let env = env();
        match body {
            Some(body) => std::fs::write(env.data.join("serverconfig.json"), body).unwrap(),
            None => std::fs::remove_file(env.data.join("serverconfig.json")).unwrap(),
        }
        let server = Arc::new(FakeServer::new(&env.data));
        let calls = Arc::new(Calls::default());
        let cycle = BackupCycle::new(env.settings(), server.clone())
            .with_restic_runner(calls.restic());

        let err = cycle.run(false, &not_stopped()).unwrap_err();
        assert!(err.to_string().starts_with("resolve save name"), "{err}");
        assert!(!err.is_skip());
        assert!(server.sent().is_empty());
        assert_eq!(server.backups_written(), 0);
        assert!(!env.data.join(BACKUPS_DIR).exists());
        assert!(calls.snapshots.lock().unwrap().is_empty());
    }
}

#[test]
fn retention_triggers_prune_after_snapshot() {
    let env = env();
    let calls = Arc::new(Calls::default());
    let mut settings = env.settings();
    settings.prune_retention = Some("--keep-daily 7 --keep-weekly 4".into());
    let cycle = BackupCycle::new(settings, Arc::new(FakeServer::new(&env.data)))
        .with_restic_runner(calls.restic())
        .with_prune_runner(calls.prune());

    let report = cycle.run(false, &not_stopped()).unwrap();
    assert!(report.pruned);
    assert_eq!(
        *calls.prunes.lock().unwrap(),
        ["--keep-daily 7 --keep-weekly 4"]
    );
}

#[test]
fn blank_retention_means_no_prune() {
    let env = env();
    let calls = Arc::new(Calls::default());
    let mut settings = env.settings();
    settings.prune_retention = Some("   ".into());
    let cycle = BackupCycle::new(settings, Arc::new(FakeServer::new(&env.data)))
        .with_restic_runner(calls.restic())
        .with_prune_runner(calls.prune());

    assert!(!cycle.run(false, &not_stopped()).unwrap().pruned);
    assert!(calls.prunes.lock().unwrap().is_empty());
}

#[test]
fn not_booted_skips_without_sending() {
    let env = env();
    let server = Arc::new(FakeServer::new(&env.data));
    let cycle = BackupCycle::new(env.settings(), server.clone())
        .with_boot_checker(Arc::new(Booted(false)));

    let err = cycle.run(true, &not_stopped()).unwrap_err();
    assert!(matches!(err, VsrError::NotBooted));
    assert!(err.is_skip());
    assert!(server.sent().is_empty());
}

#[test]
fn empty_server_skips_when_pausing() {
    let env = env();
    let server = Arc::new(FakeServer::new(&env.data));
    let mut settings = env.settings();
    settings.pause_when_no_players = true;
    let cycle = BackupCycle::new(settings, server.clone())
        .with_player_gate(Arc::new(Players(false)));

    let err = cycle.run(false, &not_stopped()).unwrap_err();
    assert!(matches!(err, VsrError::NoPlayersOnline));
    assert!(err.is_skip());
    assert!(server.sent().is_empty());
}

#[test]
fn player_gate_is_bypassed_on_request_or_when_disabled() {
    let env = env();
    let calls = Arc::new(Calls::default());

    let mut pausing = env.settings();
    pausing.pause_when_no_players = true;
    let cycle = BackupCycle::new(pausing, Arc::new(FakeServer::new(&env.data)))
        .with_player_gate(Arc::new(Players(false)))
        .with_restic_runner(calls.restic());
    cycle.run(true, &not_stopped()).unwrap();

    let cycle = BackupCycle::new(env.settings(), Arc::new(FakeServer::new(&env.data)))
        .with_player_gate(Arc::new(Players(false)))
        .with_restic_runner(calls.restic());
    cycle.run(false, &not_stopped()).unwrap();

    assert_eq!(calls.snapshots.lock().unwrap().len(), 2);
}

#[test]
fn trigger_failure_names_the_step() {
    let env = env();
    let cycle = BackupCycle::new(env.settings(), Arc::new(DeadServer));

    let err = cycle.run(false, &not_stopped()).unwrap_err();
    assert!(matches!(err.root(), VsrError::ServerNotRunning));
    assert!(err.to_string().starts_with("send /genbackup"), "{err}");
    assert!(!err.is_skip());
}

#[test]
fn missing_backup_file_times_out() {
    let env = env();
    let calls = Arc::new(Calls::default());
    let mut settings = env.settings();
    settings.timeout = Duration::from_millis(600);
    let cycle = BackupCycle::new(settings, Arc::new(FakeServer::silent(&env.data)))
        .with_restic_runner(calls.restic());

    let err = cycle.run(false, &not_stopped()).unwrap_err();
    assert!(matches!(err.root(), VsrError::Timeout(_)), "{err}");
    assert!(err.to_string().starts_with("wait for backup file"));
    assert!(calls.snapshots.lock().unwrap().is_empty());
    assert!(!env.staging.join("Saves").exists());
}

#[test]
fn snapshot_failure_keeps_the_staged_tree() {
    let env = env();
    let failing: ResticRunner = Arc::new(|_: &Path, _: &AtomicBool| -> Result<()> {
        Err(VsrError::Tool("restic backup exited with 1".into()))
    });
    let cycle = BackupCycle::new(env.settings(), Arc::new(FakeServer::new(&env.data)))
        .with_restic_runner(failing);

    let err = cycle.run(false, &not_stopped()).unwrap_err();
    assert!(matches!(err.root(), VsrError::Tool(_)));
    assert!(err.to_string().starts_with("restic backup"));
    assert!(env.staging.join("Saves/myworld/gamedata/1.bin").is_file());
}

#[test]
fn conversion_failure_leaves_backup_file() {
    let env = env();
    let splitter: TreeSplitter = Arc::new(|_: &Path, _: &Path| -> Result<SyncStats> {
        Err(VsrError::Other("disk full".into()))
    });
    let cycle = BackupCycle::new(env.settings(), Arc::new(FakeServer::new(&env.data)))
        .with_splitter(splitter);

    let err = cycle.run(false, &not_stopped()).unwrap_err();
    assert!(err.to_string().starts_with("convert savegame"), "{err}");
    assert_eq!(
        std::fs::read_dir(env.data.join(BACKUPS_DIR)).unwrap().count(),
        1
    );
}

#[test]
fn raised_shutdown_flag_aborts_before_trigger() {
    let env = env();
    let server = Arc::new(FakeServer::new(&env.data));
    let cycle = BackupCycle::new(env.settings(), server.clone());

    let err = cycle.run(true, &AtomicBool::new(true)).unwrap_err();
    assert!(matches!(err, VsrError::Interrupted));
    assert!(server.sent().is_empty());
}
