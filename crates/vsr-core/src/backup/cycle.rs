use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info};

use super::restic::Restic;
use super::staging::{saves_dir, stage_aux, BACKUPS_DIR};
use super::wait::await_backup_file;
use super::{
    check_interrupted, BootChecker, CompletionWaiter, PlayerGate, ServerCommander,
    DEFAULT_BACKUP_TIMEOUT, GENBACKUP_COMMAND,
};
use crate::config::{process_env, save_name, ENV_RESTIC_REPOSITORY};
use crate::error::{Result, ResultExt, VsrError};
use crate::vcdbtree::{split_with_cache, SyncStats};

/// Snapshots the staging root. Replaces `restic backup` in tests.
pub type ResticRunner = Arc<dyn Fn(&Path, &AtomicBool) -> Result<()> + Send + Sync>;
/// Applies a retention policy. Replaces `restic forget --prune` in tests.
pub type PruneRunner = Arc<dyn Fn(&str, &AtomicBool) -> Result<()> + Send + Sync>;
/// Converts a savegame into a cached tree. Replaces
/// [`split_with_cache`] in tests.
pub type TreeSplitter = Arc<dyn Fn(&Path, &Path) -> Result<SyncStats> + Send + Sync>;

/// Steps of one cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    BootGate,
    PlayerGate,
    SaveName,
    Trigger,
    AwaitFile,
    Convert,
    Stage,
    Snapshot,
    Prune,
}

impl CycleStep {
    pub fn label(self) -> &'static str {
        match self {
            CycleStep::BootGate => "boot gate",
            CycleStep::PlayerGate => "player gate",
            CycleStep::SaveName => "resolve save name",
            CycleStep::Trigger => "send /genbackup",
            CycleStep::AwaitFile => "wait for backup file",
            CycleStep::Convert => "convert savegame",
            CycleStep::Stage => "stage auxiliary files",
            CycleStep::Snapshot => "restic backup",
            CycleStep::Prune => "restic forget",
        }
    }
}

impl fmt::Display for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Game data directory (`serverconfig.json`, `Backups/`, `Logs/`, ...).
    pub data_dir: PathBuf,
    /// Persistent staging root handed to restic.
    pub staging_dir: PathBuf,
    /// Bound on waiting for the backup file.
    pub timeout: Duration,
    pub pause_when_no_players: bool,
    /// `restic forget` tokens; `None` disables pruning.
    pub prune_retention: Option<String>,
}

impl CycleSettings {
    pub fn new(data_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            staging_dir: staging_dir.into(),
            timeout: DEFAULT_BACKUP_TIMEOUT,
            pause_when_no_players: false,
            prune_retention: None,
        }
    }
}

/// What a successful cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub save_name: String,
    pub tree: SyncStats,
    pub staged: SyncStats,
    pub pruned: bool,
}

/// One backup pass: gates, save name, trigger, wait, convert, stage,
/// snapshot, prune.
pub struct BackupCycle {
    settings: CycleSettings,
    server: Arc<dyn ServerCommander>,
    boot_checker: Option<Arc<dyn BootChecker>>,
    completion: Option<Arc<dyn CompletionWaiter>>,
    players: Option<Arc<dyn PlayerGate>>,
    restic: Restic,
    restic_runner: Option<ResticRunner>,
    prune_runner: Option<PruneRunner>,
    splitter: Option<TreeSplitter>,
}

impl BackupCycle {
    pub fn new(settings: CycleSettings, server: Arc<dyn ServerCommander>) -> Self {
        Self {
            settings,
            server,
            boot_checker: None,
            completion: None,
            players: None,
            restic: Restic::new("restic"),
            restic_runner: None,
            prune_runner: None,
            splitter: None,
        }
    }

    pub fn with_boot_checker(mut self, checker: Arc<dyn BootChecker>) -> Self {
        self.boot_checker = Some(checker);
        self
    }

    pub fn with_completion_waiter(mut self, waiter: Arc<dyn CompletionWaiter>) -> Self {
        self.completion = Some(waiter);
        self
    }

    pub fn with_player_gate(mut self, gate: Arc<dyn PlayerGate>) -> Self {
        self.players = Some(gate);
        self
    }

    pub fn with_restic(mut self, restic: Restic) -> Self {
        self.restic = restic;
        self
    }

    pub fn with_restic_runner(mut self, runner: ResticRunner) -> Self {
        self.restic_runner = Some(runner);
        self
    }

    pub fn with_prune_runner(mut self, runner: PruneRunner) -> Self {
        self.prune_runner = Some(runner);
        self
    }

    pub fn with_splitter(mut self, splitter: TreeSplitter) -> Self {
        self.splitter = Some(splitter);
        self
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    /// Run every step in order, stopping at the first error.
    ///
    /// `NotBooted` and `NoPlayersOnline` come back unwrapped; every other
    /// failure carries the step it happened in. Nothing is rolled back: the
    /// staging tree heals itself on the next successful run.
    pub fn run(&self, skip_player_check: bool, shutdown: &AtomicBool) -> Result<CycleReport> {
        if let Some(boot) = &self.boot_checker {
            if !boot.has_booted() {
                return Err(VsrError::NotBooted);
            }
        }

        if !skip_player_check && self.settings.pause_when_no_players {
            if let Some(players) = &self.players {
                if !players.should_backup() {
                    return Err(VsrError::NoPlayersOnline);
                }
            }
        }

        // Before the trigger: a failure here must not produce a backup file.
        let save_name =
            save_name(&self.settings.data_dir).context(CycleStep::SaveName.label())?;

        check_interrupted(shutdown)?;
        let triggered_at = SystemTime::now();
        self.server
            .send_command(GENBACKUP_COMMAND)
            .context(CycleStep::Trigger.label())?;
        debug!("backup requested from server");

        let deadline = Instant::now() + self.settings.timeout;
        let backup_file = await_backup_file(
            &self.settings.data_dir.join(BACKUPS_DIR),
            triggered_at,
            deadline,
            shutdown,
            self.completion.as_deref(),
        )
        .context(CycleStep::AwaitFile.label())?;
        info!(path = %backup_file.display(), "backup file ready");

        let tree = self
            .convert(&backup_file, &save_name)
            .context(CycleStep::Convert.label())?;

        let staged = stage_aux(&self.settings.data_dir, &self.settings.staging_dir)
            .context(CycleStep::Stage.label())?;
        debug!(
            written = staged.written,
            skipped = staged.skipped,
            removed = staged.removed,
            "auxiliary files staged"
        );

        check_interrupted(shutdown)?;
        self.snapshot(shutdown)
            .context(CycleStep::Snapshot.label())?;
        let pruned = self.prune(shutdown).context(CycleStep::Prune.label())?;

        Ok(CycleReport {
            save_name,
            tree,
            staged,
            pruned,
        })
    }

    /// Absorb the backup file into the world's tree, then delete it.
    fn convert(&self, backup_file: &Path, save_name: &str) -> Result<SyncStats> {
        let tree_dir = saves_dir(&self.settings.staging_dir, save_name);
        std::fs::create_dir_all(&tree_dir)
            .with_context(|| format!("create {}", tree_dir.display()))?;

        info!(
            from = %backup_file.display(),
            to = %tree_dir.display(),
            "splitting savegame into vcdbtree"
        );
        let stats = match &self.splitter {
            Some(split) => split(backup_file, &tree_dir)?,
            None => split_with_cache(backup_file, &tree_dir)?,
        };
        info!(
            written = stats.written,
            skipped = stats.skipped,
            removed = stats.removed,
            "vcdbtree updated"
        );

        std::fs::remove_file(backup_file)
            .with_context(|| format!("remove {}", backup_file.display()))?;
        Ok(stats)
    }

    fn snapshot(&self, shutdown: &AtomicBool) -> Result<()> {
        let staging = &self.settings.staging_dir;
        if let Some(runner) = &self.restic_runner {
            return runner(staging, shutdown);
        }
        if process_env(ENV_RESTIC_REPOSITORY).is_none() {
            return Err(VsrError::Config(format!(
                "{ENV_RESTIC_REPOSITORY} environment variable is not set"
            )));
        }
        self.restic.backup(staging, shutdown)
    }

    fn prune(&self, shutdown: &AtomicBool) -> Result<bool> {
        let Some(retention) = self
            .settings
            .prune_retention
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return Ok(false);
        };
        info!(retention, "applying retention policy");
        match &self.prune_runner {
            Some(runner) => runner(retention, shutdown)?,
            None => self.restic.forget(retention, shutdown)?,
        }
        Ok(true)
    }
}
