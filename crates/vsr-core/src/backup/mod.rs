//! The backup cycle and the collaborators it drives.

mod cycle;
mod players;
mod restic;
mod scheduler;
mod staging;
mod wait;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub use cycle::{
    BackupCycle, CycleReport, CycleSettings, CycleStep, PruneRunner, ResticRunner, TreeSplitter,
};
pub use players::PlayerChecker;
pub use restic::{CommandOutcome, CommandRunner, Restic, UNINITIALIZED_EXIT_CODE};
pub use scheduler::{
    random_jitter, BackupManager, CompleteCallback, ScheduledCallback, StartCallback,
};
pub use staging::{saves_dir, stage_aux, AUX_DIRS, AUX_FILES, BACKUPS_DIR, SAVES_DIR};
pub use wait::await_backup_file;

use crate::error::{Result, VsrError};

/// Console command that makes the server write a fresh savegame copy.
pub const GENBACKUP_COMMAND: &str = "/genbackup";

/// Exact suffix of the console line announcing a finished `/genbackup`.
pub const BACKUP_COMPLETE_PATTERN: &str = "[Server Notification] Backup complete!";

pub const DEFAULT_BACKUP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Fire-and-forget console command delivery.
pub trait ServerCommander: Send + Sync {
    fn send_command(&self, command: &str) -> Result<()>;
}

pub trait BootChecker: Send + Sync {
    fn has_booted(&self) -> bool;
}

/// Blocks until the server reports that `/genbackup` finished.
pub trait CompletionWaiter: Send + Sync {
    fn wait_for_backup_complete(&self, deadline: Instant, shutdown: &AtomicBool) -> Result<()>;
}

/// Decides whether a periodic cycle should run given player presence.
///
/// Stateful: true while anyone is online, true once more right after the
/// last player leaves, then false until someone joins again.
pub trait PlayerGate: Send + Sync {
    fn should_backup(&self) -> bool;
}

pub(crate) fn check_interrupted(shutdown: &AtomicBool) -> Result<()> {
    if shutdown.load(Ordering::Relaxed) {
        return Err(VsrError::Interrupted);
    }
    Ok(())
}
