use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, trace};

use super::{check_interrupted, CompletionWaiter};
use crate::error::{Result, ResultExt, VsrError};
use crate::platform::fs::{is_file_unlocked, modified};
use crate::vcdbtree::SAVE_EXTENSION;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wait for the server to finish writing a savegame copy into `backups_dir`.
///
/// With a `waiter`, the completion announcement is awaited first. The
/// directory is then polled for a `.vcdbs` file modified after `triggered_at`
/// that no other process holds a lock on. Bounded by `deadline`, aborted by
/// `shutdown`.
pub fn await_backup_file(
    backups_dir: &Path,
    triggered_at: SystemTime,
    deadline: Instant,
    shutdown: &AtomicBool,
    waiter: Option<&dyn CompletionWaiter>,
) -> Result<PathBuf> {
    if let Some(waiter) = waiter {
        waiter
            .wait_for_backup_complete(deadline, shutdown)
            .context("wait for backup completion")?;
        debug!("server reported backup complete");
    }

    std::fs::create_dir_all(backups_dir)
        .with_context(|| format!("create {}", backups_dir.display()))?;

    loop {
        check_interrupted(shutdown)?;
        if let Some(path) = find_ready_file(backups_dir, triggered_at) {
            return Ok(path);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(VsrError::Timeout(format!(
                "no new backup file appeared in {}",
                backups_dir.display()
            )));
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

fn find_ready_file(dir: &Path, triggered_at: SystemTime) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == SAVE_EXTENSION))
        .filter(|p| modified(p).is_some_and(|m| m > triggered_at))
        .collect();
    candidates.sort();

    candidates.into_iter().find(|path| match is_file_unlocked(path) {
        Ok(true) => true,
        Ok(false) => {
            trace!(path = %path.display(), "backup file still locked");
            false
        }
        Err(_) => false,
    })
}
