use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ResultExt};
use crate::vcdbtree::{sync_dir, sync_file, SyncStats};

/// Directory under the game data dir where `/genbackup` writes its copies.
pub const BACKUPS_DIR: &str = "Backups";
/// Directory under the staging root holding one vcdbtree per world.
pub const SAVES_DIR: &str = "Saves";

pub const AUX_DIRS: [&str; 3] = ["Logs", "Playerdata", "Mods"];
pub const AUX_FILES: [&str; 2] = ["serverconfig.json", "servermagicnumbers.json"];

pub fn saves_dir(staging_dir: &Path, save_name: &str) -> PathBuf {
    staging_dir.join(SAVES_DIR).join(save_name)
}

/// Mirror the auxiliary directories and loose config files from `data_dir`
/// into `staging_dir`. Absent sources are skipped; a vanished config file
/// is removed from staging.
pub fn stage_aux(data_dir: &Path, staging_dir: &Path) -> Result<SyncStats> {
    std::fs::create_dir_all(staging_dir)
        .with_context(|| format!("create {}", staging_dir.display()))?;

    let mut stats = SyncStats::default();
    for dir in AUX_DIRS {
        let src = data_dir.join(dir);
        match std::fs::metadata(&src) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir, "not present, skipping");
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("stat {}", src.display())),
        }
        let synced =
            sync_dir(&src, &staging_dir.join(dir)).with_context(|| format!("sync {dir}"))?;
        debug!(
            dir,
            written = synced.written,
            skipped = synced.skipped,
            removed = synced.removed,
            "staged directory"
        );
        stats.merge(synced);
    }

    for file in AUX_FILES {
        let synced = sync_file(&data_dir.join(file), &staging_dir.join(file))
            .with_context(|| format!("sync {file}"))?;
        stats.merge(synced);
    }
    Ok(stats)
}
