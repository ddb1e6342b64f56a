use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ResultExt};

use super::layout::{GAMEDATA_DIR, PLAYERDATA_DIR};
use super::rows::{open_source, visit_rows};
use super::TableCounts;

/// Write every non-null row of `source` into a fresh tree under `out_dir`.
///
/// Existing files at the same paths are overwritten; nothing is removed.
/// Use [`super::split_with_cache`] for repeated runs into the same directory.
pub fn split(source: &Path, out_dir: &Path) -> Result<TableCounts> {
    let conn = open_source(source)?;

    for dir in [GAMEDATA_DIR, PLAYERDATA_DIR] {
        let path = out_dir.join(dir);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("create {}", path.display()))?;
    }

    let mut counts = TableCounts::default();
    let mut made_dirs: HashSet<PathBuf> = HashSet::new();
    visit_rows(&conn, out_dir, |table, path, data| {
        ensure_parent(&path, &mut made_dirs)?;
        std::fs::write(&path, &data).with_context(|| format!("write {}", path.display()))?;
        counts.bump(table);
        Ok(())
    })?;

    debug!(
        chunks = counts.chunk,
        mapchunks = counts.mapchunk,
        mapregions = counts.mapregion,
        gamedata = counts.gamedata,
        playerdata = counts.playerdata,
        "split complete"
    );
    Ok(counts)
}

/// Create the parent of `path` once per run.
pub(super) fn ensure_parent(path: &Path, made: &mut HashSet<PathBuf>) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if made.contains(parent) {
        return Ok(());
    }
    std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    made.insert(parent.to_path_buf());
    Ok(())
}
