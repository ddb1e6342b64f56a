use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ResultExt};

use super::layout::{GAMEDATA_DIR, MANAGED_ROOTS, PLAYERDATA_DIR};
use super::rows::{open_source, visit_rows};
use super::split::ensure_parent;
use super::sync::{file_matches_content, remove_unexpected, SyncStats};

/// Reconcile the tree under `cache_dir` with `source`.
///
/// Files whose bytes already equal the row are left alone (mtime and inode
/// untouched) and counted as skipped. Everything else is written. Files
/// under the managed roots with no matching row are deleted afterwards and
/// emptied directories pruned, leaving the roots in place.
pub fn split_with_cache(source: &Path, cache_dir: &Path) -> Result<SyncStats> {
    let conn = open_source(source)?;

    for dir in [GAMEDATA_DIR, PLAYERDATA_DIR] {
        let path = cache_dir.join(dir);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("create {}", path.display()))?;
    }

    let mut stats = SyncStats::default();
    let mut expected: HashSet<PathBuf> = HashSet::new();
    let mut made_dirs: HashSet<PathBuf> = HashSet::new();

    visit_rows(&conn, cache_dir, |_, path, data| {
        if file_matches_content(&path, &data) {
            stats.skipped += 1;
        } else {
            ensure_parent(&path, &mut made_dirs)?;
            std::fs::write(&path, &data)
                .with_context(|| format!("write {}", path.display()))?;
            stats.written += 1;
        }
        expected.insert(path);
        Ok(())
    })?;
    drop(conn);

    for root in MANAGED_ROOTS {
        stats.removed += remove_unexpected(&cache_dir.join(root), &expected)?;
    }

    debug!(
        written = stats.written,
        skipped = stats.skipped,
        removed = stats.removed,
        "cache reconciled"
    );
    Ok(stats)
}
