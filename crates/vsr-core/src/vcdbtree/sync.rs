use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Result, ResultExt};

/// Outcome of a content-preserving sync.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub written: u64,
    pub skipped: u64,
    pub removed: u64,
}

impl SyncStats {
    pub fn merge(&mut self, other: SyncStats) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.removed += other.removed;
    }
}

/// True when `path` is a regular file holding exactly `data`. Size is
/// compared before any bytes are read. Unreadable files count as different.
pub(crate) fn file_matches_content(path: &Path, data: &[u8]) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() == data.len() as u64 => {}
        _ => return false,
    }
    match std::fs::read(path) {
        Ok(existing) => existing == data,
        Err(_) => false,
    }
}

pub(crate) fn write_if_changed(path: &Path, data: &[u8]) -> Result<bool> {
    if file_matches_content(path, data) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(true)
}

/// Copy `src` to `dst` unless `dst` already holds identical bytes, in which
/// case `dst` is left untouched. Returns whether a write happened.
pub fn copy_file_if_changed(src: &Path, dst: &Path) -> Result<bool> {
    let data = std::fs::read(src).with_context(|| format!("read {}", src.display()))?;
    write_if_changed(dst, &data)
}

/// Recursively copy regular files from `src` into `dst`, skipping files whose
/// content is already identical. Stale files in `dst` are kept.
pub fn copy_dir_if_changed(src: &Path, dst: &Path) -> Result<SyncStats> {
    let mut stats = SyncStats::default();
    copy_tree(src, dst, &mut stats, None)?;
    Ok(stats)
}

fn copy_tree(
    src: &Path,
    dst: &Path,
    stats: &mut SyncStats,
    mut expected: Option<&mut HashSet<PathBuf>>,
) -> Result<()> {
    for entry in WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry
            .map_err(std::io::Error::from)
            .with_context(|| format!("walk {}", src.display()))?;
        // Symlinks to regular files are copied by content; linked
        // directories are not descended into.
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink()
                && std::fs::metadata(entry.path()).is_ok_and(|m| m.is_file()));
        if !is_file {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| crate::error::VsrError::Other(e.to_string()))?;
        let target = dst.join(rel);
        if copy_file_if_changed(entry.path(), &target)? {
            stats.written += 1;
        } else {
            stats.skipped += 1;
        }
        if let Some(set) = expected.as_deref_mut() {
            set.insert(target);
        }
    }
    Ok(())
}

/// Mirror `src` into `dst`: copy changed files, delete files that no longer
/// exist in `src`, then prune directories left empty. `dst` itself is kept.
pub fn sync_dir(src: &Path, dst: &Path) -> Result<SyncStats> {
    std::fs::create_dir_all(dst).with_context(|| format!("create {}", dst.display()))?;
    let mut stats = SyncStats::default();
    let mut expected = HashSet::new();
    copy_tree(src, dst, &mut stats, Some(&mut expected))?;
    stats.removed = remove_unexpected(dst, &expected)?;
    Ok(stats)
}

/// Mirror a single file. A missing `src` removes `dst`.
pub fn sync_file(src: &Path, dst: &Path) -> Result<SyncStats> {
    if !src.exists() {
        return match std::fs::remove_file(dst) {
            Ok(()) => Ok(SyncStats {
                removed: 1,
                ..SyncStats::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(SyncStats::default()),
            Err(e) => Err(e).with_context(|| format!("remove {}", dst.display())),
        };
    }
    if copy_file_if_changed(src, dst)? {
        Ok(SyncStats {
            written: 1,
            ..SyncStats::default()
        })
    } else {
        Ok(SyncStats {
            skipped: 1,
            ..SyncStats::default()
        })
    }
}

/// Delete every file under `root` that is not in `expected`, then remove
/// directories that end up empty. `root` itself is never removed. Returns
/// the number of files deleted.
pub(crate) fn remove_unexpected(root: &Path, expected: &HashSet<PathBuf>) -> Result<u64> {
    if !root.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .contents_first(true)
    {
        let entry = entry
            .map_err(std::io::Error::from)
            .with_context(|| format!("walk {}", root.display()))?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            if is_empty_dir(path)? {
                std::fs::remove_dir(path)
                    .with_context(|| format!("remove directory {}", path.display()))?;
            }
        } else if !expected.contains(path) {
            std::fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    let mut entries =
        std::fs::read_dir(path).with_context(|| format!("read directory {}", path.display()))?;
    Ok(entries.next().is_none())
}
