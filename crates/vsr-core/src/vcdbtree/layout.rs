use std::path::{Path, PathBuf};

use crate::error::{Result, VsrError};

use super::pos::{extract_chunk_x, extract_chunk_z};

pub const BLOB_EXTENSION: &str = "bin";

/// Position-keyed tables, sharded by `chunkZ/chunkX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardedTable {
    Chunk,
    MapChunk,
    MapRegion,
}

impl ShardedTable {
    pub const ALL: [ShardedTable; 3] = [
        ShardedTable::Chunk,
        ShardedTable::MapChunk,
        ShardedTable::MapRegion,
    ];

    pub fn table(self) -> &'static str {
        match self {
            ShardedTable::Chunk => "chunk",
            ShardedTable::MapChunk => "mapchunk",
            ShardedTable::MapRegion => "mapregion",
        }
    }

    pub fn dir(self) -> &'static str {
        match self {
            ShardedTable::Chunk => "chunks",
            ShardedTable::MapChunk => "mapchunks",
            ShardedTable::MapRegion => "mapregions",
        }
    }
}

pub const GAMEDATA_DIR: &str = "gamedata";
pub const PLAYERDATA_DIR: &str = "playerdata";

/// The five directories a tree is made of. Cleanup never removes these.
pub const MANAGED_ROOTS: [&str; 5] = [
    "chunks",
    "mapchunks",
    "mapregions",
    GAMEDATA_DIR,
    PLAYERDATA_DIR,
];

/// `<base>/<table-dir>/<chunkZ>/<chunkX>/<position as 16 hex digits>.bin`
pub fn sharded_path(base: &Path, table: ShardedTable, position: i64) -> PathBuf {
    let z = extract_chunk_z(position);
    let x = extract_chunk_x(position);
    base.join(table.dir())
        .join(z.to_string())
        .join(x.to_string())
        .join(format!("{:016x}.{BLOB_EXTENSION}", position as u64))
}

pub fn gamedata_path(base: &Path, savegame_id: i64) -> PathBuf {
    base.join(GAMEDATA_DIR)
        .join(format!("{savegame_id}.{BLOB_EXTENSION}"))
}

pub fn playerdata_path(base: &Path, player_uid: &str) -> PathBuf {
    base.join(PLAYERDATA_DIR)
        .join(format!("{}.{BLOB_EXTENSION}", sanitize_player_uid(player_uid)))
}

/// Base64 to filesystem-safe base64url: `+` -> `-`, `/` -> `_`, padding dropped.
pub fn sanitize_player_uid(uid: &str) -> String {
    uid.replace('+', "-")
        .replace('/', "_")
        .trim_end_matches('=')
        .to_string()
}

/// Inverse of [`sanitize_player_uid`]. Padding is not restored.
pub fn unsanitize_player_uid(safe: &str) -> String {
    safe.replace('-', "+").replace('_', "/")
}

fn blob_stem(path: &Path) -> Result<&str> {
    let invalid = |reason: &str| VsrError::InvalidTreeEntry {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| invalid("filename is not valid UTF-8"))?;
    name.strip_suffix(".bin")
        .ok_or_else(|| invalid("expected a .bin extension"))
}

/// Recover the full 64-bit position from a sharded leaf filename.
pub fn position_from_path(path: &Path) -> Result<i64> {
    let stem = blob_stem(path)?;
    if stem.len() != 16 {
        return Err(VsrError::InvalidTreeEntry {
            path: path.to_path_buf(),
            reason: format!("expected 16 hex digits, got {}", stem.len()),
        });
    }
    let raw = u64::from_str_radix(stem, 16).map_err(|e| VsrError::InvalidTreeEntry {
        path: path.to_path_buf(),
        reason: format!("invalid hex '{stem}': {e}"),
    })?;
    Ok(raw as i64)
}

pub fn savegame_id_from_path(path: &Path) -> Result<i64> {
    let stem = blob_stem(path)?;
    stem.parse::<i64>().map_err(|e| VsrError::InvalidTreeEntry {
        path: path.to_path_buf(),
        reason: format!("invalid savegame id '{stem}': {e}"),
    })
}

pub fn player_uid_from_path(path: &Path) -> Result<String> {
    Ok(unsanitize_player_uid(blob_stem(path)?))
}
