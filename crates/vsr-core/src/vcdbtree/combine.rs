use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, ResultExt};

use super::layout::{
    player_uid_from_path, position_from_path, savegame_id_from_path, ShardedTable, GAMEDATA_DIR,
    PLAYERDATA_DIR,
};
use super::TableCounts;

/// Schema of a savegame database as the game server creates it.
pub const SCHEMA: &str = "\
PRAGMA page_size = 4096;
CREATE TABLE chunk (position integer PRIMARY KEY, data BLOB);
CREATE TABLE mapchunk (position integer PRIMARY KEY, data BLOB);
CREATE TABLE mapregion (position integer PRIMARY KEY, data BLOB);
CREATE TABLE gamedata (savegameid integer PRIMARY KEY, data BLOB);
CREATE TABLE playerdata (playerid integer PRIMARY KEY AUTOINCREMENT, playeruid TEXT, data BLOB);
CREATE INDEX index_playeruid ON playerdata (playeruid);
";

/// Rebuild a savegame database at `out_path` from the tree under `in_dir`.
///
/// Any existing file at `out_path` is replaced. Player rows get fresh
/// surrogate ids. The result is vacuumed so identical trees produce
/// identical database files.
pub fn combine(in_dir: &Path, out_path: &Path) -> Result<TableCounts> {
    match std::fs::remove_file(out_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("remove {}", out_path.display())),
    }

    let mut conn = Connection::open(out_path)
        .with_context(|| format!("create database {}", out_path.display()))?;
    conn.execute_batch(SCHEMA).context("create schema")?;

    let mut counts = TableCounts::default();
    for table in ShardedTable::ALL {
        let files = tree_files(&in_dir.join(table.dir()), None)?;
        let sql = format!(
            "INSERT OR REPLACE INTO {} (position, data) VALUES (?1, ?2)",
            table.table()
        );
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for path in &files {
                let position = position_from_path(path)?;
                let data = read_blob(path)?;
                stmt.execute(params![position, data])?;
            }
        }
        tx.commit()
            .with_context(|| format!("commit table {}", table.table()))?;
        *counts.sharded_mut(table) = files.len() as u64;
    }

    let files = tree_files(&in_dir.join(GAMEDATA_DIR), Some(1))?;
    let tx = conn.transaction()?;
    {
        let mut stmt =
            tx.prepare("INSERT OR REPLACE INTO gamedata (savegameid, data) VALUES (?1, ?2)")?;
        for path in &files {
            let id = savegame_id_from_path(path)?;
            let data = read_blob(path)?;
            stmt.execute(params![id, data])?;
        }
    }
    tx.commit().context("commit table gamedata")?;
    counts.gamedata = files.len() as u64;

    let files = tree_files(&in_dir.join(PLAYERDATA_DIR), Some(1))?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare("INSERT INTO playerdata (playeruid, data) VALUES (?1, ?2)")?;
        for path in &files {
            let uid = player_uid_from_path(path)?;
            let data = read_blob(path)?;
            stmt.execute(params![uid, data])?;
        }
    }
    tx.commit().context("commit table playerdata")?;
    counts.playerdata = files.len() as u64;

    conn.execute_batch("VACUUM").context("vacuum")?;

    debug!(
        chunks = counts.chunk,
        mapchunks = counts.mapchunk,
        mapregions = counts.mapregion,
        gamedata = counts.gamedata,
        playerdata = counts.playerdata,
        "combine complete"
    );
    Ok(counts)
}

/// Regular files under `dir` in a stable order. A missing directory yields
/// nothing.
fn tree_files(dir: &Path, max_depth: Option<usize>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry
            .map_err(std::io::Error::from)
            .with_context(|| format!("walk {}", dir.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn read_blob(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read {}", path.display()))
}
