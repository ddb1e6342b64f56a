use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use crate::error::{Result, ResultExt};

use super::layout::{gamedata_path, playerdata_path, sharded_path, ShardedTable};
use super::TableCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowTable {
    Sharded(ShardedTable),
    GameData,
    PlayerData,
}

impl TableCounts {
    pub(crate) fn bump(&mut self, table: RowTable) {
        match table {
            RowTable::Sharded(t) => *self.sharded_mut(t) += 1,
            RowTable::GameData => self.gamedata += 1,
            RowTable::PlayerData => self.playerdata += 1,
        }
    }
}

/// Open a savegame database without write access.
pub(crate) fn open_source(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("open savegame {}", path.display()))
}

/// Stream every non-null row of the five tables, handing the visitor the
/// row's deterministic tree path under `base` and its blob.
pub(crate) fn visit_rows<F>(conn: &Connection, base: &Path, mut visit: F) -> Result<()>
where
    F: FnMut(RowTable, PathBuf, Vec<u8>) -> Result<()>,
{
    for table in ShardedTable::ALL {
        let sql = format!(
            "SELECT position, data FROM {} WHERE data IS NOT NULL",
            table.table()
        );
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("read table {}", table.table()))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let position: i64 = row.get(0)?;
            let data: Vec<u8> = row.get(1)?;
            visit(
                RowTable::Sharded(table),
                sharded_path(base, table, position),
                data,
            )?;
        }
    }

    let mut stmt = conn
        .prepare("SELECT savegameid, data FROM gamedata WHERE data IS NOT NULL")
        .context("read table gamedata")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let data: Vec<u8> = row.get(1)?;
        visit(RowTable::GameData, gamedata_path(base, id), data)?;
    }

    let mut stmt = conn
        .prepare("SELECT playeruid, data FROM playerdata WHERE data IS NOT NULL")
        .context("read table playerdata")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let uid: Option<String> = row.get(0)?;
        let Some(uid) = uid.filter(|u| !u.is_empty()) else {
            continue;
        };
        let data: Vec<u8> = row.get(1)?;
        visit(RowTable::PlayerData, playerdata_path(base, &uid), data)?;
    }

    Ok(())
}
