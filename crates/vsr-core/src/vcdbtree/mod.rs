//! Vcdbtree: a filesystem projection of a Vintage Story savegame database
//! laid out so that block-level deduplication in the backup tool sees
//! unchanged world regions as unchanged files.

mod cache;
mod combine;
pub mod layout;
pub mod pos;
mod rows;
mod split;
mod sync;

pub use cache::split_with_cache;
pub use combine::{combine, SCHEMA};
pub use layout::{sanitize_player_uid, unsanitize_player_uid, ShardedTable};
pub use pos::{extract_chunk_x, extract_chunk_z};
pub use split::split;
pub use sync::{copy_dir_if_changed, copy_file_if_changed, sync_dir, sync_file, SyncStats};

/// Extension of savegame databases written by the game server.
pub const SAVE_EXTENSION: &str = "vcdbs";

/// Number of rows (or files) handled per table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub chunk: u64,
    pub mapchunk: u64,
    pub mapregion: u64,
    pub gamedata: u64,
    pub playerdata: u64,
}

impl TableCounts {
    pub fn total(&self) -> u64 {
        self.chunk + self.mapchunk + self.mapregion + self.gamedata + self.playerdata
    }

    pub(crate) fn sharded_mut(&mut self, table: ShardedTable) -> &mut u64 {
        match table {
            ShardedTable::Chunk => &mut self.chunk,
            ShardedTable::MapChunk => &mut self.mapchunk,
            ShardedTable::MapRegion => &mut self.mapregion,
        }
    }
}
