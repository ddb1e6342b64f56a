use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use rusqlite::{params, Connection};

use crate::backup::{BootChecker, PlayerGate, ServerCommander, BACKUPS_DIR, GENBACKUP_COMMAND};
use crate::error::{Result, VsrError};
use crate::vcdbtree::SCHEMA;

/// Pin a file's mtime so freshness checks do not depend on clock granularity.
pub fn set_mtime(path: &Path, when: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}

pub const FIXTURE_CHUNKS: [(i64, &[u8]); 4] = [
    (0, b"chunk_zero"),
    (12_345_678_901_234, b"chunk_large_position"),
    (0x0000_0012_abff_341c, b"chunk_hex_example"),
    (0x0bff_341c_0000_5678, b"chunk_another"),
];
pub const FIXTURE_MAPCHUNKS: [(i64, &[u8]); 2] = [(100, b"mapchunk_100"), (999_999_999, b"mapchunk_large")];
pub const FIXTURE_PLAYERS: [(&str, &[u8]); 3] = [
    ("B5fZ7vAsz3Kt+fmEV8GeK8Gu", b"player1_data"),
    ("ABC123/DEF456+xyz", b"player2_data"),
    ("SimplePlayer", b"player3_data"),
];

/// A savegame with 4 chunks, 2 map chunks, 1 map region, 1 gamedata row
/// and 3 players, two of them with base64 punctuation in their uid.
pub fn create_fixture_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    for (pos, data) in FIXTURE_CHUNKS {
        conn.execute(
            "INSERT INTO chunk (position, data) VALUES (?1, ?2)",
            params![pos, data],
        )
        .unwrap();
    }
    for (pos, data) in FIXTURE_MAPCHUNKS {
        conn.execute(
            "INSERT INTO mapchunk (position, data) VALUES (?1, ?2)",
            params![pos, data],
        )
        .unwrap();
    }
    conn.execute(
        "INSERT INTO mapregion (position, data) VALUES (?1, ?2)",
        params![42i64, b"mapregion_data".as_slice()],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO gamedata (savegameid, data) VALUES (?1, ?2)",
        params![1i64, b"gamedata_blob".as_slice()],
    )
    .unwrap();
    for (uid, data) in FIXTURE_PLAYERS {
        conn.execute(
            "INSERT INTO playerdata (playeruid, data) VALUES (?1, ?2)",
            params![uid, data],
        )
        .unwrap();
    }
}

/// Run a statement against an existing savegame.
pub fn exec_sql(path: &Path, sql: &str) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(sql).unwrap();
}

/// Stands in for the game server: records every command and answers
/// `/genbackup` by dropping a fixture savegame into `<data_dir>/Backups`.
pub struct FakeServer {
    data_dir: PathBuf,
    pub commands: Mutex<Vec<String>>,
    pub produce_backup: AtomicBool,
    backups: AtomicUsize,
}

impl FakeServer {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            commands: Mutex::new(Vec::new()),
            produce_backup: AtomicBool::new(true),
            backups: AtomicUsize::new(0),
        }
    }

    pub fn silent(data_dir: &Path) -> Self {
        let server = Self::new(data_dir);
        server.produce_backup.store(false, Ordering::SeqCst);
        server
    }

    pub fn sent(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn backups_written(&self) -> usize {
        self.backups.load(Ordering::SeqCst)
    }
}

impl ServerCommander for FakeServer {
    fn send_command(&self, command: &str) -> Result<()> {
        self.commands.lock().unwrap().push(command.to_string());
        if command == GENBACKUP_COMMAND && self.produce_backup.load(Ordering::SeqCst) {
            let n = self.backups.fetch_add(1, Ordering::SeqCst);
            let dir = self.data_dir.join(BACKUPS_DIR);
            std::fs::create_dir_all(&dir)?;
            let path = dir.join(format!("world-{n}.vcdbs"));
            create_fixture_db(&path);
            set_mtime(&path, SystemTime::now() + Duration::from_secs(2));
        }
        Ok(())
    }
}

/// Commander whose every send fails.
pub struct DeadServer;

impl ServerCommander for DeadServer {
    fn send_command(&self, _: &str) -> Result<()> {
        Err(VsrError::ServerNotRunning)
    }
}

pub struct Booted(pub bool);

impl BootChecker for Booted {
    fn has_booted(&self) -> bool {
        self.0
    }
}

pub struct Players(pub bool);

impl PlayerGate for Players {
    fn should_backup(&self) -> bool {
        self.0
    }
}
