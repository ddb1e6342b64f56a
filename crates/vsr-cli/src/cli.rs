use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vsr",
    version,
    about = "Vintage Story server launcher with incremental restic backups",
    after_help = "\
Configuration:
  1. --config <path>             (explicit flag)
  2. $VSR_CONFIG                 (environment variable)
  3. built-in defaults

Environment variables (override the config file):
  BACKUP_INTERVAL                 Enables backups, e.g. 30m, 6h, 1d
  DO_BACKUP_ON_SERVER_START       Back up once the server has booted (default false)
  BACKUP_PAUSE_WHEN_NO_PLAYERS    Skip periodic backups on an empty server
  BACKUP_PRUNE_RETENTION          restic forget policy, e.g. \"--keep-daily 7\"
  BACKUP_TIMEOUT                  Wait limit for the server's backup file (default 5m)
  RESTIC_REPOSITORY, RESTIC_PASSWORD  Required when backups are enabled"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides VSR_CONFIG)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Convert a .vcdbs savegame into a vcdbtree directory
    Split {
        /// Savegame database to read
        input: PathBuf,
        /// Directory to write the tree into
        output: PathBuf,
    },

    /// Rebuild a .vcdbs savegame from a vcdbtree directory
    Combine {
        /// Tree directory to read
        input: PathBuf,
        /// Savegame database to create (replaced if present)
        output: PathBuf,
    },

    /// Run the game server with scheduled backups
    Run,
}
