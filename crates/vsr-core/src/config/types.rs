use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::error::{Result, VsrError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub restic: ResticConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Time between cycles (e.g. "30m", "6h"). Backups are disabled when unset.
    #[serde(default)]
    pub interval: Option<String>,
    /// Run one cycle as soon as the server reports it has booted. Ignores
    /// the player gate. Off unless requested.
    #[serde(default)]
    pub on_server_start: bool,
    /// Skip cycles while nobody is online (one final cycle runs after the
    /// last player leaves).
    #[serde(default)]
    pub pause_when_no_players: bool,
    /// Extra `restic forget` arguments, e.g. "--keep-daily 7 --keep-weekly 4".
    #[serde(default)]
    pub prune_retention: Option<String>,
    /// Upper bound on waiting for the server to produce a backup file.
    #[serde(default = "default_backup_timeout")]
    pub timeout: String,
    #[serde(default)]
    pub jitter_seconds: u64,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            interval: None,
            on_server_start: false,
            pause_when_no_players: false,
            prune_retention: None,
            timeout: default_backup_timeout(),
            jitter_seconds: 0,
            staging_dir: default_staging_dir(),
        }
    }
}

impl BackupConfig {
    pub fn enabled(&self) -> bool {
        self.interval
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// The cycle interval, or `None` when backups are disabled.
    pub fn interval_duration(&self) -> Result<Option<Duration>> {
        let Some(raw) = self.interval.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };
        let interval =
            parse_duration(raw).map_err(|e| e.config_context("invalid backup interval"))?;
        if interval.is_zero() {
            return Err(VsrError::Config(format!(
                "backup interval must be positive, got '{raw}'"
            )));
        }
        Ok(Some(interval))
    }

    pub fn timeout_duration(&self) -> Result<Duration> {
        let timeout = parse_duration(&self.timeout)
            .map_err(|e| e.config_context("invalid backup timeout"))?;
        if timeout.is_zero() {
            return Err(VsrError::Config("backup timeout must be positive".into()));
        }
        Ok(timeout)
    }

    pub fn retention(&self) -> Option<&str> {
        self.prune_retention
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Game data directory passed to the server as `--dataPath`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default = "default_server_program")]
    pub program: String,
    /// Arguments placed before `--dataPath <data_dir>`.
    #[serde(default = "default_server_args")]
    pub args: Vec<String>,
    /// Minimum spacing between console commands, in milliseconds.
    #[serde(default = "default_command_delay_ms")]
    pub command_delay_ms: u64,
    /// How long a stopping server may take before it is killed.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            working_dir: default_working_dir(),
            program: default_server_program(),
            args: default_server_args(),
            command_delay_ms: default_command_delay_ms(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

impl ServerConfig {
    /// Full argument list for the server process.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--dataPath".to_string());
        args.push(self.data_dir.to_string_lossy().into_owned());
        args
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    pub fn shutdown_grace_duration(&self) -> Result<Duration> {
        parse_duration(&self.shutdown_grace).map_err(|e| e.config_context("invalid shutdown grace"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResticConfig {
    #[serde(default = "default_restic_binary")]
    pub binary: String,
}

impl Default for ResticConfig {
    fn default() -> Self {
        Self {
            binary: default_restic_binary(),
        }
    }
}
