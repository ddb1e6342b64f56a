mod defaults;
mod env;
mod server_config;
mod types;

use std::path::{Path, PathBuf};

pub use self::defaults::{parse_bool_flag, parse_duration};
pub use self::env::{
    apply_env_overrides, process_env, validate_restic_env, ENV_BACKUP_INTERVAL,
    ENV_BACKUP_ON_START, ENV_BACKUP_TIMEOUT, ENV_PAUSE_WHEN_NO_PLAYERS, ENV_PRUNE_RETENTION,
    ENV_RESTIC_PASSWORD, ENV_RESTIC_REPOSITORY,
};
pub use self::server_config::{save_name, DEFAULT_SAVE_NAME, SERVER_CONFIG_FILE};
pub use self::types::*;

use crate::error::{Result, VsrError};

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_ENV_VAR: &str = "VSR_CONFIG";

/// Pick the config file to load: CLI argument, then `$VSR_CONFIG`.
/// `None` means run on defaults plus environment overrides.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    process_env(CONFIG_ENV_VAR).map(PathBuf::from)
}

/// Parse a YAML config file.
pub fn load_config(path: &Path) -> Result<LauncherConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        VsrError::Config(format!("cannot read config file '{}': {e}", path.display()))
    })?;
    if contents.trim().is_empty() {
        return Ok(LauncherConfig::default());
    }
    serde_yaml::from_str(&contents)
        .map_err(|e| VsrError::Config(format!("invalid config file '{}': {e}", path.display())))
}

/// Load the launcher configuration: optional YAML file, then environment
/// overrides from the process environment.
pub fn load_launcher_config(cli_path: Option<&Path>) -> Result<LauncherConfig> {
    let mut config = match resolve_config_path(cli_path) {
        Some(path) => load_config(&path)?,
        None => LauncherConfig::default(),
    };
    apply_env_overrides(&mut config, process_env)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn yaml_sections_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vsr.yaml");
        std::fs::write(
            &path,
            "backup:\n  interval: 6h\n  pause_when_no_players: true\n  jitter_seconds: 30\nserver:\n  data_dir: /srv/vs\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.backup.interval_duration().unwrap(),
            Some(Duration::from_secs(6 * 3600))
        );
        assert!(config.backup.pause_when_no_players);
        assert_eq!(config.backup.jitter_seconds, 30);
        assert_eq!(
            config.backup.timeout_duration().unwrap(),
            Duration::from_secs(300)
        );
        assert_eq!(config.server.data_dir, Path::new("/srv/vs"));
        assert_eq!(
            config.server.command_args(),
            vec![
                "/serverbinaries/VintageStoryServer.dll".to_string(),
                "--dataPath".to_string(),
                "/srv/vs".to_string()
            ]
        );
        assert_eq!(config.restic.binary, "restic");
        assert_eq!(
            config.backup.staging_dir,
            Path::new("/backupcache/staging")
        );
    }

    #[test]
    fn empty_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vsr.yaml");
        std::fs::write(&path, "\n").unwrap();
        let config = load_config(&path).unwrap();
        assert!(!config.backup.enabled());
        assert_eq!(config.server.command_delay(), Duration::from_millis(100));
        assert_eq!(
            config.server.shutdown_grace_duration().unwrap(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vsr.yaml");
        std::fs::write(&path, "backup: [not, a, map]\n").unwrap();
        assert!(matches!(load_config(&path), Err(VsrError::Config(_))));
        assert!(matches!(
            load_config(&dir.path().join("missing.yaml")),
            Err(VsrError::Config(_))
        ));
    }

    #[test]
    fn cli_path_wins() {
        let path = Path::new("/etc/vsr.yaml");
        assert_eq!(resolve_config_path(Some(path)), Some(path.to_path_buf()));
    }
}
