use tracing::debug;

use super::defaults::parse_bool_flag;
use super::types::LauncherConfig;
use crate::error::{Result, VsrError};

pub const ENV_BACKUP_INTERVAL: &str = "BACKUP_INTERVAL";
pub const ENV_BACKUP_ON_START: &str = "DO_BACKUP_ON_SERVER_START";
pub const ENV_PAUSE_WHEN_NO_PLAYERS: &str = "BACKUP_PAUSE_WHEN_NO_PLAYERS";
pub const ENV_PRUNE_RETENTION: &str = "BACKUP_PRUNE_RETENTION";
pub const ENV_BACKUP_TIMEOUT: &str = "BACKUP_TIMEOUT";
pub const ENV_RESTIC_REPOSITORY: &str = "RESTIC_REPOSITORY";
pub const ENV_RESTIC_PASSWORD: &str = "RESTIC_PASSWORD";

/// Read a variable from the process environment, treating empty as unset.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Apply the container's environment variables on top of a loaded config.
///
/// `lookup` returns `None` for unset (or empty) variables.
pub fn apply_env_overrides<F>(config: &mut LauncherConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_BACKUP_INTERVAL) {
        debug!(value = %raw, "{ENV_BACKUP_INTERVAL} override");
        config.backup.interval = Some(raw);
    }
    if let Some(raw) = lookup(ENV_BACKUP_ON_START) {
        config.backup.on_server_start = parse_bool_flag(&raw);
    }
    if let Some(raw) = lookup(ENV_PAUSE_WHEN_NO_PLAYERS) {
        config.backup.pause_when_no_players = parse_bool_flag(&raw);
    }
    if let Some(raw) = lookup(ENV_PRUNE_RETENTION) {
        config.backup.prune_retention = Some(raw);
    }
    if let Some(raw) = lookup(ENV_BACKUP_TIMEOUT) {
        config.backup.timeout = raw;
    }

    // Surface a bad value at startup, not at the first tick.
    config
        .backup
        .interval_duration()
        .map_err(|e| e.config_context(ENV_BACKUP_INTERVAL))?;
    config.backup.timeout_duration()?;
    Ok(())
}

/// Backups need a restic repository and its password in the environment.
pub fn validate_restic_env<F>(lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for name in [ENV_RESTIC_REPOSITORY, ENV_RESTIC_PASSWORD] {
        if lookup(name).is_none() {
            return Err(VsrError::Config(format!(
                "{ENV_BACKUP_INTERVAL} is set but {name} is not; backups require {name} to be configured"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).filter(|v| !v.is_empty()).cloned()
    }

    #[test]
    fn unset_interval_leaves_backups_disabled() {
        let mut config = LauncherConfig::default();
        apply_env_overrides(&mut config, env(&[])).unwrap();
        assert!(!config.backup.enabled());
        assert_eq!(config.backup.interval_duration().unwrap(), None);
    }

    #[test]
    fn overrides_are_applied() {
        let mut config = LauncherConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                (ENV_BACKUP_INTERVAL, "30m"),
                (ENV_BACKUP_ON_START, "YES"),
                (ENV_PAUSE_WHEN_NO_PLAYERS, " true "),
                (ENV_PRUNE_RETENTION, "--keep-daily 7 --keep-weekly 4"),
                (ENV_BACKUP_TIMEOUT, "90"),
            ]),
        )
        .unwrap();

        assert!(config.backup.enabled());
        assert_eq!(
            config.backup.interval_duration().unwrap(),
            Some(Duration::from_secs(1800))
        );
        assert!(config.backup.on_server_start);
        assert!(config.backup.pause_when_no_players);
        assert_eq!(
            config.backup.retention(),
            Some("--keep-daily 7 --keep-weekly 4")
        );
        assert_eq!(
            config.backup.timeout_duration().unwrap(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn bad_interval_is_rejected_at_load() {
        for bad in ["-5m", "abc", "0", "0s"] {
            let mut config = LauncherConfig::default();
            let err = apply_env_overrides(&mut config, env(&[(ENV_BACKUP_INTERVAL, bad)]))
                .unwrap_err();
            assert!(err.to_string().contains(ENV_BACKUP_INTERVAL), "{bad}: {err}");
        }
    }

    #[test]
    fn restic_env_requires_repository_then_password() {
        let err = validate_restic_env(env(&[(ENV_RESTIC_PASSWORD, "pw")])).unwrap_err();
        assert!(err.to_string().contains(ENV_RESTIC_REPOSITORY));

        let err = validate_restic_env(env(&[(ENV_RESTIC_REPOSITORY, "/repo")])).unwrap_err();
        assert!(err.to_string().contains(ENV_RESTIC_PASSWORD));

        validate_restic_env(env(&[
            (ENV_RESTIC_REPOSITORY, "/repo"),
            (ENV_RESTIC_PASSWORD, "pw"),
        ]))
        .unwrap();
    }

    #[test]
    fn boot_backup_is_opt_in() {
        let mut config = LauncherConfig::default();
        apply_env_overrides(&mut config, env(&[(ENV_BACKUP_INTERVAL, "1h")])).unwrap();
        assert!(!config.backup.on_server_start);

        for off in ["", "false", "0", "no"] {
            apply_env_overrides(&mut config, env(&[(ENV_BACKUP_ON_START, off)])).unwrap();
            assert!(!config.backup.on_server_start, "{off:?}");
        }

        apply_env_overrides(&mut config, env(&[(ENV_BACKUP_ON_START, "1")])).unwrap();
        assert!(config.backup.on_server_start);
    }
}
