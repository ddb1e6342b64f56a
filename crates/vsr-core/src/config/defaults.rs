use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, VsrError};

pub(super) fn default_backup_timeout() -> String {
    "5m".to_string()
}

pub(super) fn default_staging_dir() -> PathBuf {
    PathBuf::from("/backupcache/staging")
}

pub(super) fn default_data_dir() -> PathBuf {
    PathBuf::from("/gamedata")
}

pub(super) fn default_working_dir() -> PathBuf {
    PathBuf::from("/serverbinaries")
}

pub(super) fn default_server_program() -> String {
    "/usr/bin/dotnet".to_string()
}

pub(super) fn default_server_args() -> Vec<String> {
    vec!["/serverbinaries/VintageStoryServer.dll".to_string()]
}

pub(super) fn default_command_delay_ms() -> u64 {
    100
}

pub(super) fn default_shutdown_grace() -> String {
    "30s".to_string()
}

pub(super) fn default_restic_binary() -> String {
    "restic".to_string()
}

/// Parse a duration such as `"90"`, `"1.5h"` or `"2w"`.
///
/// A bare number is seconds. Suffixes: `s`, `m`, `h`, `d`, `w`. Decimals are
/// accepted; negative and non-finite values are not. Zero is allowed here,
/// callers that need a positive interval check for it.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(VsrError::Config("empty duration string".into()));
    }

    let (num_part, unit_secs) = match input.as_bytes()[input.len() - 1] {
        b's' => (&input[..input.len() - 1], 1.0),
        b'm' => (&input[..input.len() - 1], 60.0),
        b'h' => (&input[..input.len() - 1], 3600.0),
        b'd' => (&input[..input.len() - 1], 86_400.0),
        b'w' => (&input[..input.len() - 1], 604_800.0),
        _ => (input, 1.0),
    };

    let num_part = num_part.trim();
    if num_part.is_empty() {
        return Err(VsrError::Config(format!(
            "invalid duration '{raw}': missing numeric value"
        )));
    }
    let value: f64 = num_part
        .parse()
        .map_err(|_| VsrError::Config(format!("invalid duration number '{num_part}'")))?;
    if !value.is_finite() {
        return Err(VsrError::Config(format!("invalid duration number '{num_part}'")));
    }
    if value < 0.0 {
        return Err(VsrError::Config(format!(
            "duration cannot be negative: '{raw}'"
        )));
    }

    Duration::try_from_secs_f64(value * unit_secs)
        .map_err(|e| VsrError::Config(format!("duration '{raw}' out of range: {e}")))
}

/// `true`, `1` or `yes`, case-insensitive and trimmed. Anything else is false.
pub fn parse_bool_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}
