use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, ResultExt};
use crate::vcdbtree::SAVE_EXTENSION;

pub const SERVER_CONFIG_FILE: &str = "serverconfig.json";
pub const DEFAULT_SAVE_NAME: &str = "default";

/// The subset of the game's `serverconfig.json` this tool reads.
#[derive(Debug, Default, Deserialize)]
struct ServerConfigDocument {
    #[serde(rename = "WorldConfig", default)]
    world_config: Option<WorldConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct WorldConfig {
    #[serde(rename = "SaveFileLocation", default)]
    save_file_location: Option<String>,
}

/// Name of the world's subtree under `Saves/`: the basename of
/// `WorldConfig.SaveFileLocation` without its `.vcdbs` extension, or
/// `default` when the field is absent.
pub fn save_name(data_dir: &Path) -> Result<String> {
    let path = data_dir.join(SERVER_CONFIG_FILE);
    let raw = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    let doc: ServerConfigDocument =
        serde_json::from_slice(&raw).with_context(|| format!("parse {}", path.display()))?;

    let location = doc
        .world_config
        .and_then(|w| w.save_file_location)
        .filter(|s| !s.is_empty());
    Ok(location
        .as_deref()
        .and_then(base_name)
        .map(|name| strip_save_extension(name).to_string())
        .unwrap_or_else(|| DEFAULT_SAVE_NAME.to_string()))
}

/// Last path component, accepting either separator since the game may be
/// configured from Windows.
fn base_name(location: &str) -> Option<&str> {
    location
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
}

fn strip_save_extension(name: &str) -> &str {
    name.strip_suffix(SAVE_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(name)
}
