use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct PersistentSettings {
    pub results_dir: Option<PathBuf>,
    pub file_writer_enabled: Option<bool>,
    pub database: Option<PathBuf>,
    pub default_lease_ms: Option<u64>,
    pub default_wait_ms: Option<u64>,
}

pub fn load_settings(path: &Path) -> PersistentSettings {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring invalid settings file {:?}: {}", path, e);
                PersistentSettings::default()
            }
        },
        Err(_) => PersistentSettings::default(),
    }
}

/// Writes `settings` as pretty JSON, creating the parent directory.
pub fn save_settings(path: &Path, settings: &PersistentSettings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    debug!("Saved settings to {:?}", path);
    Ok(())
}
