//! Per-user configuration: enabled sources, notification thresholds, UI
//! preferences. Persisted at `~/.jacques/config.json`.

use std::path::PathBuf;

use fs_err as fs;
use serde::{Deserialize, Serialize};

use jacques_protocol::NotificationSettings;

use crate::error::{Error, Result};

/// Returns `~/.jacques`, creating nothing — callers create on write.
pub fn jacques_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".jacques"))
}

pub fn config_path() -> Option<PathBuf> {
    jacques_home().map(|dir| dir.join("config.json"))
}

pub fn session_index_path() -> Option<PathBuf> {
    jacques_home().map(|dir| dir.join("session-index.json"))
}

pub fn archive_dir() -> Option<PathBuf> {
    jacques_home().map(|dir| dir.join("archive"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub google_enabled: bool,
    pub notion_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiPreferences {
    pub preferred_terminal: Option<String>,
    pub root_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JacquesConfig {
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub ui: UiPreferences,
}

impl Default for JacquesConfig {
    fn default() -> Self {
        Self {
            notifications: NotificationSettings::default(),
            sources: SourcesConfig::default(),
            ui: UiPreferences::default(),
        }
    }
}

/// Loads the config, falling back to defaults when the file is missing or
/// unparseable rather than failing daemon startup.
pub fn load_config() -> JacquesConfig {
    config_path()
        .and_then(|path| fs::read_to_string(path).ok())
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

/// Saves the config atomically (write-to-temp, then rename).
pub fn save_config(config: &JacquesConfig) -> Result<()> {
    let path = config_path().ok_or_else(|| Error::Internal("no home directory".to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io("create .jacques dir", e))?;
    }
    let payload =
        serde_json::to_vec_pretty(config).map_err(|e| Error::json("serialize config", e))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload).map_err(|e| Error::io("write config", e))?;
    fs::rename(&tmp_path, &path).map_err(|e| Error::io("commit config", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_notification_categories_match_spec_defaults() {
        let config = JacquesConfig::default();
        assert!(config.notifications.enabled);
        assert_eq!(config.notifications.context_thresholds, vec![70, 85]);
    }
}
