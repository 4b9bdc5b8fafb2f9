// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sync::Provider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_enclosure_dir")]
    pub enclosure_dir: PathBuf,

    /// Number of feeds refreshed in parallel
    #[serde(default = "default_update_concurrency")]
    pub update_concurrency: usize,

    /// Positions this close to the end of an episode count as played
    #[serde(default = "default_completion_threshold")]
    pub completion_threshold_secs: u32,

    /// Mark entries of a freshly subscribed feed as unread
    #[serde(default)]
    pub mark_unread_on_new_feed: bool,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub provider: Provider,

    /// Server base URL; empty means the provider default
    #[serde(default)]
    pub server: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub device_id: String,

    #[serde(default)]
    pub device_name: String,

    #[serde(default)]
    pub sync_on_startup: bool,

    #[serde(default)]
    pub sync_on_refresh: bool,

    /// Fallback password storage when no keyring is available.
    /// Migrated into the keyring on first use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("castsync")
        .join("feeds.db")
}

fn default_enclosure_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("castsync")
        .join("enclosures")
}

fn default_update_concurrency() -> usize {
    3
}

fn default_completion_threshold() -> u32 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            enclosure_dir: default_enclosure_dir(),
            update_concurrency: default_update_concurrency(),
            completion_threshold_secs: default_completion_threshold(),
            mark_unread_on_new_feed: false,
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
                    path: path.clone(),
                    source: e,
                })?;
            let config = toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
                path: path.clone(),
                source: e,
            })?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteFailed {
            path: path.clone(),
            source: e,
        })?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("castsync")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_creates_default_when_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.update_concurrency, 3);
        assert_eq!(config.completion_threshold_secs, 15);
        assert!(!config.sync.enabled);
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.update_concurrency = 8;
        config.sync.enabled = true;
        config.sync.username = "alice".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.update_concurrency, 8);
        assert!(loaded.sync.enabled);
        assert_eq!(loaded.sync.username, "alice");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "update_concurrency = 5\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.update_concurrency, 5);
        assert_eq!(config.completion_threshold_secs, 15);
    }
}
