//! Configuration management for Flockwatch

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FlockwatchError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub watcher: WatcherConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the PDS the client talks to.
    pub url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: "https://bsky.social".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Period between follower checks, humantime format ("5m", "90s").
    pub check_interval: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            check_interval: "5m".to_string(),
        }
    }
}

impl WatcherConfig {
    pub fn interval(&self) -> Result<Duration> {
        humantime::parse_duration(&self.check_interval).map_err(|e| {
            FlockwatchError::InvalidInput(format!(
                "invalid check interval '{}': {}",
                self.check_interval, e
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Whether follower state is written to disk at all.
    pub persist_state: bool,
    /// State blob location; defaults to the XDG data directory.
    pub state_file: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist_state: true,
            state_file: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the on-disk location of the state blob.
    pub fn resolve_state_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.state_file {
            return Ok(PathBuf::from(shellexpand::tilde(path).to_string()));
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;
        Ok(data_dir.join("flockwatch").join("state.json"))
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }
}

/// Resolve the configuration file path following the XDG Base Directory spec.
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("FLOCKWATCH_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("flockwatch").join("config.toml"))
}
