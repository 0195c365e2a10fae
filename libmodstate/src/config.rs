//! Configuration management for modstate
//!
//! The config file is optional. When it does not exist every section falls
//! back to its defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Buffered notifications per async subscriber
    pub notify_capacity: usize,
    /// Maximum follow-up events waiting in the dispatch queue
    pub queue_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            notify_capacity: 64,
            queue_limit: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: String,
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        if config.store.queue_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "store.queue_limit".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(config)
    }
}

/// Resolve the configuration file path
///
/// `MODSTATE_CONFIG` wins (tilde-expanded); otherwise the platform config
/// directory is used.
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MODSTATE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("modstate").join("config.toml"))
}
