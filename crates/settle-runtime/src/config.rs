//! Runtime configuration, read from an optional YAML file.

use persistence::DEFAULT_KEY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// How `close_turn` treats amounts off the settlement step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Refuse to close while any amount is off the 0.1 M / 100 K step.
    #[default]
    Strict,
    /// Close with whatever amounts are pending.
    Lenient,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid config: {0}")]
    Parse(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

/// Settlement tool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleConfig {
    /// File backing the snapshot store.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Key the snapshot is stored under.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Snapshot lifetime in days.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
    #[serde(default)]
    pub validation: ValidationPolicy,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./saves/settlement.json")
}

fn default_storage_key() -> String {
    DEFAULT_KEY.to_string()
}

fn default_ttl_days() -> u32 {
    14
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            storage_key: default_storage_key(),
            ttl_days: default_ttl_days(),
            validation: ValidationPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

impl SettleConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl_days) * 24 * 60 * 60)
    }
}
