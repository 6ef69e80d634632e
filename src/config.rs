//! Configuration for grc-access

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::GrcError;
use crate::rules::{Extension, RuleRegistry};

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("grc-access")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Contributed rule modules merged into the validation table
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Default tracing directive, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("grc.db")
}

fn default_extensions() -> Vec<String> {
    Extension::ALL.iter().map(|e| e.name().to_string()).collect()
}

fn default_log_filter() -> String {
    "grc_access=info".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            extensions: default_extensions(),
            log_filter: default_log_filter(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GrcError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| GrcError::Config(format!("Invalid config: {}", e)))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), GrcError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GrcError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Rule registry with the configured extensions
    pub fn registry(&self) -> Result<RuleRegistry, GrcError> {
        RuleRegistry::from_extension_names(&self.extensions)
    }
}
