//! Proxy configuration.
//!
//! [`ProxyConfig`] holds the settings that can live in a file. Entity
//! registrations and upgrade hooks are code, so they are added on the
//! [`ProxyBuilder`](crate::ProxyBuilder) created from a config.

use ormproxy_core::{ConfigError, Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default SQLite busy timeout.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;

/// Settings for building a [`DbProxy`](crate::DbProxy).
///
/// A proxy is helper-backed when `name` is non-empty and `version` is at
/// least 1; otherwise `database_file`, when set, opens an external database
/// with schema management disabled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Database file name for a helper-managed database.
    #[serde(default)]
    pub name: Option<String>,
    /// Directory holding the helper-managed database file.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Schema version for a helper-managed database.
    #[serde(default)]
    pub version: i64,
    /// Path of an external database file.
    #[serde(default)]
    pub database_file: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,
}

/// Returns the default busy timeout for SQLite connections.
const fn default_busy_timeout_ms() -> u32 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            name: None,
            directory: None,
            version: 0,
            database_file: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl ProxyConfig {
    /// Parse a config from JSON text.
    #[allow(clippy::result_large_err)]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("Invalid proxy config: {}", e),
                source: Some(Box::new(e)),
            })
        })
    }

    /// Read and parse a JSON config file.
    #[allow(clippy::result_large_err)]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Whether these settings describe a helper-managed database.
    pub fn is_managed(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty()) && self.version > 0
    }

    /// Location of the helper-managed database file, if any.
    pub fn managed_path(&self) -> Option<PathBuf> {
        if !self.is_managed() {
            return None;
        }
        let name = self.name.as_deref()?.trim();
        Some(match &self.directory {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        })
    }
}
