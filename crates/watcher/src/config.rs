//! Watcher configuration
//!
//! Loaded from TOML, either as bare top-level keys or under a `[watcher]`
//! table. Every field has a default so partial files are accepted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for registration and the background dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Control switch for the dispatcher thread (default: true)
    ///
    /// When disabled, `register` never starts the thread and sweeps must be
    /// driven manually.
    #[serde(default = "default_true")]
    pub dispatcher_enabled: bool,

    /// Pause between sweeps in milliseconds (default: 25)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Follow symbolic links while walking a tree (default: true)
    #[serde(default = "default_true")]
    pub follow_links: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dispatcher_enabled: true,
            sweep_interval_ms: default_sweep_interval_ms(),
            follow_links: true,
        }
    }
}

impl WatchConfig {
    /// Load configuration from a TOML file
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut table: toml::Table = contents.parse()?;

        let section = match table.remove("watcher") {
            Some(toml::Value::Table(watcher)) => watcher,
            Some(other) => anyhow::bail!("[watcher] must be a table, found {}", other.type_str()),
            None => table,
        };

        Ok(toml::Value::Table(section).try_into()?)
    }

    /// Pause between sweeps
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_ms() -> u64 {
    25
}
