//! CLI command implementations

pub mod paths;
pub mod watch;

use anyhow::Result;
use depthwatch::WatchConfig;
use std::path::Path;

/// Load the watcher configuration, falling back to defaults
pub fn load_config(path: Option<&Path>) -> Result<WatchConfig> {
    match path {
        Some(path) => WatchConfig::load(path),
        None => Ok(WatchConfig::default()),
    }
}
