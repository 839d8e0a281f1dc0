//! List the directories a registration would watch

use anyhow::{Context, Result};
use depthwatch::{TreeWatcher, WatchConfig, WatchEventKind};
use std::path::Path;

pub fn run(config: WatchConfig, path: &Path, depth: usize) -> Result<()> {
    // Nothing is dispatched; registering is enough to compute the set
    let watcher = TreeWatcher::new(WatchConfig {
        dispatcher_enabled: false,
        ..config
    });

    let stats = watcher
        .register(path, depth, &[WatchEventKind::Created], |_, _| {})
        .with_context(|| format!("Failed to register {}", path.display()))?;

    for registered in watcher.registered_paths() {
        println!("{}", registered.display());
    }
    eprintln!(
        "{} directories, {} files, {} failed visits",
        stats.directories, stats.files, stats.failed
    );
    Ok(())
}
