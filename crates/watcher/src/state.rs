//! State shared between callers and the dispatcher thread

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::event::{EventCallback, EventKindSet};
use crate::event_log::EventLog;
use crate::native::WatchFactory;
use crate::paths::is_within;
use crate::registrar::{DirectoryRegistrar, TreeRegistrar, WalkStats};
use crate::registry::{WatchRegistration, WatchRegistry};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub(crate) struct WatchState {
    pub(crate) registry: WatchRegistry,
    pub(crate) log: EventLog,
    pub(crate) config: WatchConfig,
    factory: Arc<dyn WatchFactory>,
}

impl WatchState {
    pub(crate) fn new(config: WatchConfig, factory: Arc<dyn WatchFactory>) -> Self {
        Self {
            registry: WatchRegistry::new(),
            log: EventLog::new(),
            config,
            factory,
        }
    }

    /// Walk `root` and register every directory within `max_depth`
    pub(crate) fn register_tree(
        &self,
        root: &Path,
        max_depth: usize,
        kinds: EventKindSet,
        callback: &EventCallback,
    ) -> Result<WalkStats> {
        TreeRegistrar::new(self, self.config.follow_links).register_tree(root, max_depth, kinds, callback)
    }

    /// Remove and close `target` and every registration beneath it
    ///
    /// Returns the number of watches retracted.
    pub(crate) fn deregister_subtree(&self, target: &Path) -> usize {
        let mut retracted = 0;
        for path in self.registry.keys() {
            if !is_within(target, &path) {
                continue;
            }
            if let Some(registration) = self.registry.remove(&path) {
                registration.close();
                debug!("Deregistered watch for {}", path.display());
                retracted += 1;
            }
        }
        retracted
    }
}

impl DirectoryRegistrar for WatchState {
    fn register_directory(
        &self,
        dir: &Path,
        remaining_depth: usize,
        kinds: EventKindSet,
        callback: &EventCallback,
    ) -> Result<bool> {
        if self.registry.contains(dir) {
            debug!("Skipped registration of {}: already registered", dir.display());
            return Ok(false);
        }
        if !dir.is_dir() {
            return Err(WatchError::NotADirectory(dir.to_path_buf()));
        }

        let handle = self.factory.open(dir)?;
        let registration = WatchRegistration::new(
            dir.to_path_buf(),
            handle,
            remaining_depth,
            kinds,
            Arc::clone(callback),
        );

        let inserted = self.registry.insert_if_absent(registration);
        if inserted {
            debug!(
                "Registered watch for {} (remaining depth {})",
                dir.display(),
                remaining_depth
            );
        } else {
            debug!("Lost registration race for {}", dir.display());
        }
        Ok(inserted)
    }
}
