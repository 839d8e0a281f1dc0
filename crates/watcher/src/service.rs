//! Public entry point: register, deregister and inspect watched trees

use crate::config::WatchConfig;
use crate::dispatcher::{self, Dispatcher, DispatcherState, SweepStats};
use crate::error::{Result, WatchError};
use crate::event::{EventCallback, EventKindSet, WatchEvent, WatchEventKind};
use crate::native::{NotifyFactory, WatchFactory};
use crate::paths;
use crate::registrar::WalkStats;
use crate::registry::WatchRegistration;
use crate::state::WatchState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Depth-bounded recursive watcher
///
/// Owns the watch registry, the event log and the dispatcher thread. The
/// thread is started by the first `register` call and stopped by
/// [`TreeWatcher::shutdown`] or on drop.
pub struct TreeWatcher {
    state: Arc<WatchState>,
    dispatcher: Dispatcher,
}

impl TreeWatcher {
    /// Create a watcher backed by the platform's native watches
    pub fn new(config: WatchConfig) -> Self {
        Self::with_factory(config, Arc::new(NotifyFactory))
    }

    /// Create a watcher that opens handles through `factory`
    pub fn with_factory(config: WatchConfig, factory: Arc<dyn WatchFactory>) -> Self {
        Self {
            state: Arc::new(WatchState::new(config, factory)),
            dispatcher: Dispatcher::new(),
        }
    }

    /// Process-wide instance with default configuration, created on first use
    pub fn global() -> &'static TreeWatcher {
        static GLOBAL: OnceLock<TreeWatcher> = OnceLock::new();
        GLOBAL.get_or_init(|| TreeWatcher::new(WatchConfig::default()))
    }

    pub fn config(&self) -> &WatchConfig {
        &self.state.config
    }

    /// Watch `path` and every directory up to `max_depth` levels below it
    ///
    /// `kinds` must hold one to four entries. Subdirectories created later are
    /// registered automatically while they fit the budget of their nearest
    /// registered ancestor. Starts the dispatcher if it is not running.
    ///
    /// Large depths register one native watch per directory and may exhaust
    /// platform watch limits.
    pub fn register<F>(
        &self,
        path: &Path,
        max_depth: usize,
        kinds: &[WatchEventKind],
        callback: F,
    ) -> Result<WalkStats>
    where
        F: Fn(&Path, &WatchEvent) + Send + Sync + 'static,
    {
        let kinds = EventKindSet::from_slice(kinds)?;
        let root = paths::absolute(path)?;
        if !root.exists() {
            return Err(WatchError::PathNotFound(root));
        }
        if !root.is_dir() {
            return Err(WatchError::NotADirectory(root));
        }

        info!("Registering {} (max depth {})", root.display(), max_depth);
        let callback: EventCallback = Arc::new(callback);
        let stats = self.state.register_tree(&root, max_depth, kinds, &callback)?;

        self.dispatcher.start(Arc::clone(&self.state))?;
        Ok(stats)
    }

    /// Stop watching `path` and every registered directory beneath it
    ///
    /// Deregistering a path that was never registered only logs a warning.
    /// Returns the number of watches closed.
    pub fn deregister(&self, path: &Path) -> Result<usize> {
        let target = paths::absolute(path)?;
        if target.exists() && !target.is_dir() {
            return Err(WatchError::NotADirectory(target));
        }

        if !self.state.registry.contains(&target) {
            warn!(
                "Deregistering path that was never registered: {}",
                target.display()
            );
            return Ok(0);
        }

        let retracted = self.state.deregister_subtree(&target);
        info!("Deregistered {} ({} watches)", target.display(), retracted);
        Ok(retracted)
    }

    /// Copy of every recorded path and its event kinds, oldest first
    pub fn triggered_events(&self) -> HashMap<PathBuf, Vec<WatchEventKind>> {
        self.state.log.snapshot()
    }

    /// Event kinds recorded for one path, oldest first
    pub fn events_for(&self, path: &Path) -> Vec<WatchEventKind> {
        self.state.log.events_for(path)
    }

    pub fn clear_triggered_events(&self) {
        self.state.log.clear();
    }

    /// Currently registered directories, sorted
    pub fn registered_paths(&self) -> Vec<PathBuf> {
        self.state.registry.keys()
    }

    pub fn is_registered(&self, path: &Path) -> bool {
        self.state.registry.contains(path)
    }

    pub fn registration(&self, path: &Path) -> Option<Arc<WatchRegistration>> {
        self.state.registry.get(path)
    }

    /// Run one sweep on the calling thread
    ///
    /// Useful when the dispatcher is disabled by configuration.
    pub fn sweep(&self) -> SweepStats {
        dispatcher::sweep(&self.state)
    }

    pub fn dispatcher_state(&self) -> DispatcherState {
        self.dispatcher.state()
    }

    /// Stop the dispatcher and wait for its current sweep to finish
    ///
    /// Registrations are kept; a later `register` starts a new dispatcher.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }
}

impl Drop for TreeWatcher {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
    }
}

impl Default for TreeWatcher {
    fn default() -> Self {
        Self::new(WatchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::scripted::ScriptedFactory;
    use std::fs;
    use tempfile::TempDir;

    const KINDS: [WatchEventKind; 3] = [
        WatchEventKind::Created,
        WatchEventKind::Deleted,
        WatchEventKind::Modified,
    ];

    fn manual_watcher() -> (TreeWatcher, ScriptedFactory) {
        let factory = ScriptedFactory::default();
        let config = WatchConfig {
            dispatcher_enabled: false,
            ..WatchConfig::default()
        };
        (TreeWatcher::with_factory(config, Arc::new(factory.clone())), factory)
    }

    #[test]
    fn test_register_validates_arguments() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x")?;
        let (watcher, _) = manual_watcher();

        assert!(matches!(
            watcher.register(temp_dir.path(), 1, &[], |_, _| {}),
            Err(WatchError::InvalidArgument(_))
        ));
        assert!(matches!(
            watcher.register(Path::new(""), 1, &KINDS, |_, _| {}),
            Err(WatchError::InvalidArgument(_))
        ));
        assert!(matches!(
            watcher.register(&temp_dir.path().join("missing"), 1, &KINDS, |_, _| {}),
            Err(WatchError::PathNotFound(_))
        ));
        assert!(matches!(
            watcher.register(&file, 1, &KINDS, |_, _| {}),
            Err(WatchError::NotADirectory(_))
        ));
        assert!(watcher.registered_paths().is_empty());
        Ok(())
    }

    #[test]
    fn test_register_then_deregister_subtree() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a/b/c"))?;
        let (watcher, factory) = manual_watcher();

        let stats = watcher.register(root, 2, &KINDS, |_, _| {})?;
        assert_eq!(stats.directories, 3);
        assert_eq!(
            watcher.registered_paths(),
            vec![root.to_path_buf(), root.join("a"), root.join("a/b")]
        );
        assert_eq!(watcher.dispatcher_state(), DispatcherState::Idle);

        assert_eq!(watcher.deregister(&root.join("a"))?, 2);
        assert_eq!(watcher.registered_paths(), vec![root.to_path_buf()]);
        assert_eq!(factory.close_count(&root.join("a/b")), 1);

        // Second deregistration is a no-op
        assert_eq!(watcher.deregister(&root.join("a"))?, 0);
        assert_eq!(factory.close_count(&root.join("a/b")), 1);
        Ok(())
    }

    #[test]
    fn test_deregister_rejects_files_and_tolerates_unknown_paths() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x")?;
        let (watcher, _) = manual_watcher();

        assert!(matches!(
            watcher.deregister(&file),
            Err(WatchError::NotADirectory(_))
        ));
        assert_eq!(watcher.deregister(&temp_dir.path().join("never"))?, 0);
        assert_eq!(watcher.deregister(temp_dir.path())?, 0);
        Ok(())
    }

    #[test]
    fn test_scenario_file_created_at_depth_two() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        let (watcher, factory) = manual_watcher();
        watcher.register(root, 2, &KINDS, |_, _| {})?;

        fs::create_dir(root.join("a"))?;
        factory.emit(root, WatchEventKind::Created, "a");
        watcher.sweep();

        fs::create_dir(root.join("a/b"))?;
        factory.emit(&root.join("a"), WatchEventKind::Created, "b");
        watcher.sweep();

        fs::write(root.join("a/b/c.txt"), b"x")?;
        factory.emit(&root.join("a/b"), WatchEventKind::Created, "c.txt");
        watcher.sweep();

        assert_eq!(
            watcher.registered_paths(),
            vec![root.to_path_buf(), root.join("a"), root.join("a/b")]
        );
        assert_eq!(
            watcher.events_for(&root.join("a/b/c.txt")),
            vec![WatchEventKind::Created]
        );

        let events = watcher.triggered_events();
        assert_eq!(events.len(), 3);
        watcher.clear_triggered_events();
        assert!(watcher.triggered_events().is_empty());
        Ok(())
    }

    fn wait_for_state(watcher: &TreeWatcher, expected: DispatcherState) -> bool {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while std::time::Instant::now() < deadline {
            if watcher.dispatcher_state() == expected {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        watcher.dispatcher_state() == expected
    }

    #[test]
    fn test_shutdown_from_callback_returns_to_idle() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        let factory = ScriptedFactory::default();
        let watcher = Arc::new(TreeWatcher::with_factory(
            WatchConfig::default(),
            Arc::new(factory.clone()),
        ));

        let handle = Arc::downgrade(&watcher);
        watcher.register(root, 0, &KINDS, move |_, _| {
            if let Some(watcher) = handle.upgrade() {
                watcher.shutdown();
            }
        })?;
        assert_eq!(watcher.dispatcher_state(), DispatcherState::Running);

        factory.emit(root, WatchEventKind::Modified, "f.txt");
        assert!(wait_for_state(&watcher, DispatcherState::Idle));
        assert_eq!(watcher.events_for(&root.join("f.txt")), vec![WatchEventKind::Modified]);

        // Registrations survive and a new dispatcher can be started
        watcher.register(root, 0, &KINDS, |_, _| {})?;
        assert_eq!(watcher.dispatcher_state(), DispatcherState::Running);
        watcher.shutdown();
        assert_eq!(watcher.dispatcher_state(), DispatcherState::Idle);
        Ok(())
    }

    #[test]
    fn test_register_while_stopping_starts_no_second_thread() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir(root.join("later"))?;
        let factory = ScriptedFactory::default();
        let watcher = Arc::new(TreeWatcher::with_factory(
            WatchConfig::default(),
            Arc::new(factory.clone()),
        ));

        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
        let handle = Arc::downgrade(&watcher);
        watcher.register(root, 0, &KINDS, move |_, _| {
            if let Some(watcher) = handle.upgrade() {
                watcher.shutdown();
            }
            let _ = entered_tx.send(());
            // Hold the sweep open so the dispatcher stays in Stopping
            let _ = release_rx.recv_timeout(std::time::Duration::from_secs(10));
        })?;

        factory.emit(root, WatchEventKind::Modified, "f.txt");
        entered_rx.recv_timeout(std::time::Duration::from_secs(10))?;
        assert_eq!(watcher.dispatcher_state(), DispatcherState::Stopping);

        let stats = watcher.register(&root.join("later"), 0, &KINDS, |_, _| {})?;
        assert_eq!(stats.directories, 1);
        assert!(watcher.is_registered(&root.join("later")));
        assert_eq!(watcher.dispatcher_state(), DispatcherState::Stopping);

        release_tx.send(())?;
        assert!(wait_for_state(&watcher, DispatcherState::Idle));
        Ok(())
    }

    #[test]
    fn test_dispatcher_starts_once_and_shuts_down() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir(temp_dir.path().join("other"))?;
        let watcher = TreeWatcher::with_factory(
            WatchConfig::default(),
            Arc::new(ScriptedFactory::default()),
        );

        watcher.register(temp_dir.path(), 0, &KINDS, |_, _| {})?;
        assert_eq!(watcher.dispatcher_state(), DispatcherState::Running);
        watcher.register(&temp_dir.path().join("other"), 0, &KINDS, |_, _| {})?;
        assert_eq!(watcher.dispatcher_state(), DispatcherState::Running);

        watcher.shutdown();
        assert_eq!(watcher.dispatcher_state(), DispatcherState::Idle);
        assert_eq!(watcher.registered_paths().len(), 2);
        Ok(())
    }
}
