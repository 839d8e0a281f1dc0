//! Registry of directories under active observation

use crate::error::{Result, WatchError};
use crate::event::{EventCallback, EventKindSet};
use crate::native::{NativeEvent, NativeWatch};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One directory under active observation
///
/// Owns its native handle exclusively. The handle is closed exactly once, on
/// deregistration or when a competing registration for the same path wins.
pub struct WatchRegistration {
    path: PathBuf,
    handle: Mutex<Option<Box<dyn NativeWatch>>>,
    remaining_depth: usize,
    kinds: EventKindSet,
    callback: EventCallback,
}

impl WatchRegistration {
    pub fn new(
        path: PathBuf,
        handle: Box<dyn NativeWatch>,
        remaining_depth: usize,
        kinds: EventKindSet,
        callback: EventCallback,
    ) -> Self {
        Self {
            path,
            handle: Mutex::new(Some(handle)),
            remaining_depth,
            kinds,
            callback,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Levels below this directory still eligible for automatic registration
    pub fn remaining_depth(&self) -> usize {
        self.remaining_depth
    }

    pub fn kinds(&self) -> EventKindSet {
        self.kinds
    }

    pub fn callback(&self) -> &EventCallback {
        &self.callback
    }

    /// Drain pending events from the native handle without blocking
    pub fn poll(&self) -> Result<Vec<NativeEvent>> {
        match self.handle.lock().as_mut() {
            Some(handle) => handle.poll(),
            None => Err(WatchError::HandleClosed(self.path.clone())),
        }
    }

    /// Close the native handle. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        match self.handle.lock().take() {
            Some(mut handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handle.lock().is_none()
    }
}

impl fmt::Debug for WatchRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRegistration")
            .field("path", &self.path)
            .field("remaining_depth", &self.remaining_depth)
            .field("kinds", &self.kinds)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Thread-safe map from absolute directory path to its registration
///
/// Each operation is atomic on its own; no transaction spans two calls.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    entries: DashMap<PathBuf, Arc<WatchRegistration>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the path is already registered
    ///
    /// The first writer wins. A rejected registration has its handle closed
    /// and `false` is returned.
    pub fn insert_if_absent(&self, registration: WatchRegistration) -> bool {
        match self.entries.entry(registration.path.clone()) {
            Entry::Occupied(_) => {
                registration.close();
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(registration));
                true
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<Arc<WatchRegistration>> {
        self.entries.get(path).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Remove a registration, leaving its handle open
    pub fn remove(&self, path: &Path) -> Option<Arc<WatchRegistration>> {
        self.entries.remove(path).map(|(_, registration)| registration)
    }

    /// Point-in-time copy of every registration, sorted by path bytes
    pub fn snapshot(&self) -> Vec<(PathBuf, Arc<WatchRegistration>)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        entries.sort_by(|a, b| a.0.as_os_str().cmp(b.0.as_os_str()));
        entries
    }

    /// Point-in-time copy of the registered paths, sorted by path bytes
    pub fn keys(&self) -> Vec<PathBuf> {
        let mut keys: Vec<PathBuf> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        keys
    }

    /// Closest registration at or above `path`
    pub fn nearest_ancestor(&self, path: &Path) -> Option<Arc<WatchRegistration>> {
        path.ancestors().find_map(|ancestor| self.get(ancestor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{WatchEvent, WatchEventKind};
    use crate::native::scripted::ScriptedFactory;
    use crate::native::WatchFactory;
    use tempfile::TempDir;

    fn registration(factory: &ScriptedFactory, path: &Path, depth: usize) -> WatchRegistration {
        let callback: EventCallback = Arc::new(|_: &Path, _: &WatchEvent| {});
        WatchRegistration::new(
            path.to_path_buf(),
            factory.open(path).unwrap(),
            depth,
            EventKindSet::from_slice(&[WatchEventKind::Created]).unwrap(),
            callback,
        )
    }

    #[test]
    fn test_first_writer_wins() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let factory = ScriptedFactory::default();
        let registry = WatchRegistry::new();

        assert!(registry.insert_if_absent(registration(&factory, root, 3)));
        assert!(!registry.insert_if_absent(registration(&factory, root, 1)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(root).unwrap().remaining_depth(), 3);
        // The losing handle was closed, the winner's was not
        assert_eq!(factory.close_count(root), 1);
        assert!(!registry.get(root).unwrap().is_closed());
    }

    #[test]
    fn test_concurrent_inserts_keep_exactly_one() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let factory = ScriptedFactory::default();
        let registry = WatchRegistry::new();
        let threads = 8;
        let barrier = std::sync::Barrier::new(threads);

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|depth| {
                    let (factory, registry, barrier) = (&factory, &registry, &barrier);
                    scope.spawn(move || {
                        let candidate = registration(factory, root, depth);
                        barrier.wait();
                        registry.insert_if_absent(candidate)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|inserted| *inserted)
                .count()
        });

        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
        assert!(!registry.get(root).unwrap().is_closed());
        // Every losing handle was closed exactly once
        assert_eq!(factory.close_count(root), threads - 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let factory = ScriptedFactory::default();
        let reg = registration(&factory, temp_dir.path(), 0);

        assert!(reg.close());
        assert!(!reg.close());
        assert!(matches!(reg.poll(), Err(WatchError::HandleClosed(_))));
        assert_eq!(factory.close_count(temp_dir.path()), 1);
    }

    #[test]
    fn test_snapshot_order_and_nearest_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["b", "a", "a-c", "a/x"] {
            std::fs::create_dir_all(root.join(name)).unwrap();
        }

        let factory = ScriptedFactory::default();
        let registry = WatchRegistry::new();
        for name in ["b", "a-c", "a/x", "a"] {
            registry.insert_if_absent(registration(&factory, &root.join(name), 1));
        }

        // Byte order puts '-' before '/'
        let keys: Vec<_> = registry
            .keys()
            .into_iter()
            .map(|k| k.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            keys,
            vec![
                PathBuf::from("a"),
                PathBuf::from("a-c"),
                PathBuf::from("a/x"),
                PathBuf::from("b")
            ]
        );

        let nearest = registry.nearest_ancestor(&root.join("a/x/y/z")).unwrap();
        assert_eq!(nearest.path(), root.join("a/x"));
        assert!(registry.nearest_ancestor(&root.join("c")).is_none());

        let removed = registry.remove(&root.join("b")).unwrap();
        assert!(!removed.is_closed());
        assert!(!registry.contains(&root.join("b")));
    }
}
