//! Per-path record of observed event kinds

use crate::event::WatchEventKind;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Thread-safe map from changed path to the ordered kinds observed on it
///
/// Queues are created on first event, keep duplicates and grow without bound
/// until `clear`.
#[derive(Debug, Default)]
pub struct EventLog {
    queues: DashMap<PathBuf, Vec<WatchEventKind>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `kind` to the queue for `path`
    pub fn record(&self, path: &Path, kind: WatchEventKind) {
        self.queues.entry(path.to_path_buf()).or_default().push(kind);
    }

    /// Kinds observed on `path`, oldest first
    pub fn events_for(&self, path: &Path) -> Vec<WatchEventKind> {
        self.queues
            .get(path)
            .map(|queue| queue.value().clone())
            .unwrap_or_default()
    }

    /// Read-only copy of every queue
    pub fn snapshot(&self) -> HashMap<PathBuf, Vec<WatchEventKind>> {
        self.queues
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Drop every queue
    pub fn clear(&self) {
        self.queues.clear();
    }

    /// Number of paths with at least one event
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
