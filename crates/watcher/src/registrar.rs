//! Depth-bounded tree registration
//!
//! Walks a directory tree depth-first and registers one native watch per
//! directory whose remaining budget is non-negative. Both the initial
//! `register` call and the dispatcher's propagation go through
//! [`TreeRegistrar`], which only depends on the [`DirectoryRegistrar`]
//! primitive.

use crate::error::{Result, WatchError};
use crate::event::{EventCallback, EventKindSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Registers a watch for exactly one directory
pub trait DirectoryRegistrar {
    /// Register `dir` with the given budget unless it is already registered
    ///
    /// Returns `Ok(true)` when a new registration was inserted and `Ok(false)`
    /// when the path was already present.
    fn register_directory(
        &self,
        dir: &Path,
        remaining_depth: usize,
        kinds: EventKindSet,
        callback: &EventCallback,
    ) -> Result<bool>;
}

/// Visit counters for one tree walk
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    /// Directories visited and registered (or already registered)
    pub directories: u64,
    /// Non-directory entries visited
    pub files: u64,
    /// Entries that vanished, became unreadable or could not be watched
    pub failed: u64,
}

/// Walks a tree and registers every directory within the depth budget
pub struct TreeRegistrar<'a> {
    registrar: &'a dyn DirectoryRegistrar,
    follow_links: bool,
}

impl<'a> TreeRegistrar<'a> {
    pub fn new(registrar: &'a dyn DirectoryRegistrar, follow_links: bool) -> Self {
        Self {
            registrar,
            follow_links,
        }
    }

    /// Register `root` and its subdirectories down to `max_depth` levels
    ///
    /// `root` must be absolute. Each directory receives the budget
    /// `max_depth - depth_below_root`. Directories are registered both when
    /// first entered and again once their subtree has been walked, so a
    /// directory that appeared mid-walk still ends up watched.
    pub fn register_tree(
        &self,
        root: &Path,
        max_depth: usize,
        kinds: EventKindSet,
        callback: &EventCallback,
    ) -> Result<WalkStats> {
        if !root.exists() {
            return Err(WatchError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(WatchError::NotADirectory(root.to_path_buf()));
        }

        let mut stats = WalkStats::default();
        // Directories entered but not yet finished, with their depth
        let mut open_dirs: Vec<(PathBuf, usize)> = Vec::new();

        let mut walker = WalkDir::new(root)
            .follow_links(self.follow_links)
            .max_depth(max_depth)
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("Failed to visit {:?}: {}", err.path(), err);
                    stats.failed += 1;
                    continue;
                }
            };

            // An entry at depth d means every open directory at depth >= d is done
            let depth = entry.depth();
            while open_dirs.last().is_some_and(|(_, open)| *open >= depth) {
                if let Some((dir, open)) = open_dirs.pop() {
                    self.post_visit(&dir, max_depth - open, kinds, callback);
                }
            }

            if !entry.file_type().is_dir() {
                stats.files += 1;
                continue;
            }

            let Some(budget) = max_depth.checked_sub(depth) else {
                debug!(
                    "Skipping registration of {} past max depth {}",
                    entry.path().display(),
                    max_depth
                );
                walker.skip_current_dir();
                continue;
            };

            match self.registrar.register_directory(entry.path(), budget, kinds, callback) {
                Ok(_) => {
                    stats.directories += 1;
                    open_dirs.push((entry.into_path(), depth));
                }
                Err(err) => {
                    debug!("Failed to register {}: {}", entry.path().display(), err);
                    stats.failed += 1;
                    walker.skip_current_dir();
                }
            }
        }

        while let Some((dir, open)) = open_dirs.pop() {
            self.post_visit(&dir, max_depth - open, kinds, callback);
        }

        info!(
            "Registered tree {}: {} directories, {} files, {} failed visits",
            root.display(),
            stats.directories,
            stats.files,
            stats.failed
        );
        Ok(stats)
    }

    fn post_visit(&self, dir: &Path, budget: usize, kinds: EventKindSet, callback: &EventCallback) {
        if let Err(err) = self.registrar.register_directory(dir, budget, kinds, callback) {
            debug!("Post-visit registration of {} failed: {}", dir.display(), err);
        }
    }
}
