//! Native single-directory watch handles
//!
//! A native watch observes exactly one directory and never recurses. Events
//! are buffered by the backend and drained without blocking by `poll`, which
//! also re-arms the handle for further events.

use crate::error::{Result, WatchError};
use crate::event::WatchEventKind;
use crossbeam_channel::{Receiver, TryRecvError};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// A raw event reported by a native handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEvent {
    pub kind: WatchEventKind,
    /// Entry name relative to the watched directory
    pub name: PathBuf,
}

impl NativeEvent {
    pub fn new(kind: WatchEventKind, name: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Handle bound to a single directory
pub trait NativeWatch: Send {
    /// Drain every pending event without blocking
    fn poll(&mut self) -> Result<Vec<NativeEvent>>;

    /// Release the handle. Later polls fail with `HandleClosed`.
    fn close(&mut self);
}

/// Opens native handles
pub trait WatchFactory: Send + Sync {
    fn open(&self, dir: &Path) -> Result<Box<dyn NativeWatch>>;
}

/// Factory backed by the platform's recommended `notify` watcher
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyFactory;

impl WatchFactory for NotifyFactory {
    fn open(&self, dir: &Path) -> Result<Box<dyn NativeWatch>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver is gone once the handle closes
            let _ = tx.send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Box::new(NotifyWatch {
            dir: WatchedDir {
                path: dir.to_path_buf(),
                canonical: std::fs::canonicalize(dir).ok(),
            },
            watcher: Some(watcher),
            rx,
            pending: Vec::new(),
        }))
    }
}

/// The watched directory as opened and as the backend may report it
struct WatchedDir {
    path: PathBuf,
    canonical: Option<PathBuf>,
}

impl WatchedDir {
    /// Name of `path` relative to this directory
    ///
    /// `None` for the directory itself; its parent's watch reports those.
    fn relative_name(&self, path: &Path) -> Option<PathBuf> {
        let name = match path.strip_prefix(&self.path) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => match self.canonical.as_deref().map(|c| path.strip_prefix(c)) {
                Some(Ok(rel)) => rel.to_path_buf(),
                // Some backends report paths through another alias
                _ => {
                    let parent = path.parent()?.file_name()?;
                    if Some(parent) != self.path.file_name() {
                        return None;
                    }
                    PathBuf::from(path.file_name()?)
                }
            },
        };
        if name.as_os_str().is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

struct NotifyWatch {
    dir: WatchedDir,
    watcher: Option<RecommendedWatcher>,
    rx: Receiver<notify::Result<Event>>,
    /// Events drained before a backend error, returned by the next poll
    pending: Vec<NativeEvent>,
}

impl NativeWatch for NotifyWatch {
    fn poll(&mut self) -> Result<Vec<NativeEvent>> {
        if self.watcher.is_none() {
            return Err(WatchError::HandleClosed(self.dir.path.clone()));
        }

        let mut events = std::mem::take(&mut self.pending);
        loop {
            match self.rx.try_recv() {
                Ok(Ok(event)) => events.extend(convert_event(&self.dir, event)),
                Ok(Err(err)) => {
                    self.pending = events;
                    return Err(err.into());
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(events)
    }

    fn close(&mut self) {
        // Dropping the watcher removes the platform watch
        self.watcher.take();
    }
}

/// Translate a notify event into zero or more native events for `dir`
fn convert_event(dir: &WatchedDir, event: Event) -> Vec<NativeEvent> {
    if event.need_rescan() {
        return vec![NativeEvent::new(WatchEventKind::Overflow, PathBuf::new())];
    }

    let mut converted = Vec::new();
    match event.kind {
        EventKind::Create(_) => {
            push_all(dir, &event.paths, WatchEventKind::Created, &mut converted);
        }
        EventKind::Remove(_) => {
            push_all(dir, &event.paths, WatchEventKind::Deleted, &mut converted);
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => {
                push_all(dir, &event.paths, WatchEventKind::Deleted, &mut converted)
            }
            RenameMode::To => {
                push_all(dir, &event.paths, WatchEventKind::Created, &mut converted)
            }
            RenameMode::Both => {
                if let Some(from) = event.paths.first() {
                    push_one(dir, from, WatchEventKind::Deleted, &mut converted);
                }
                if let Some(to) = event.paths.get(1) {
                    push_one(dir, to, WatchEventKind::Created, &mut converted);
                }
            }
            RenameMode::Any | RenameMode::Other => {
                for path in &event.paths {
                    let kind = if path.exists() {
                        WatchEventKind::Created
                    } else {
                        WatchEventKind::Deleted
                    };
                    push_one(dir, path, kind, &mut converted);
                }
            }
        },
        EventKind::Modify(_) => {
            push_all(dir, &event.paths, WatchEventKind::Modified, &mut converted);
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }
    converted
}

fn push_all(dir: &WatchedDir, paths: &[PathBuf], kind: WatchEventKind, out: &mut Vec<NativeEvent>) {
    for path in paths {
        push_one(dir, path, kind, out);
    }
}

fn push_one(dir: &WatchedDir, path: &Path, kind: WatchEventKind, out: &mut Vec<NativeEvent>) {
    if let Some(name) = dir.relative_name(path) {
        out.push(NativeEvent::new(kind, name));
    }
}
