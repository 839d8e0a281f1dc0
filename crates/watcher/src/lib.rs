//! Depth-bounded recursive file system watching
//!
//! The platform watchers used here only observe a single directory. This
//! crate simulates recursion on top of them:
//! - One native watch per directory, registered up to a depth budget
//! - A single background dispatcher that sweeps every watch in path order
//! - Automatic registration of new subdirectories within the budget
//! - Retraction of watches when a watched directory is deleted
//! - A per-path log of every observed event kind

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod event_log;
pub mod native;
pub mod paths;
pub mod registrar;
pub mod registry;
pub mod service;
mod state;

// Re-exports
pub use config::WatchConfig;
pub use dispatcher::{DispatcherState, SweepStats};
pub use error::{Result, WatchError};
pub use event::{EventCallback, EventKindSet, WatchEvent, WatchEventKind};
pub use event_log::EventLog;
pub use native::{NativeEvent, NativeWatch, NotifyFactory, WatchFactory};
pub use paths::{closest_existing_ancestor, is_sub_path};
pub use registrar::WalkStats;
pub use registry::{WatchRegistration, WatchRegistry};
pub use service::TreeWatcher;
