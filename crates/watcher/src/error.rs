//! Error types for watch registration

use std::path::PathBuf;

/// Result type for watcher operations
pub type Result<T, E = WatchError> = std::result::Result<T, E>;

/// Errors surfaced by registration, deregistration and native handles
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// A required argument was empty or out of range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The path does not exist
    #[error("path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    /// The path exists but is not a directory
    #[error("path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The native handle was already closed
    #[error("watch handle for {} is closed", .0.display())]
    HandleClosed(PathBuf),

    /// The platform watcher reported a failure
    #[error("native watch failure: {0}")]
    Native(#[from] notify::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The dispatcher thread could not be started
    #[error("failed to spawn dispatcher thread: {0}")]
    DispatcherSpawn(#[source] std::io::Error),
}
