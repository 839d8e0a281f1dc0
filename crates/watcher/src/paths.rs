//! Path relationship helpers

use crate::error::{Result, WatchError};
use std::path::{Component, Path, PathBuf};

/// Absolute, lexically normalized form of `path`
///
/// Relative paths are resolved against the current directory. `.` segments are
/// dropped and `..` segments pop their parent. Symbolic links are not resolved.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(WatchError::InvalidArgument("path must not be empty".to_string()));
    }

    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Check if `candidate` is `parent` itself or lies beneath it
///
/// Fails if `parent` exists and is not a directory.
pub fn is_sub_path(parent: &Path, candidate: &Path) -> Result<bool> {
    if parent.exists() && !parent.is_dir() {
        return Err(WatchError::NotADirectory(parent.to_path_buf()));
    }

    let parent = absolute(parent)?;
    let candidate = absolute(candidate)?;
    Ok(is_within(&parent, &candidate))
}

/// Lexical containment check on already-absolute paths
pub(crate) fn is_within(parent: &Path, candidate: &Path) -> bool {
    candidate.starts_with(parent)
}

/// Nearest existing entry at or above `path`
///
/// Returns `None` only when not even the file system root exists.
pub fn closest_existing_ancestor(path: &Path) -> Result<Option<PathBuf>> {
    closest_matching_ancestor(path, |p| p.exists())
}

pub(crate) fn closest_matching_ancestor(
    path: &Path,
    exists: impl Fn(&Path) -> bool,
) -> Result<Option<PathBuf>> {
    let start = absolute(path)?;
    Ok(start.ancestors().find(|p| exists(p)).map(Path::to_path_buf))
}
