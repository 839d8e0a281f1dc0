//! Event kinds, kind sets and the callback type

use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Most kinds a single registration may subscribe to
pub const MAX_EVENT_KINDS: usize = 4;

/// Type of file system event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    /// Entry created (or renamed into the directory)
    Created,
    /// Entry deleted (or renamed out of the directory)
    Deleted,
    /// Entry modified
    Modified,
    /// The platform dropped events; delivered like any other kind
    Overflow,
}

impl WatchEventKind {
    /// All kinds, in declaration order
    pub const ALL: [WatchEventKind; 4] = [
        WatchEventKind::Created,
        WatchEventKind::Deleted,
        WatchEventKind::Modified,
        WatchEventKind::Overflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchEventKind::Created => "created",
            WatchEventKind::Deleted => "deleted",
            WatchEventKind::Modified => "modified",
            WatchEventKind::Overflow => "overflow",
        }
    }

    fn bit(self) -> u8 {
        match self {
            WatchEventKind::Created => 1,
            WatchEventKind::Deleted => 1 << 1,
            WatchEventKind::Modified => 1 << 2,
            WatchEventKind::Overflow => 1 << 3,
        }
    }
}

impl fmt::Display for WatchEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatchEventKind {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "create" => Ok(WatchEventKind::Created),
            "deleted" | "delete" => Ok(WatchEventKind::Deleted),
            "modified" | "modify" => Ok(WatchEventKind::Modified),
            "overflow" => Ok(WatchEventKind::Overflow),
            other => Err(WatchError::InvalidArgument(format!(
                "unknown event kind '{}'",
                other
            ))),
        }
    }
}

/// Immutable set of event kinds a registration reacts to
///
/// Holds between one and four kinds. Requests with more than four entries are
/// rejected rather than truncated, even when they contain duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKindSet {
    bits: u8,
}

impl EventKindSet {
    /// Build a set from a caller-supplied list
    pub fn from_slice(kinds: &[WatchEventKind]) -> Result<Self> {
        if kinds.is_empty() {
            return Err(WatchError::InvalidArgument(
                "at least one event kind must be watched".to_string(),
            ));
        }
        if kinds.len() > MAX_EVENT_KINDS {
            return Err(WatchError::InvalidArgument(format!(
                "at most {} event kinds can be watched, got {:?}",
                MAX_EVENT_KINDS, kinds
            )));
        }

        let bits = kinds.iter().fold(0u8, |acc, kind| acc | kind.bit());
        Ok(Self { bits })
    }

    /// Set containing every kind
    pub fn all() -> Self {
        Self { bits: 0b1111 }
    }

    pub fn contains(&self, kind: WatchEventKind) -> bool {
        self.bits & kind.bit() != 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = WatchEventKind> + '_ {
        WatchEventKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

/// An event delivered to callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened
    pub kind: WatchEventKind,
    /// Changed entry, relative to the directory whose watch reported it
    pub context: PathBuf,
}

/// Handler invoked on the dispatcher thread for every qualifying event
///
/// Receives the resolved absolute path of the changed entry. Handlers run
/// in-line with the sweep and must return quickly.
pub type EventCallback = Arc<dyn Fn(&Path, &WatchEvent) + Send + Sync>;
