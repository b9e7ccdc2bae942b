//! Which directories are under watch, and what a new desired set changes.
//!
//! Watches are non-recursive: an index names the exact directories it cares
//! about, so large trees that merely contain a few sources stay cheap.

use std::collections::BTreeSet;

/// Directories to start and stop watching to reach a desired set.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WatchDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl WatchDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PathRegistry {
    watched: BTreeSet<String>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the watched set, returning the difference.
    pub fn set_desired(&mut self, desired: impl IntoIterator<Item = String>) -> WatchDiff {
        let desired: BTreeSet<String> = desired.into_iter().collect();
        let diff = WatchDiff {
            added: desired.difference(&self.watched).cloned().collect(),
            removed: self.watched.difference(&desired).cloned().collect(),
        };
        self.watched = desired;
        diff
    }

    /// Drop a directory whose watch could not be installed.
    pub fn forget(&mut self, dir: &str) {
        self.watched.remove(dir);
    }

    pub fn contains(&self, dir: &str) -> bool {
        self.watched.contains(dir)
    }

    pub fn dirs(&self) -> impl Iterator<Item = &str> {
        self.watched.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }
}
