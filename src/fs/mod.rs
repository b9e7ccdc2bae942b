//! File system access used by indexes.
//!
//! Indexes never touch `std::fs` directly. Everything goes through a
//! [`FileSystemProvider`], which also receives the diagnostics an index
//! produces and delivers change notifications back to it.

pub mod events;
pub mod local;
pub mod memory;

pub use events::{FileChangeEvent, FileChangeKind, FileChangeListener, ListenerRegistry};
pub use local::{LocalFileSystem, path_to_string};
pub use memory::MemoryFileSystem;

use std::sync::Weak;

use crate::types::{MarkerKind, Timestamp};

/// A diagnostic as handed to a provider's sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDiagnostic {
    pub kind: MarkerKind,
    pub line: u32,
    pub message: String,
}

pub trait FileSystemProvider: Send + Sync {
    /// True for existing files and directories.
    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    fn last_modified(&self, path: &str) -> Option<Timestamp>;

    /// Whole-file contents, or `None` when the file cannot be read.
    fn open_stream(&self, path: &str) -> Option<Vec<u8>>;

    /// Files below `dir`, recursively, in a stable order.
    fn list_files(&self, dir: &str) -> Vec<String>;

    fn add_diagnostic(&self, path: &str, kind: MarkerKind, line: u32, message: &str);

    fn clear_diagnostics(&self, path: &str);

    fn add_change_listener(&self, listener: Weak<dyn FileChangeListener>);

    fn remove_change_listener(&self, listener: &Weak<dyn FileChangeListener>);

    /// Root substituted for `${workspace_loc}`.
    fn workspace_root(&self) -> Option<String> {
        None
    }
}
