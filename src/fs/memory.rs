//! In-memory provider for tests and embedding.
//!
//! Timestamps come from a counter that advances on every write, so a
//! rewrite is always observable. Writes and removals fire change events
//! unless events are switched off.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::fs::{
    FileChangeEvent, FileChangeKind, FileChangeListener, FileSystemProvider, ListenerRegistry,
    RecordedDiagnostic,
};
use crate::indexing::paths;
use crate::types::{MarkerKind, Timestamp};

#[derive(Debug, Clone)]
struct MemFile {
    content: Vec<u8>,
    modified: Timestamp,
}

pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<String, MemFile>>,
    clock: AtomicU64,
    diagnostics: Mutex<HashMap<String, Vec<RecordedDiagnostic>>>,
    listeners: ListenerRegistry,
    events_enabled: AtomicBool,
    workspace_root: Option<String>,
    opens: AtomicUsize,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
            clock: AtomicU64::new(1),
            diagnostics: Mutex::new(HashMap::new()),
            listeners: ListenerRegistry::new(),
            events_enabled: AtomicBool::new(true),
            workspace_root: None,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<String>) -> Self {
        self.workspace_root = Some(paths::normalize(&root.into()));
        self
    }

    fn key(&self, path: &str) -> String {
        paths::normalize(&paths::expand_workspace_loc(path, self.workspace_root.as_deref()))
    }

    pub fn set_events_enabled(&self, enabled: bool) {
        self.events_enabled.store(enabled, Ordering::SeqCst);
    }

    fn fire(&self, kind: FileChangeKind, path: &str) {
        if self.events_enabled.load(Ordering::SeqCst) {
            self.listeners.dispatch(&FileChangeEvent::new(kind, path));
        }
    }

    /// Create or overwrite a file, firing `Added` or `Modified`.
    pub fn write_file(&self, path: &str, content: impl Into<Vec<u8>>) {
        let key = self.key(path);
        let modified = self.clock.fetch_add(1, Ordering::SeqCst);
        let existed = self
            .files
            .write()
            .insert(
                key.clone(),
                MemFile {
                    content: content.into(),
                    modified,
                },
            )
            .is_some();
        let kind = if existed {
            FileChangeKind::Modified
        } else {
            FileChangeKind::Added
        };
        self.fire(kind, &key);
    }

    /// Delete a file, firing `Removed`. Returns false when it did not exist.
    pub fn remove_file(&self, path: &str) -> bool {
        let key = self.key(path);
        let removed = self.files.write().remove(&key).is_some();
        if removed {
            self.fire(FileChangeKind::Removed, &key);
        }
        removed
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Number of successful `open_stream` calls.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn diagnostics(&self, path: &str) -> Vec<RecordedDiagnostic> {
        self.diagnostics
            .lock()
            .get(&self.key(path))
            .cloned()
            .unwrap_or_default()
    }

    /// Every path that currently has diagnostics.
    pub fn diagnostic_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.diagnostics.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl FileSystemProvider for MemoryFileSystem {
    fn exists(&self, path: &str) -> bool {
        let key = self.key(path);
        self.files.read().contains_key(&key) || self.is_dir(&key)
    }

    fn is_dir(&self, path: &str) -> bool {
        let key = self.key(path);
        let prefix = if key.ends_with('/') { key } else { format!("{key}/") };
        self.files
            .read()
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    fn last_modified(&self, path: &str) -> Option<Timestamp> {
        self.files.read().get(&self.key(path)).map(|f| f.modified)
    }

    fn open_stream(&self, path: &str) -> Option<Vec<u8>> {
        let content = self.files.read().get(&self.key(path)).map(|f| f.content.clone())?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Some(content)
    }

    fn list_files(&self, dir: &str) -> Vec<String> {
        let key = self.key(dir);
        let prefix = if key.ends_with('/') { key } else { format!("{key}/") };
        self.files
            .read()
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn add_diagnostic(&self, path: &str, kind: MarkerKind, line: u32, message: &str) {
        self.diagnostics
            .lock()
            .entry(self.key(path))
            .or_default()
            .push(RecordedDiagnostic {
                kind,
                line,
                message: message.to_string(),
            });
    }

    fn clear_diagnostics(&self, path: &str) {
        self.diagnostics.lock().remove(&self.key(path));
    }

    fn add_change_listener(&self, listener: Weak<dyn FileChangeListener>) {
        self.listeners.add(listener);
    }

    fn remove_change_listener(&self, listener: &Weak<dyn FileChangeListener>) {
        self.listeners.remove(listener);
    }

    fn workspace_root(&self) -> Option<String> {
        self.workspace_root.clone()
    }
}
