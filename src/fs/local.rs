//! `std::fs`-backed provider with an `ignore` walker for directory listings.

use dashmap::DashMap;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::time::UNIX_EPOCH;

use crate::fs::{
    FileChangeEvent, FileChangeListener, FileSystemProvider, ListenerRegistry, RecordedDiagnostic,
};
use crate::indexing::paths;
use crate::types::{MarkerKind, Timestamp};

pub struct LocalFileSystem {
    workspace_root: Option<String>,
    ignore_patterns: Vec<String>,
    diagnostics: DashMap<String, Vec<RecordedDiagnostic>>,
    listeners: ListenerRegistry,
}

/// Convert a native path into index form (`/` separators).
pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

impl LocalFileSystem {
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.map(|p| path_to_string(&p)),
            ignore_patterns: Vec::new(),
            diagnostics: DashMap::new(),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Native path for an index path, expanding `${workspace_loc}`.
    pub fn native_path(&self, path: &str) -> PathBuf {
        PathBuf::from(paths::expand_workspace_loc(path, self.workspace_root.as_deref()))
    }

    /// Diagnostics recorded for `path` since the last clear.
    pub fn diagnostics(&self, path: &str) -> Vec<RecordedDiagnostic> {
        self.diagnostics
            .get(path)
            .map(|d| d.value().clone())
            .unwrap_or_default()
    }

    /// Forward an event to registered listeners (used by the watcher).
    pub fn notify(&self, event: &FileChangeEvent) {
        self.listeners.dispatch(event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl FileSystemProvider for LocalFileSystem {
    fn exists(&self, path: &str) -> bool {
        self.native_path(path).exists()
    }

    fn is_dir(&self, path: &str) -> bool {
        self.native_path(path).is_dir()
    }

    fn last_modified(&self, path: &str) -> Option<Timestamp> {
        let modified = std::fs::metadata(self.native_path(path)).ok()?.modified().ok()?;
        let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
        Some(since_epoch.as_millis() as Timestamp)
    }

    fn open_stream(&self, path: &str) -> Option<Vec<u8>> {
        match std::fs::read(self.native_path(path)) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!("[fs] cannot read {path}: {e}");
                None
            }
        }
    }

    fn list_files(&self, dir: &str) -> Vec<String> {
        let root = self.native_path(dir);
        let mut builder = WalkBuilder::new(&root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false);

        let mut overrides = ignore::overrides::OverrideBuilder::new(&root);
        for pattern in &self.ignore_patterns {
            if let Err(e) = overrides.add(&format!("!{pattern}")) {
                tracing::warn!("[fs] invalid ignore pattern '{pattern}': {e}");
            }
        }
        match overrides.build() {
            Ok(overrides) => {
                builder.overrides(overrides);
            }
            Err(e) => tracing::warn!("[fs] ignore patterns rejected: {e}"),
        }

        let prefix = path_to_string(&root);
        let mut files: Vec<String> = builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| {
                // Keep the caller's spelling of `dir` (it may be workspace-relative).
                let native = path_to_string(entry.path());
                match native.strip_prefix(&prefix) {
                    Some(rest) => paths::normalize(&format!("{dir}/{rest}")),
                    None => native,
                }
            })
            .collect();
        files.sort();
        files
    }

    fn add_diagnostic(&self, path: &str, kind: MarkerKind, line: u32, message: &str) {
        tracing::debug!("[fs] {path}:{line}: {kind:?}: {message}");
        self.diagnostics
            .entry(path.to_string())
            .or_default()
            .push(RecordedDiagnostic {
                kind,
                line,
                message: message.to_string(),
            });
    }

    fn clear_diagnostics(&self, path: &str) {
        self.diagnostics.remove(path);
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_and_stat() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("top.sv");
        fs::write(&file, "module top; endmodule\n").unwrap();

        let provider = LocalFileSystem::new(None);
        let path = path_to_string(&file);
        assert!(provider.exists(&path));
        assert!(!provider.is_dir(&path));
        assert!(provider.last_modified(&path).is_some());
        assert_eq!(provider.open_stream(&path).unwrap(), b"module top; endmodule\n");

        let missing = format!("{path}.bak");
        assert!(!provider.exists(&missing));
        assert!(provider.last_modified(&missing).is_none());
        assert!(provider.open_stream(&missing).is_none());
    }

    #[test]
    fn test_workspace_loc_expansion() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("proj")).unwrap();
        fs::write(temp_dir.path().join("proj/a.sv"), "").unwrap();

        let provider = LocalFileSystem::new(Some(temp_dir.path().to_path_buf()));
        assert!(provider.exists("${workspace_loc}/proj/a.sv"));
        assert_eq!(
            provider.list_files("${workspace_loc}/proj"),
            vec!["${workspace_loc}/proj/a.sv".to_string()]
        );
    }

    #[test]
    fn test_list_files_honours_ignore_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("rtl")).unwrap();
        fs::create_dir_all(root.join("work")).unwrap();
        fs::write(root.join("rtl/top.sv"), "").unwrap();
        fs::write(root.join("work/compiled.sv"), "").unwrap();

        let provider = LocalFileSystem::new(None).with_ignore_patterns(vec!["work/".to_string()]);
        let files = provider.list_files(&path_to_string(root));
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("rtl/top.sv"));
    }

    #[test]
    fn test_diagnostics_are_recorded_and_cleared() {
        let provider = LocalFileSystem::new(None);
        provider.add_diagnostic("/p/a.sv", MarkerKind::Error, 3, "bad");
        assert_eq!(provider.diagnostics("/p/a.sv").len(), 1);
        provider.clear_diagnostics("/p/a.sv");
        assert!(provider.diagnostics("/p/a.sv").is_empty());
    }
}
