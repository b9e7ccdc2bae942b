use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::IndexResult;
use crate::indexing::{CacheData, FileTreeNode};
use crate::storage::SymbolCache;
use crate::storage::persistence::SnapshotStore;
use crate::symbol::SymbolTree;
use crate::types::{Marker, Timestamp};

/// Everything cached for one path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocessed: Option<SymbolTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<SymbolTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_tree: Option<FileTreeNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Marker>,
    #[serde(default)]
    pub last_modified: Option<Timestamp>,
}

/// Map-backed cache, optionally persisted as a JSON snapshot.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: BTreeMap<String, CacheEntry>,
    mutations: u64,
    snapshot: Option<SnapshotStore>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache that restores from and flushes to `dir/snapshot.json`.
    pub fn with_snapshot(dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshot: Some(SnapshotStore::new(dir)),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, path: &str) -> &mut CacheEntry {
        self.mutations += 1;
        self.entries.entry(path.to_string()).or_default()
    }
}

impl SymbolCache for MemoryCache {
    fn init(&mut self, data: &mut CacheData) -> bool {
        let Some(store) = &self.snapshot else {
            return false;
        };
        match store.load() {
            Ok(Some(snapshot)) => {
                tracing::debug!(
                    "[cache] restored {} entries from {}",
                    snapshot.entries.len(),
                    store.path().display()
                );
                self.entries = snapshot.entries;
                *data = snapshot.data;
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("[cache] discarding snapshot: {e}");
                false
            }
        }
    }

    fn file_list(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    fn add_file(&mut self, path: &str) {
        if !self.entries.contains_key(path) {
            self.entry_mut(path);
        }
    }

    fn remove_file(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.mutations += 1;
        }
    }

    fn parsed(&self, path: &str) -> Option<SymbolTree> {
        self.entries.get(path)?.parsed.clone()
    }

    fn set_parsed(&mut self, path: &str, tree: Option<SymbolTree>) {
        self.entry_mut(path).parsed = tree;
    }

    fn preprocessed(&self, path: &str) -> Option<SymbolTree> {
        self.entries.get(path)?.preprocessed.clone()
    }

    fn set_preprocessed(&mut self, path: &str, tree: Option<SymbolTree>) {
        self.entry_mut(path).preprocessed = tree;
    }

    fn file_tree(&self, path: &str) -> Option<FileTreeNode> {
        self.entries.get(path)?.file_tree.clone()
    }

    fn set_file_tree(&mut self, path: &str, node: Option<FileTreeNode>) {
        self.entry_mut(path).file_tree = node;
    }

    fn diagnostics(&self, path: &str) -> Vec<Marker> {
        self.entries
            .get(path)
            .map(|e| e.diagnostics.clone())
            .unwrap_or_default()
    }

    fn set_diagnostics(&mut self, path: &str, markers: Vec<Marker>) {
        self.entry_mut(path).diagnostics = markers;
    }

    fn last_modified(&self, path: &str) -> Option<Timestamp> {
        self.entries.get(path)?.last_modified
    }

    fn set_last_modified(&mut self, path: &str, timestamp: Option<Timestamp>) {
        self.entry_mut(path).last_modified = timestamp;
    }

    fn sync(&mut self, data: &CacheData) -> IndexResult<()> {
        match &self.snapshot {
            Some(store) => store.save(&self.entries, data),
            None => Ok(()),
        }
    }

    fn clear(&mut self) {
        self.mutations += 1;
        self.entries.clear();
    }

    fn mutation_count(&self) -> u64 {
        self.mutations
    }

    fn dump(&self) -> Option<String> {
        serde_json::to_string(&self.entries).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarkerCategory;
    use tempfile::TempDir;

    #[test]
    fn test_entries_and_mutations() {
        let mut cache = MemoryCache::new();
        cache.add_file("/p/b.sv");
        cache.add_file("/p/a.sv");
        cache.add_file("/p/a.sv");
        assert_eq!(cache.file_list(), vec!["/p/a.sv", "/p/b.sv"]);
        assert_eq!(cache.mutation_count(), 2);

        cache.set_diagnostics("/p/a.sv", vec![Marker::error(MarkerCategory::ParseError, "x")]);
        cache.set_last_modified("/p/a.sv", Some(7));
        assert_eq!(cache.diagnostics("/p/a.sv").len(), 1);
        assert_eq!(cache.last_modified("/p/a.sv"), Some(7));
        assert!(cache.parsed("/p/a.sv").is_none());
        assert_eq!(cache.mutation_count(), 4);

        cache.remove_file("/p/b.sv");
        cache.remove_file("/p/b.sv");
        assert_eq!(cache.mutation_count(), 5);
        assert!(!cache.contains("/p/b.sv"));
    }

    #[test]
    fn test_dump_is_order_independent() {
        let mut a = MemoryCache::new();
        a.set_last_modified("/p/x.sv", Some(1));
        a.set_last_modified("/p/y.sv", Some(2));

        let mut b = MemoryCache::new();
        b.set_last_modified("/p/y.sv", Some(2));
        b.set_last_modified("/p/x.sv", Some(1));

        assert_eq!(a.dump(), b.dump());
    }

    #[test]
    fn test_snapshot_round_trip_through_sync_and_init() {
        let temp_dir = TempDir::new().unwrap();
        let mut data = CacheData::new("/p");
        data.root_files.push("/p/top.sv".into());

        let mut cache = MemoryCache::with_snapshot(temp_dir.path());
        cache.set_last_modified("/p/top.sv", Some(3));
        cache.sync(&data).unwrap();

        let mut restored_data = CacheData::new("/p");
        let mut restored = MemoryCache::with_snapshot(temp_dir.path());
        assert!(restored.init(&mut restored_data));
        assert_eq!(restored.last_modified("/p/top.sv"), Some(3));
        assert_eq!(restored_data.root_files, vec!["/p/top.sv"]);

        let mut plain = MemoryCache::new();
        assert!(!plain.init(&mut restored_data));
    }
}
