//! A set of indexes that resolve includes through each other.

use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

use crate::indexing::decl_cache::{DeclCacheEntry, DeclMatcher};
use crate::indexing::index::Index;
use crate::indexing::references::{RefCacheEntry, RefMatcher};
use crate::indexing::state::IndexState;
use crate::symbol::SymbolTree;

/// Global fallback for includes an index cannot resolve by itself.
pub trait IncludeFileProvider: Send + Sync {
    /// Path of a file matching `literal` owned by an index other than the
    /// one whose base location is `requester`.
    fn find_include(&self, literal: &str, requester: &str) -> Option<String>;
}

/// Owns several indexes and acts as their shared include provider.
///
/// Members hold the collection weakly, so dropping the collection never
/// leaks through a member.
#[derive(Default)]
pub struct IndexCollection {
    indexes: RwLock<Vec<Arc<Index>>>,
}

impl IndexCollection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(self: &Arc<Self>, index: Arc<Index>) {
        let provider: Arc<dyn IncludeFileProvider> = self.clone();
        let weak: Weak<dyn IncludeFileProvider> = Arc::downgrade(&provider);
        index.set_include_provider(weak);
        self.indexes.write().push(index);
    }

    pub fn remove(&self, base_location: &str) -> Option<Arc<Index>> {
        let mut indexes = self.indexes.write();
        let pos = indexes.iter().position(|i| i.base_location() == base_location)?;
        Some(indexes.remove(pos))
    }

    pub fn indexes(&self) -> Vec<Arc<Index>> {
        self.indexes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.indexes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.read().is_empty()
    }

    /// Advance every member; returns the lowest state reached.
    pub fn ensure_state(&self, target: IndexState, cancel: &CancellationToken) -> IndexState {
        self.indexes()
            .iter()
            .map(|index| index.ensure_state(target, cancel))
            .min()
            .unwrap_or(target)
    }

    pub fn rebuild_all(&self) {
        for index in self.indexes() {
            index.rebuild();
        }
    }

    pub fn find_global_scope_decl(&self, name: &str, matcher: &dyn DeclMatcher) -> Vec<DeclCacheEntry> {
        self.indexes()
            .iter()
            .flat_map(|index| index.find_global_scope_decl(name, matcher))
            .collect()
    }

    pub fn find_references(&self, name: &str, matcher: &dyn RefMatcher) -> Vec<RefCacheEntry> {
        self.indexes()
            .iter()
            .flat_map(|index| index.find_references(name, matcher))
            .collect()
    }

    /// Parsed tree of `path` from the first member that tracks it.
    pub fn find_file(&self, path: &str) -> Option<SymbolTree> {
        self.indexes().iter().find_map(|index| index.find_file(path))
    }

    /// Union of every member's file list, sorted.
    pub fn file_list(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .indexes()
            .iter()
            .flat_map(|index| index.file_list())
            .collect();
        files.sort();
        files.dedup();
        files
    }

    pub fn dispose(&self) {
        for index in self.indexes.write().drain(..) {
            index.dispose();
        }
    }
}

impl IncludeFileProvider for IndexCollection {
    fn find_include(&self, literal: &str, requester: &str) -> Option<String> {
        self.indexes()
            .iter()
            .filter(|index| index.base_location() != requester)
            .find_map(|index| index.find_local_include(literal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FileSystemProvider, MemoryFileSystem};
    use crate::indexing::decl_cache::NameMatch;
    use crate::indexing::discovery::ExplicitRoots;

    fn index(fs: &Arc<MemoryFileSystem>, base: &str, roots: &[&str]) -> Arc<Index> {
        let provider: Arc<dyn FileSystemProvider> = fs.clone();
        Index::builder(base, provider)
            .discovery(Box::new(ExplicitRoots::new(roots.iter().copied())))
            .build()
    }

    #[test]
    fn test_include_falls_back_to_sibling_index() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.write_file("/vip/uvm_macros.svh", "`define uvm_info(a) $display(a)\n");
        fs.write_file("/vip/vip.sv", "`include \"uvm_macros.svh\"\n");
        fs.write_file("/proj/top.sv", "`include \"uvm_macros.svh\"\nmodule top; endmodule\n");

        let collection = IndexCollection::new();
        let vip = index(&fs, "/vip", &["vip.sv"]);
        let proj = index(&fs, "/proj", &["top.sv"]);
        collection.add(vip.clone());
        collection.add(proj.clone());

        vip.ensure_parsed();
        let node = proj.find_file_tree("/proj/top.sv").unwrap();
        assert_eq!(
            node.resolved_includes().collect::<Vec<_>>(),
            vec!["/vip/uvm_macros.svh"]
        );
        assert!(proj.missing_includes().is_empty());
        assert!(!proj.file_list().contains(&"/vip/uvm_macros.svh".to_string()));

        let tops = collection.find_global_scope_decl("top", &NameMatch::Exact);
        assert_eq!(tops.len(), 1);
        assert_eq!(tops[0].index, "/proj");
        assert!(collection.find_file("/vip/vip.sv").is_some());
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_dropped_collection_is_not_consulted() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.write_file("/vip/defs.svh", "");
        fs.write_file("/proj/top.sv", "`include \"defs.svh\"\n");
        let vip = index(&fs, "/vip", &["defs.svh"]);
        let proj = index(&fs, "/proj", &["top.sv"]);
        {
            let collection = IndexCollection::new();
            collection.add(vip.clone());
            collection.add(proj.clone());
            assert!(collection.remove("/vip").is_some());
            assert!(collection.remove("/vip").is_none());
        }
        assert_eq!(proj.missing_includes(), vec!["defs.svh"]);
    }
}
