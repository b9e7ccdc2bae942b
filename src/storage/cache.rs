use crate::error::IndexResult;
use crate::indexing::{CacheData, FileTreeNode};
use crate::symbol::SymbolTree;
use crate::types::{Marker, Timestamp};

/// Per-path store for everything an index derives from a file.
///
/// Implementations are not internally synchronized: an index wraps its
/// cache in a single mutex and performs each path's group of updates
/// inside one critical section.
pub trait SymbolCache: Send {
    /// Restore persisted state into `data`. Returns true when something was
    /// restored; the caller still validates it before trusting it.
    fn init(&mut self, data: &mut CacheData) -> bool;

    /// Known paths in sorted order.
    fn file_list(&self) -> Vec<String>;

    fn contains(&self, path: &str) -> bool;

    fn add_file(&mut self, path: &str);

    fn remove_file(&mut self, path: &str);

    fn parsed(&self, path: &str) -> Option<SymbolTree>;

    fn set_parsed(&mut self, path: &str, tree: Option<SymbolTree>);

    fn preprocessed(&self, path: &str) -> Option<SymbolTree>;

    fn set_preprocessed(&mut self, path: &str, tree: Option<SymbolTree>);

    fn file_tree(&self, path: &str) -> Option<FileTreeNode>;

    fn set_file_tree(&mut self, path: &str, node: Option<FileTreeNode>);

    fn diagnostics(&self, path: &str) -> Vec<Marker>;

    fn set_diagnostics(&mut self, path: &str, markers: Vec<Marker>);

    fn last_modified(&self, path: &str) -> Option<Timestamp>;

    fn set_last_modified(&mut self, path: &str, timestamp: Option<Timestamp>);

    /// Flush to backing storage, if any.
    fn sync(&mut self, data: &CacheData) -> IndexResult<()>;

    fn clear(&mut self);

    /// Number of mutating calls so far.
    fn mutation_count(&self) -> u64 {
        0
    }

    /// Canonical dump of the contents, for comparing two caches.
    fn dump(&self) -> Option<String> {
        None
    }
}
