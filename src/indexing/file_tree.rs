use serde::{Deserialize, Serialize};

use crate::symbol::SymbolTree;
use crate::types::Location;

/// One include directive as resolved during file tree construction.
///
/// Edges name their target by path; the target node is looked up in the
/// cache on demand. An unresolved edge keeps the literal include string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeEdge {
    pub target: String,
    pub resolved: bool,
    pub location: Location,
}

/// A file's position in the include graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTreeNode {
    pub path: String,
    /// Copy of the file's preprocessed tree; `None` for unreadable files.
    pub parsed_tree: Option<SymbolTree>,
    pub includes: Vec<IncludeEdge>,
    /// Files that include this one, sorted, without duplicates.
    pub included_by: Vec<String>,
    pub is_root: bool,
}

impl FileTreeNode {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            parsed_tree: None,
            includes: Vec::new(),
            included_by: Vec::new(),
            is_root: false,
        }
    }

    pub fn add_includer(&mut self, includer: &str) {
        if let Err(pos) = self.included_by.binary_search_by(|p| p.as_str().cmp(includer)) {
            self.included_by.insert(pos, includer.to_string());
        }
    }

    pub fn has_includer(&self, includer: &str) -> bool {
        self.included_by
            .binary_search_by(|p| p.as_str().cmp(includer))
            .is_ok()
    }

    /// Fold in back-edges recorded by another copy of this node.
    pub fn merge_included_by(&mut self, other: &FileTreeNode) {
        for includer in &other.included_by {
            self.add_includer(includer);
        }
        self.is_root |= other.is_root;
    }

    pub fn resolved_includes(&self) -> impl Iterator<Item = &str> {
        self.includes
            .iter()
            .filter(|e| e.resolved)
            .map(|e| e.target.as_str())
    }

    pub fn unresolved_includes(&self) -> impl Iterator<Item = &str> {
        self.includes
            .iter()
            .filter(|e| !e.resolved)
            .map(|e| e.target.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_includers_are_sorted_and_deduplicated() {
        let mut node = FileTreeNode::new("/p/c.svh");
        node.add_includer("/p/b.sv");
        node.add_includer("/p/a.sv");
        node.add_includer("/p/b.sv");
        assert_eq!(node.included_by, vec!["/p/a.sv", "/p/b.sv"]);
        assert!(node.has_includer("/p/a.sv"));
        assert!(!node.has_includer("/p/z.sv"));
    }

    #[test]
    fn test_merge_keeps_both_sides() {
        let mut existing = FileTreeNode::new("/p/c.svh");
        existing.add_includer("/p/a.sv");

        let mut fresh = FileTreeNode::new("/p/c.svh");
        fresh.add_includer("/p/b.sv");
        fresh.add_includer("/p/a.sv");

        existing.merge_included_by(&fresh);
        assert_eq!(existing.included_by, vec!["/p/a.sv", "/p/b.sv"]);
    }

    #[test]
    fn test_edge_partition() {
        let mut node = FileTreeNode::new("/p/top.sv");
        node.includes.push(IncludeEdge {
            target: "/p/pkg.svh".into(),
            resolved: true,
            location: Location::new(1, 1),
        });
        node.includes.push(IncludeEdge {
            target: "gone.svh".into(),
            resolved: false,
            location: Location::new(2, 1),
        });
        assert_eq!(node.resolved_includes().collect::<Vec<_>>(), vec!["/p/pkg.svh"]);
        assert_eq!(node.unresolved_includes().collect::<Vec<_>>(), vec!["gone.svh"]);
    }
}
