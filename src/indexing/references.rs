//! Per-file cache of package imports, class extensions and includes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::indexing::decl_cache::NameMatch;
use crate::symbol::SymbolTree;
use crate::types::{ItemKind, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Import,
    Extends,
    Include,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefCacheEntry {
    pub file: String,
    /// Referenced name: the package of an import, the base class of an
    /// extension, or the literal include string.
    pub name: String,
    pub kind: RefKind,
    pub location: Location,
}

pub trait RefMatcher: Sync {
    fn matches(&self, entry: &RefCacheEntry, name: &str) -> bool;
}

impl RefMatcher for NameMatch {
    fn matches(&self, entry: &RefCacheEntry, name: &str) -> bool {
        self.is_match(&entry.name, name)
    }
}

impl<F> RefMatcher for F
where
    F: Fn(&RefCacheEntry, &str) -> bool + Sync,
{
    fn matches(&self, entry: &RefCacheEntry, name: &str) -> bool {
        self(entry, name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefCache {
    files: BTreeMap<String, Vec<RefCacheEntry>>,
}

impl RefCache {
    pub fn replace(&mut self, file: &str, entries: Vec<RefCacheEntry>) {
        if entries.is_empty() {
            self.files.remove(file);
        } else {
            self.files.insert(file.to_string(), entries);
        }
    }

    pub fn remove_file(&mut self, file: &str) {
        self.files.remove(file);
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn find(&self, name: &str, matcher: &dyn RefMatcher) -> Vec<RefCacheEntry> {
        self.files
            .values()
            .flatten()
            .filter(|e| matcher.matches(e, name))
            .cloned()
            .collect()
    }
}

/// Reference entries for every import, extends and include in a parsed tree.
pub fn collect_references(file: &str, tree: &SymbolTree) -> Vec<RefCacheEntry> {
    let mut out = Vec::new();
    tree.walk(|item| {
        let (kind, name) = match item.kind {
            ItemKind::Import => {
                let package = item.name.split("::").next().unwrap_or(&item.name);
                (RefKind::Import, package.to_string())
            }
            ItemKind::Extends => (RefKind::Extends, item.name.clone()),
            ItemKind::Include => (RefKind::Include, item.name.clone()),
            _ => return,
        };
        out.push(RefCacheEntry {
            file: file.to_string(),
            name,
            kind,
            location: item.location,
        });
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolItem;

    #[test]
    fn test_collect_and_find() {
        let mut tree = SymbolTree::new("/p/env.sv");
        tree.items = vec![
            SymbolItem::new(ItemKind::Include, "defs.svh", Location::new(1, 1)),
            SymbolItem::new(ItemKind::ModuleDecl, "env", Location::new(2, 1)).with_children(vec![
                SymbolItem::new(ItemKind::Import, "pkg::*", Location::new(3, 3)),
                SymbolItem::new(ItemKind::ClassDecl, "drv", Location::new(4, 3)).with_children(vec![
                    SymbolItem::new(ItemKind::Extends, "base_drv", Location::new(4, 20)),
                ]),
            ]),
        ];

        let mut cache = RefCache::default();
        cache.replace("/p/env.sv", collect_references("/p/env.sv", &tree));
        assert_eq!(cache.len(), 3);

        let imports = cache.find("pkg", &NameMatch::Exact);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].kind, RefKind::Import);
        assert_eq!(imports[0].location, Location::new(3, 3));

        let only_extends = |e: &RefCacheEntry, _: &str| e.kind == RefKind::Extends;
        assert_eq!(cache.find("", &only_extends)[0].name, "base_drv");

        cache.replace("/p/env.sv", Vec::new());
        assert!(cache.is_empty());
    }
}
