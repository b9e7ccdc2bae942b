//! Global-scope declaration cache.
//!
//! Each file owns a list of entries that is replaced wholesale whenever the
//! file is re-parsed. Lookups scan every entry through a matcher.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::symbol::{SymbolItem, SymbolTree};
use crate::types::{ItemKind, Location};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclCacheEntry {
    /// Base location of the owning index.
    pub index: String,
    pub file: String,
    pub name: String,
    pub kind: ItemKind,
    /// Enclosing package, if any.
    pub package: Option<String>,
    /// Came from the file tree (macro definitions) rather than a full parse.
    pub is_file_tree: bool,
    pub location: Location,
}

/// How a lookup name is compared against entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    Exact,
    CaseInsensitive,
    Prefix,
}

impl NameMatch {
    pub fn is_match(self, candidate: &str, name: &str) -> bool {
        match self {
            NameMatch::Exact => candidate == name,
            NameMatch::CaseInsensitive => candidate.eq_ignore_ascii_case(name),
            NameMatch::Prefix => candidate.starts_with(name),
        }
    }
}

/// Caller-supplied predicate for declaration lookups.
pub trait DeclMatcher: Sync {
    fn matches(&self, entry: &DeclCacheEntry, name: &str) -> bool;
}

impl DeclMatcher for NameMatch {
    fn matches(&self, entry: &DeclCacheEntry, name: &str) -> bool {
        self.is_match(&entry.name, name)
    }
}

impl<F> DeclMatcher for F
where
    F: Fn(&DeclCacheEntry, &str) -> bool + Sync,
{
    fn matches(&self, entry: &DeclCacheEntry, name: &str) -> bool {
        self(entry, name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclCache {
    files: BTreeMap<String, Vec<DeclCacheEntry>>,
}

impl DeclCache {
    /// Replace the entries produced by a full parse of `file`.
    pub fn replace_parsed(&mut self, file: &str, entries: Vec<DeclCacheEntry>) {
        self.replace_where(file, entries, false);
    }

    /// Replace the entries produced from the file tree of `file`.
    pub fn replace_file_tree(&mut self, file: &str, entries: Vec<DeclCacheEntry>) {
        self.replace_where(file, entries, true);
    }

    fn replace_where(&mut self, file: &str, entries: Vec<DeclCacheEntry>, is_file_tree: bool) {
        let list = self.files.entry(file.to_string()).or_default();
        list.retain(|e| e.is_file_tree != is_file_tree);
        list.extend(entries);
        if list.is_empty() {
            self.files.remove(file);
        }
    }

    pub fn remove_file(&mut self, file: &str) {
        self.files.remove(file);
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn entries(&self, file: &str) -> &[DeclCacheEntry] {
        self.files.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Linear scan over every entry.
    pub fn find(&self, name: &str, matcher: &dyn DeclMatcher) -> Vec<DeclCacheEntry> {
        self.files
            .values()
            .flatten()
            .filter(|e| matcher.matches(e, name))
            .cloned()
            .collect()
    }
}

/// Declarations visible at global or package scope in a parsed tree.
///
/// Packages register and recurse; other design elements register without
/// recursing; conditional blocks are transparent.
pub fn collect_declarations(index: &str, file: &str, tree: &SymbolTree) -> Vec<DeclCacheEntry> {
    fn walk(
        items: &[SymbolItem],
        package: Option<&str>,
        make: &dyn Fn(&SymbolItem, Option<&str>) -> DeclCacheEntry,
        out: &mut Vec<DeclCacheEntry>,
    ) {
        for item in items {
            match item.kind {
                ItemKind::PackageDecl => {
                    out.push(make(item, package));
                    walk(&item.children, Some(item.name.as_str()), make, out);
                }
                ItemKind::Function
                | ItemKind::Task
                | ItemKind::ClassDecl
                | ItemKind::ModuleDecl
                | ItemKind::InterfaceDecl
                | ItemKind::ProgramDecl
                | ItemKind::TypedefStmt => out.push(make(item, package)),
                ItemKind::PreProcCond => walk(&item.children, package, make, out),
                _ => {}
            }
        }
    }

    let make = |item: &SymbolItem, package: Option<&str>| DeclCacheEntry {
        index: index.to_string(),
        file: file.to_string(),
        name: item.name.clone(),
        kind: item.kind,
        package: package.map(str::to_string),
        is_file_tree: false,
        location: item.location,
    };
    let mut out = Vec::new();
    walk(&tree.items, None, &make, &mut out);
    out
}

/// Macro definitions from a preprocessed tree.
pub fn collect_macro_declarations(index: &str, file: &str, tree: &SymbolTree) -> Vec<DeclCacheEntry> {
    tree.collect_kind(ItemKind::MacroDef)
        .into_iter()
        .map(|item| DeclCacheEntry {
            index: index.to_string(),
            file: file.to_string(),
            name: item.name.clone(),
            kind: ItemKind::MacroDef,
            package: None,
            is_file_tree: true,
            location: item.location,
        })
        .collect()
}
