//! Include resolution and file tree construction.
//!
//! [`IncludeSearch`] decides where an include string points. [`FileTreeBuilder`]
//! walks preprocessed trees from a root, resolving every include and storing
//! one [`FileTreeNode`] per reached file through a [`TreeStore`].

use dashmap::DashSet;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::fs::FileSystemProvider;
use crate::indexing::collection::IncludeFileProvider;
use crate::indexing::file_tree::{FileTreeNode, IncludeEdge};
use crate::indexing::paths::{self, PathShape};
use crate::parsing::MacroContext;
use crate::symbol::{SymbolItem, SymbolTree};
use crate::types::{ItemKind, Marker, MarkerCategory};

/// Where an include string was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A file this index owns or can read directly.
    Local(String),
    /// A file owned by another index, found through the global provider.
    External(String),
}

impl Resolution {
    pub fn path(&self) -> &str {
        match self {
            Resolution::Local(p) | Resolution::External(p) => p,
        }
    }
}

/// Include search context for one index.
pub struct IncludeSearch<'a> {
    base_dir: String,
    include_paths: &'a [String],
    fs: &'a dyn FileSystemProvider,
    provider: Option<Arc<dyn IncludeFileProvider>>,
    requester: &'a str,
    workspace_root: Option<String>,
}

impl<'a> IncludeSearch<'a> {
    pub fn new(base_dir: &str, include_paths: &'a [String], fs: &'a dyn FileSystemProvider) -> Self {
        Self {
            base_dir: paths::normalize(base_dir),
            include_paths,
            fs,
            provider: None,
            requester: "",
            workspace_root: None,
        }
    }

    /// Fall back to `provider` for includes not found locally.
    ///
    /// `requester` names the asking index so the provider can skip it.
    pub fn with_provider(
        mut self,
        provider: Option<Arc<dyn IncludeFileProvider>>,
        requester: &'a str,
    ) -> Self {
        self.provider = provider;
        self.requester = requester;
        self
    }

    /// Prefer `${workspace_loc}` spellings for files under `root`.
    pub fn with_workspace_root(mut self, root: Option<String>) -> Self {
        self.workspace_root = root;
        self
    }

    /// Paths to try for `literal`, in search order.
    ///
    /// Include directories come before the base directory. A relative literal
    /// is never looked up verbatim on disk; `resolve` only accepts it verbatim
    /// when the cache already holds it.
    pub fn candidates(&self, literal: &str) -> Vec<String> {
        let in_base_dir = paths::join(&self.base_dir, literal);
        let mut out: Vec<String> = match paths::classify(literal) {
            PathShape::Absolute => vec![paths::normalize(literal)],
            PathShape::DotRelative => vec![in_base_dir],
            PathShape::UpDir | PathShape::Bare => self
                .include_paths
                .iter()
                .map(|dir| paths::join(dir, literal))
                .chain(std::iter::once(in_base_dir))
                .collect(),
        };
        let mut seen = HashSet::new();
        out.retain(|p| seen.insert(p.clone()));
        out
    }

    /// Resolve `literal`. `is_cached` reports whether the index already holds
    /// a preprocessed tree for a path. First hit wins.
    pub fn resolve(&self, literal: &str, is_cached: &dyn Fn(&str) -> bool) -> Option<Resolution> {
        let normalized = paths::normalize(literal);
        if is_cached(&normalized) {
            return Some(Resolution::Local(normalized));
        }

        for candidate in self.candidates(literal) {
            if is_cached(&candidate) || self.is_file(&candidate) {
                return Some(Resolution::Local(self.preferred_spelling(candidate)));
            }
        }

        let provider = self.provider.as_ref()?;
        provider
            .find_include(literal, self.requester)
            .map(Resolution::External)
    }

    /// Whether `literal` would resolve now. Has no side effects.
    pub fn probe(&self, literal: &str, is_cached: &dyn Fn(&str) -> bool) -> bool {
        self.resolve(literal, is_cached).is_some()
    }

    fn is_file(&self, path: &str) -> bool {
        self.fs.exists(path) && !self.fs.is_dir(path)
    }

    fn preferred_spelling(&self, path: String) -> String {
        let Some(root) = self.workspace_root.as_deref() else {
            return path;
        };
        match paths::to_workspace_relative(&path, root) {
            Some(relative) if self.fs.exists(&relative) => relative,
            _ => path,
        }
    }
}

/// Cache access needed while building the file tree.
///
/// Every method must be safe to call from several builder jobs at once.
pub trait TreeStore: Sync {
    /// Preprocessed tree for `path`, preprocessing it on first use.
    fn preprocessed(&self, path: &str) -> Option<SymbolTree>;

    fn is_cached(&self, path: &str) -> bool;

    /// Store the node for `node.path` together with its resolution markers,
    /// keeping any back-edges already recorded for it.
    fn store_node(&self, node: FileTreeNode, markers: Vec<Marker>);

    /// Record that `includer` includes `target`.
    fn add_back_edge(&self, target: &str, includer: &str);
}

/// Whether one branch of a conditional chain is taken.
///
/// `label` is the `PreProcCond` name written by the preprocessor
/// (`ifdef NAME`, `ifndef NAME`, `elsif NAME` or `else`). `taken` carries the
/// chain state between sibling branches.
fn branch_taken(label: &str, macros: &MacroContext, taken: &mut bool) -> bool {
    let (directive, name) = label.split_once(' ').unwrap_or((label, ""));
    let active = match directive {
        "ifdef" | "ifndef" => {
            *taken = false;
            macros.is_defined(name) == (directive == "ifdef")
        }
        "elsif" => !*taken && macros.is_defined(name),
        _ => !*taken,
    };
    *taken |= active;
    active
}

/// The node and resolution markers of the file being scanned.
struct Frame {
    node: FileTreeNode,
    markers: Vec<Marker>,
}

/// Builds file tree nodes reachable from root files.
///
/// `included` is shared by every job of a batch, so a file reached from two
/// roots is resolved once. Each job keeps its own in-progress set to stop at
/// include cycles.
///
/// Includes are followed in source order with the defines seen so far, the
/// way a compiler expands them. Includes inside inactive conditional
/// branches are not followed.
pub struct FileTreeBuilder<'a> {
    search: &'a IncludeSearch<'a>,
    store: &'a dyn TreeStore,
    roots: &'a BTreeSet<String>,
    included: &'a DashSet<String>,
    missing: &'a Mutex<BTreeSet<String>>,
    defines: MacroContext,
}

impl<'a> FileTreeBuilder<'a> {
    pub fn new(
        search: &'a IncludeSearch<'a>,
        store: &'a dyn TreeStore,
        roots: &'a BTreeSet<String>,
        included: &'a DashSet<String>,
        missing: &'a Mutex<BTreeSet<String>>,
    ) -> Self {
        Self {
            search,
            store,
            roots,
            included,
            missing,
            defines: MacroContext::new(),
        }
    }

    /// Defines in effect at the top of every root.
    pub fn with_defines(mut self, defines: MacroContext) -> Self {
        self.defines = defines;
        self
    }

    /// Build the tree below `root`. Does nothing if another job got there first.
    pub fn build_root(&self, root: &str) {
        if !self.included.insert(root.to_string()) {
            tracing::debug!("[resolver] {root} already reached from another root");
            return;
        }
        let mut in_progress = HashSet::new();
        let mut macros = self.defines.clone();
        self.build(root, &mut in_progress, &mut macros);
    }

    fn build(&self, path: &str, in_progress: &mut HashSet<String>, macros: &mut MacroContext) {
        in_progress.insert(path.to_string());

        let tree = self.store.preprocessed(path);
        let mut frame = Frame {
            node: FileTreeNode::new(path),
            markers: Vec::new(),
        };
        frame.node.is_root = self.roots.contains(path);
        if let Some(tree) = &tree {
            self.scan(&tree.items, &mut frame, in_progress, macros);
        }
        frame.node.parsed_tree = tree;
        self.store.store_node(frame.node, frame.markers);

        in_progress.remove(path);
    }

    fn scan(
        &self,
        items: &[SymbolItem],
        frame: &mut Frame,
        in_progress: &mut HashSet<String>,
        macros: &mut MacroContext,
    ) {
        let mut taken = false;
        for item in items {
            match item.kind {
                ItemKind::PreProcCond => {
                    if branch_taken(&item.name, macros, &mut taken) {
                        self.scan(&item.children, frame, in_progress, macros);
                    }
                }
                ItemKind::MacroDef => {
                    macros.define(item.name.clone(), item.detail.clone().unwrap_or_default());
                }
                ItemKind::Include => self.include(item, frame, in_progress, macros),
                _ => self.scan(&item.children, frame, in_progress, macros),
            }
        }
    }

    fn include(
        &self,
        include: &SymbolItem,
        frame: &mut Frame,
        in_progress: &mut HashSet<String>,
        macros: &mut MacroContext,
    ) {
        let path = frame.node.path.clone();
        let literal = include.name.as_str();
        let is_cached = |p: &str| self.store.is_cached(p);
        match self.search.resolve(literal, &is_cached) {
            Some(Resolution::Local(target)) => {
                self.store.add_back_edge(&target, &path);
                let descend = if in_progress.contains(&target) {
                    tracing::debug!("[resolver] include cycle {path} -> {target}");
                    false
                } else {
                    self.included.insert(target.clone())
                };
                frame.node.includes.push(IncludeEdge {
                    target: target.clone(),
                    resolved: true,
                    location: include.location,
                });
                if descend {
                    self.build(&target, in_progress, macros);
                }
            }
            Some(Resolution::External(target)) => {
                tracing::debug!("[resolver] {literal} resolved externally to {target}");
                frame.node.includes.push(IncludeEdge {
                    target,
                    resolved: true,
                    location: include.location,
                });
            }
            None => {
                tracing::debug!("[resolver] {path}: cannot find include {literal}");
                self.missing.lock().insert(literal.to_string());
                frame.markers.push(
                    Marker::error(
                        MarkerCategory::MissingInclude,
                        format!("Failed to find include file {literal}"),
                    )
                    .with_location(include.location),
                );
                frame.node.includes.push(IncludeEdge {
                    target: literal.to_string(),
                    resolved: false,
                    location: include.location,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::types::Location;
    use std::collections::HashMap;

    /// Store over fixed include lists.
    #[derive(Default)]
    struct FakeStore {
        includes: HashMap<String, Vec<String>>,
        trees: HashMap<String, SymbolTree>,
        nodes: Mutex<HashMap<String, FileTreeNode>>,
        markers: Mutex<HashMap<String, Vec<Marker>>>,
        loads: Mutex<Vec<String>>,
    }

    impl FakeStore {
        fn with(mut self, path: &str, includes: &[&str]) -> Self {
            self.includes
                .insert(path.into(), includes.iter().map(|s| s.to_string()).collect());
            self
        }

        fn with_tree(mut self, tree: SymbolTree) -> Self {
            self.trees.insert(tree.path.clone(), tree);
            self
        }

        fn node(&self, path: &str) -> FileTreeNode {
            self.nodes.lock()[path].clone()
        }
    }

    impl TreeStore for FakeStore {
        fn preprocessed(&self, path: &str) -> Option<SymbolTree> {
            self.loads.lock().push(path.to_string());
            if let Some(tree) = self.trees.get(path) {
                return Some(tree.clone());
            }
            let includes = self.includes.get(path)?;
            let mut tree = SymbolTree::new(path);
            for (i, inc) in includes.iter().enumerate() {
                tree.items.push(SymbolItem::new(
                    ItemKind::Include,
                    inc.as_str(),
                    Location::new(i as u32 + 1, 1),
                ));
            }
            Some(tree)
        }

        fn is_cached(&self, path: &str) -> bool {
            self.includes.contains_key(path) || self.trees.contains_key(path)
        }

        fn store_node(&self, mut node: FileTreeNode, markers: Vec<Marker>) {
            let mut nodes = self.nodes.lock();
            if let Some(existing) = nodes.get(&node.path) {
                node.merge_included_by(existing);
            }
            self.markers.lock().insert(node.path.clone(), markers);
            nodes.insert(node.path.clone(), node);
        }

        fn add_back_edge(&self, target: &str, includer: &str) {
            self.nodes
                .lock()
                .entry(target.to_string())
                .or_insert_with(|| FileTreeNode::new(target))
                .add_includer(includer);
        }
    }

    fn build_all(store: &FakeStore, roots: &[&str], search: &IncludeSearch<'_>) -> BTreeSet<String> {
        build_with(store, roots, search, MacroContext::new())
    }

    fn build_with(
        store: &FakeStore,
        roots: &[&str],
        search: &IncludeSearch<'_>,
        defines: MacroContext,
    ) -> BTreeSet<String> {
        let roots: BTreeSet<String> = roots.iter().map(|s| s.to_string()).collect();
        let included = DashSet::new();
        let missing = Mutex::new(BTreeSet::new());
        let builder = FileTreeBuilder::new(search, store, &roots, &included, &missing).with_defines(defines);
        for root in &roots {
            builder.build_root(root);
        }
        missing.into_inner()
    }

    #[test]
    fn test_candidate_order() {
        let fs = MemoryFileSystem::new();
        let incdirs = vec!["/inc1".to_string(), "/inc2".to_string()];
        let search = IncludeSearch::new("/proj", &incdirs, &fs);

        assert_eq!(
            search.candidates("defs.svh"),
            vec!["/inc1/defs.svh", "/inc2/defs.svh", "/proj/defs.svh"]
        );
        assert_eq!(search.candidates("./x.svh"), vec!["/proj/x.svh"]);
        assert_eq!(search.candidates("../common/x.svh"), vec!["/common/x.svh"]);
        assert_eq!(search.candidates("../../x.svh"), vec!["/x.svh"]);
        assert_eq!(search.candidates("/abs//x.svh"), vec!["/abs/x.svh"]);
    }

    #[test]
    fn test_first_hit_wins() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/inc1/defs.svh", "a");
        fs.write_file("/inc2/defs.svh", "much longer content");
        let incdirs = vec!["/inc2".to_string(), "/inc1".to_string()];
        let search = IncludeSearch::new("/proj", &incdirs, &fs);

        let hit = search.resolve("defs.svh", &|_| false);
        assert_eq!(hit, Some(Resolution::Local("/inc2/defs.svh".into())));
        assert!(search.resolve("nothing.svh", &|_| false).is_none());
        assert!(search.probe("defs.svh", &|_| false));
    }

    #[test]
    fn test_include_dir_shadows_base_dir() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/proj/defs.svh", "");
        fs.write_file("/inc/defs.svh", "");
        let incdirs = vec!["/inc".to_string()];
        let search = IncludeSearch::new("/proj", &incdirs, &fs);

        assert_eq!(
            search.resolve("defs.svh", &|_| false),
            Some(Resolution::Local("/inc/defs.svh".into()))
        );
        assert_eq!(
            search.resolve("./defs.svh", &|_| false),
            Some(Resolution::Local("/proj/defs.svh".into()))
        );
    }

    #[test]
    fn test_relative_literal_matches_verbatim_only_when_cached() {
        let fs = MemoryFileSystem::new();
        fs.write_file("defs.svh", "");
        let search = IncludeSearch::new("/proj", &[], &fs);
        assert!(search.resolve("defs.svh", &|_| false).is_none());
        assert_eq!(
            search.resolve("defs.svh", &|p| p == "defs.svh"),
            Some(Resolution::Local("defs.svh".into()))
        );
    }

    #[test]
    fn test_cached_literal_needs_no_file() {
        let fs = MemoryFileSystem::new();
        let search = IncludeSearch::new("/proj", &[], &fs);
        let hit = search.resolve("/gen/defs.svh", &|p| p == "/gen/defs.svh");
        assert_eq!(hit, Some(Resolution::Local("/gen/defs.svh".into())));
    }

    #[test]
    fn test_directories_are_not_includes() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/proj/pkg/inner.sv", "");
        let search = IncludeSearch::new("/proj", &[], &fs);
        assert!(search.resolve("pkg", &|_| false).is_none());
    }

    #[test]
    fn test_workspace_relative_spelling() {
        let fs = MemoryFileSystem::new().with_workspace_root("/ws");
        fs.write_file("/ws/proj/defs.svh", "");
        let search = IncludeSearch::new("/ws/proj", &[], &fs).with_workspace_root(Some("/ws".into()));
        assert_eq!(
            search.resolve("defs.svh", &|_| false),
            Some(Resolution::Local("${workspace_loc}/proj/defs.svh".into()))
        );
    }

    #[test]
    fn test_diamond_resolves_shared_include_once() {
        let fs = MemoryFileSystem::new();
        let store = FakeStore::default()
            .with("/p/a.sv", &["/p/c.svh"])
            .with("/p/b.sv", &["/p/c.svh"])
            .with("/p/c.svh", &[]);
        let search = IncludeSearch::new("/p", &[], &fs);

        let missing = build_all(&store, &["/p/a.sv", "/p/b.sv"], &search);
        assert!(missing.is_empty());

        let loads = store.loads.lock().clone();
        assert_eq!(loads.iter().filter(|p| *p == "/p/c.svh").count(), 1);
        assert_eq!(store.node("/p/c.svh").included_by, vec!["/p/a.sv", "/p/b.sv"]);
        assert!(store.node("/p/a.sv").is_root);
        assert!(!store.node("/p/c.svh").is_root);
    }

    #[test]
    fn test_cycle_terminates_with_back_edge() {
        let fs = MemoryFileSystem::new();
        let store = FakeStore::default()
            .with("/p/a.sv", &["/p/b.svh"])
            .with("/p/b.svh", &["/p/a.sv"]);
        let search = IncludeSearch::new("/p", &[], &fs);

        build_all(&store, &["/p/a.sv"], &search);
        let a = store.node("/p/a.sv");
        let b = store.node("/p/b.svh");
        assert_eq!(a.resolved_includes().collect::<Vec<_>>(), vec!["/p/b.svh"]);
        assert_eq!(b.resolved_includes().collect::<Vec<_>>(), vec!["/p/a.sv"]);
        assert_eq!(a.included_by, vec!["/p/b.svh"]);
        assert_eq!(b.included_by, vec!["/p/a.sv"]);
    }

    #[test]
    fn test_missing_include_becomes_unresolved_edge() {
        let fs = MemoryFileSystem::new();
        let store = FakeStore::default().with("/p/top.sv", &["inc.svh"]);
        let search = IncludeSearch::new("/p", &[], &fs);

        let missing = build_all(&store, &["/p/top.sv"], &search);
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec!["inc.svh"]);

        let top = store.node("/p/top.sv");
        assert_eq!(top.unresolved_includes().collect::<Vec<_>>(), vec!["inc.svh"]);
        let markers = store.markers.lock()["/p/top.sv"].clone();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].category, MarkerCategory::MissingInclude);
        assert_eq!(markers[0].line(), 1);
    }

    fn item(kind: ItemKind, name: &str, line: u32) -> SymbolItem {
        SymbolItem::new(kind, name, Location::new(line, 1))
    }

    fn cond(label: &str, line: u32, children: Vec<SymbolItem>) -> SymbolItem {
        item(ItemKind::PreProcCond, label, line).with_children(children)
    }

    #[test]
    fn test_inactive_branches_are_not_followed() {
        let fs = MemoryFileSystem::new();
        let mut top = SymbolTree::new("/p/top.sv");
        top.items = vec![
            cond("ifdef VENDOR", 1, vec![item(ItemKind::Include, "vendor.svh", 2)]),
            cond("else", 3, vec![item(ItemKind::Include, "/p/generic.svh", 4)]),
            cond("ifndef SIM", 6, vec![item(ItemKind::Include, "/p/synth.svh", 7)]),
        ];
        let store = FakeStore::default()
            .with_tree(top)
            .with("/p/generic.svh", &[])
            .with("/p/synth.svh", &[]);
        let search = IncludeSearch::new("/p", &[], &fs);

        let missing = build_all(&store, &["/p/top.sv"], &search);
        assert!(missing.is_empty());
        assert!(store.markers.lock()["/p/top.sv"].is_empty());
        assert_eq!(
            store.node("/p/top.sv").resolved_includes().collect::<Vec<_>>(),
            vec!["/p/generic.svh", "/p/synth.svh"]
        );
    }

    #[test]
    fn test_defines_reach_later_includes() {
        let fs = MemoryFileSystem::new();
        let mut top = SymbolTree::new("/p/top.sv");
        top.items = vec![
            item(ItemKind::Include, "/p/cfg.svh", 1),
            cond("ifdef USE_FAST", 2, vec![item(ItemKind::Include, "/p/fast.svh", 3)]),
            cond("elsif SIM", 4, vec![item(ItemKind::Include, "/p/sim.svh", 5)]),
            cond("else", 6, vec![item(ItemKind::Include, "/p/slow.svh", 7)]),
        ];
        let mut cfg = SymbolTree::new("/p/cfg.svh");
        cfg.items = vec![item(ItemKind::MacroDef, "USE_FAST", 1)];
        let store = FakeStore::default()
            .with_tree(top)
            .with_tree(cfg)
            .with("/p/fast.svh", &[])
            .with("/p/sim.svh", &[])
            .with("/p/slow.svh", &[]);
        let search = IncludeSearch::new("/p", &[], &fs);

        let sim: MacroContext = [("SIM", "1")].into_iter().collect();
        build_with(&store, &["/p/top.sv"], &search, sim);
        assert_eq!(
            store.node("/p/top.sv").resolved_includes().collect::<Vec<_>>(),
            vec!["/p/cfg.svh", "/p/fast.svh"]
        );
    }

    #[test]
    fn test_configured_defines_pick_branch() {
        let fs = MemoryFileSystem::new();
        let mut top = SymbolTree::new("/p/top.sv");
        top.items = vec![
            cond("ifdef USE_FAST", 1, vec![item(ItemKind::Include, "/p/fast.svh", 2)]),
            cond("elsif SIM", 3, vec![item(ItemKind::Include, "/p/sim.svh", 4)]),
            cond("else", 5, vec![item(ItemKind::Include, "/p/slow.svh", 6)]),
        ];
        let store = FakeStore::default()
            .with_tree(top)
            .with("/p/sim.svh", &[])
            .with("/p/slow.svh", &[]);
        let search = IncludeSearch::new("/p", &[], &fs);

        let sim: MacroContext = [("SIM", "1")].into_iter().collect();
        build_with(&store, &["/p/top.sv"], &search, sim);
        assert_eq!(
            store.node("/p/top.sv").resolved_includes().collect::<Vec<_>>(),
            vec!["/p/sim.svh"]
        );
    }
}
