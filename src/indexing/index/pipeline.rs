//! Stage work for [`Index::ensure_state`].

use dashmap::DashSet;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Weak;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use super::{Index, MAX_STAGE_RETRIES};
use crate::indexing::decl_cache::{DeclCacheEntry, collect_declarations, collect_macro_declarations};
use crate::indexing::file_tree::FileTreeNode;
use crate::indexing::paths;
use crate::indexing::references::{RefCacheEntry, collect_references};
use crate::indexing::resolver::{FileTreeBuilder, IncludeSearch, TreeStore};
use crate::indexing::scheduler::Job;
use crate::indexing::state::IndexState;
use crate::parsing::MacroContext;
use crate::storage::SymbolCache;
use crate::symbol::SymbolTree;
use crate::types::{Marker, MarkerCategory};

/// Declarations and references produced by parsing one file.
struct ParsedFile {
    path: String,
    decls: Vec<DeclCacheEntry>,
    refs: Vec<RefCacheEntry>,
}

/// Replace the markers of one phase, keeping every other marker.
fn replace_phase(existing: Vec<Marker>, fresh: Vec<Marker>, in_phase: fn(&Marker) -> bool) -> Vec<Marker> {
    let mut merged: Vec<Marker> = existing.into_iter().filter(|m| !in_phase(m)).collect();
    merged.extend(fresh);
    merged
}

fn is_preprocess_phase(marker: &Marker) -> bool {
    marker.category == MarkerCategory::Generic
}

impl Index {
    /// Advance the pipeline until `target` is reached.
    ///
    /// Returns the state actually reached, which is below `target` when the
    /// token was cancelled, a file could not be read, or more than
    /// [`MAX_STAGE_RETRIES`] invalidations arrived during the call. Calling it
    /// again resumes from there.
    pub fn ensure_state(&self, target: IndexState, cancel: &CancellationToken) -> IndexState {
        let _guard = self.pipeline.lock();
        let mut resets = 0;

        loop {
            if self.apply_pending() {
                resets += 1;
                if resets > MAX_STAGE_RETRIES {
                    tracing::warn!(
                        "[index] {}: invalidated {resets} times while advancing to {target}; giving up for now",
                        self.base_location
                    );
                    break;
                }
            }

            let current = self.state();
            if current >= target {
                break;
            }
            if cancel.is_cancelled() {
                tracing::debug!("[index] {}: cancelled at {current}", self.base_location);
                break;
            }
            let Some(next) = current.next() else {
                break;
            };

            let generation = self.generation.load(Ordering::SeqCst);
            tracing::info!("[index] {}: {current} -> {next}", self.base_location);
            let complete = match next {
                IndexState::AllInvalid => true,
                IndexState::RootFilesDiscovered => self.discover_roots(),
                IndexState::FilesPreProcessed => self.preprocess_files(cancel),
                IndexState::FileTreeValid => self.build_file_tree(cancel),
                IndexState::AllFilesParsed => self.parse_files(cancel),
            };
            if !complete {
                tracing::debug!("[index] {}: stage {next} incomplete", self.base_location);
                break;
            }

            self.set_state(next);
            if self.generation.load(Ordering::SeqCst) == generation
                && !self.reset_requested.load(Ordering::SeqCst)
            {
                self.dirty.store(false, Ordering::SeqCst);
            }

            match next {
                IndexState::FileTreeValid => {
                    self.propagate_markers(None);
                    self.sync_cache();
                    self.notify_rebuilt();
                }
                IndexState::AllFilesParsed => self.sync_cache(),
                _ => {}
            }
        }
        self.state()
    }

    fn discover_roots(&self) -> bool {
        let base = self.resolved_base_location();
        let found = match self.discovery.discover(&base, self.fs.as_ref()) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("[index] root discovery failed: {e}");
                return false;
            }
        };

        let mut roots: Vec<String> = Vec::with_capacity(found.root_files.len());
        for file in &found.root_files {
            let file = paths::normalize(file);
            if !roots.contains(&file) {
                roots.push(file);
            }
        }

        let base_dir = self.resolved_base_location_dir();
        let mut include_paths: Vec<String> = Vec::new();
        for dir in found.include_paths.iter().chain(self.config.include_paths.iter()) {
            let dir = paths::join(&base_dir, &paths::expand_env(dir));
            if !include_paths.contains(&dir) {
                include_paths.push(dir);
            }
        }

        {
            let mut cache = self.cache.lock();
            for root in &roots {
                cache.add_file(root);
            }
        }

        tracing::info!(
            "[index] {}: {} root files, {} include paths",
            self.base_location,
            roots.len(),
            include_paths.len()
        );
        let mut data = self.data.write();
        data.root_files = roots;
        data.include_paths = include_paths;
        data.defines = found.defines;
        true
    }

    fn preprocess_files(&self, cancel: &CancellationToken) -> bool {
        let pending: Vec<String> = {
            let cache = self.cache.lock();
            cache
                .file_list()
                .into_iter()
                .filter(|p| cache.preprocessed(p).is_none())
                .collect()
        };
        if pending.is_empty() {
            return true;
        }

        let failed = AtomicUsize::new(0);
        let jobs: Vec<Job<'_>> = pending
            .iter()
            .map(|path| {
                let failed = &failed;
                Box::new(move || {
                    if cancel.is_cancelled() || self.preprocess_file(path).is_none() {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }) as Job<'_>
            })
            .collect();
        let done = self.scheduler.run_batch("preprocess", jobs);
        tracing::debug!("[index] preprocessed {done}/{} files", pending.len());

        done == pending.len() && failed.load(Ordering::Relaxed) == 0
    }

    /// Preprocess `path` from the file system and store the result.
    ///
    /// A file that does not exist gets an empty tree and an error marker. A
    /// file that exists but cannot be read is left alone and yields `None`.
    pub(super) fn preprocess_file(&self, path: &str) -> Option<SymbolTree> {
        let (tree, markers, modified) = if !self.fs.exists(path) {
            let marker = Marker::error(MarkerCategory::Generic, format!("File {path} does not exist"));
            (SymbolTree::new(path), vec![marker], None)
        } else {
            let modified = self.fs.last_modified(path);
            let Some(content) = self.fs.open_stream(path) else {
                tracing::warn!("[index] cannot open {path}; will retry");
                return None;
            };
            let mut markers = Vec::new();
            let tree = match self.preprocessor.preprocess(&content, path, &mut markers) {
                Some(tree) => tree,
                None => {
                    markers.push(Marker::error(
                        MarkerCategory::Generic,
                        format!("Unable to preprocess {path}"),
                    ));
                    SymbolTree::new(path)
                }
            };
            (tree, markers, modified)
        };

        let mut cache = self.cache.lock();
        cache.add_file(path);
        cache.set_preprocessed(path, Some(tree.clone()));
        cache.set_last_modified(path, modified);
        let merged = replace_phase(cache.diagnostics(path), markers, is_preprocess_phase);
        cache.set_diagnostics(path, merged);
        tracing::debug!("[index] preprocessed {path}");
        Some(tree)
    }

    fn build_file_tree(&self, cancel: &CancellationToken) -> bool {
        let (roots, include_paths) = {
            let data = self.data.read();
            (data.root_files.clone(), data.include_paths.clone())
        };

        {
            let mut cache = self.cache.lock();
            for file in cache.file_list() {
                if cache.file_tree(&file).is_some() {
                    cache.set_file_tree(&file, None);
                }
            }
        }

        let base_dir = self.resolved_base_location_dir();
        let provider = self.include_provider.read().as_ref().and_then(Weak::upgrade);
        let workspace_root = if self.config.use_workspace_relative {
            self.fs.workspace_root()
        } else {
            None
        };
        let search = IncludeSearch::new(&base_dir, &include_paths, self.fs.as_ref())
            .with_provider(provider, &self.base_location)
            .with_workspace_root(workspace_root);

        let root_set: BTreeSet<String> = roots.iter().cloned().collect();
        let included = DashSet::new();
        let missing = Mutex::new(BTreeSet::new());
        let builder = FileTreeBuilder::new(&search, self, &root_set, &included, &missing)
            .with_defines(self.configured_macros());

        let jobs: Vec<Job<'_>> = roots
            .iter()
            .map(|root| {
                let builder = &builder;
                Box::new(move || {
                    if !cancel.is_cancelled() {
                        builder.build_root(root);
                    }
                }) as Job<'_>
            })
            .collect();
        let done = self.scheduler.run_batch("file-tree", jobs);
        if cancel.is_cancelled() || done < roots.len() {
            return false;
        }

        let reached: BTreeSet<String> = included.into_iter().collect();
        let missing = missing.into_inner();

        let mut pruned = Vec::new();
        let mut macros = Vec::new();
        {
            let mut cache = self.cache.lock();
            for file in cache.file_list() {
                if !reached.contains(&file) {
                    cache.remove_file(&file);
                    pruned.push(file);
                }
            }
            let refreshed = std::mem::take(&mut *self.stale_defines.lock());
            for (file, before) in refreshed {
                let Some(tree) = cache.preprocessed(&file) else {
                    continue;
                };
                if tree.macro_defs() == before {
                    continue;
                }
                let neighbours = tree_neighbours(&**cache, &file);
                tracing::debug!("[index] defines of {file} changed; reparsing {} files", neighbours.len());
                for neighbour in neighbours {
                    if cache.parsed(&neighbour).is_some() {
                        cache.set_parsed(&neighbour, None);
                    }
                }
            }
            for file in &reached {
                if let Some(tree) = cache.preprocessed(file) {
                    macros.push((
                        file.clone(),
                        collect_macro_declarations(&self.base_location, file, &tree),
                    ));
                }
            }
        }
        if !pruned.is_empty() {
            tracing::debug!("[index] dropped {} unreachable files", pruned.len());
        }
        if !missing.is_empty() {
            tracing::info!(
                "[index] {}: {} unresolved includes",
                self.base_location,
                missing.len()
            );
        }

        let mut tracked: BTreeSet<String> = reached.iter().filter_map(|f| paths::parent_dir(f)).collect();
        tracked.extend(include_paths.iter().cloned());
        *self.tracked_dirs.write() = tracked;

        let mut data = self.data.write();
        for file in &pruned {
            data.decl_cache.remove_file(file);
            data.ref_cache.remove_file(file);
        }
        for (file, entries) in macros {
            data.decl_cache.replace_file_tree(&file, entries);
        }
        data.missing_includes = missing;
        true
    }

    fn parse_files(&self, cancel: &CancellationToken) -> bool {
        let pending: Vec<String> = {
            let cache = self.cache.lock();
            cache
                .file_list()
                .into_iter()
                .filter(|p| cache.parsed(p).is_none())
                .collect()
        };
        if pending.is_empty() {
            return true;
        }

        let failed = AtomicUsize::new(0);
        let results = Mutex::new(Vec::with_capacity(pending.len()));
        let jobs: Vec<Job<'_>> = pending
            .iter()
            .map(|path| {
                let (failed, results) = (&failed, &results);
                Box::new(move || {
                    if cancel.is_cancelled() {
                        failed.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    match self.parse_file(path) {
                        Some(parsed) => results.lock().push(parsed),
                        None => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }) as Job<'_>
            })
            .collect();
        let done = self.scheduler.run_batch("parse", jobs);

        let mut results = results.into_inner();
        results.sort_by(|a, b| a.path.cmp(&b.path));
        let parsed_paths: Vec<String> = results.iter().map(|r| r.path.clone()).collect();
        self.apply_parsed(results);
        self.propagate_markers(Some(parsed_paths.as_slice()));

        tracing::debug!("[index] parsed {}/{} files", parsed_paths.len(), pending.len());
        done == pending.len() && failed.load(Ordering::Relaxed) == 0 && !cancel.is_cancelled()
    }

    /// Parse one file and store its tree and parse markers.
    fn parse_file(&self, path: &str) -> Option<ParsedFile> {
        let content = match self.fs.open_stream(path) {
            Some(content) => content,
            None if !self.fs.exists(path) => Vec::new(),
            None => {
                tracing::warn!("[index] cannot open {path}; will retry");
                return None;
            }
        };

        let macros = self.macro_context(path);
        let mut markers = Vec::new();
        let tree = self
            .factory
            .parse(&content, path, &macros, &mut markers)
            .unwrap_or_else(|| SymbolTree::new(path));
        let decls = collect_declarations(&self.base_location, path, &tree);
        let refs = collect_references(path, &tree);

        let mut cache = self.cache.lock();
        if !cache.contains(path) {
            tracing::error!("[index] internal: {path} left the cache while being parsed");
            return None;
        }
        cache.set_parsed(path, Some(tree));
        let merged = replace_phase(cache.diagnostics(path), markers, Marker::is_parse_phase);
        cache.set_diagnostics(path, merged);

        Some(ParsedFile {
            path: path.to_string(),
            decls,
            refs,
        })
    }

    fn apply_parsed(&self, results: Vec<ParsedFile>) {
        let mut data = self.data.write();
        for parsed in results {
            data.decl_cache.replace_parsed(&parsed.path, parsed.decls);
            data.ref_cache.replace(&parsed.path, parsed.refs);
        }
    }

    /// Parse a single tracked file outside the parse stage.
    pub(super) fn parse_on_demand(&self, path: &str) -> Option<SymbolTree> {
        let parsed = self.parse_file(path)?;
        self.apply_parsed(vec![parsed]);
        self.propagate_markers(Some(&[path.to_string()][..]));
        self.cache.lock().parsed(path)
    }

    /// Macros visible while parsing `path`.
    ///
    /// Global defines come first, then the discovered defines, then every
    /// definition in the files that include `path` and the files it
    /// includes, following the file tree in both directions. The file's own
    /// definitions are left to the parser, which sees them in order.
    pub(super) fn macro_context(&self, path: &str) -> MacroContext {
        let mut context = self.configured_macros();

        let cache = self.cache.lock();
        for file in tree_neighbours(&**cache, path) {
            if let Some(tree) = cache.preprocessed(&file) {
                context.extend(tree.macro_defs());
            }
        }
        context
    }

    /// Global defines followed by the discovered defines.
    fn configured_macros(&self) -> MacroContext {
        let data = self.data.read();
        let mut context = MacroContext::new();
        context.extend(data.global_defines.iter().map(|(k, v)| (k.clone(), v.clone())));
        context.extend(data.defines.iter().map(|(k, v)| (k.clone(), v.clone())));
        context
    }

    /// Push cached markers to the file system provider, replacing what it
    /// holds for each file. `None` means every file.
    pub(super) fn propagate_markers(&self, only: Option<&[String]>) {
        let entries: Vec<(String, Vec<Marker>)> = {
            let cache = self.cache.lock();
            let files = match only {
                Some(files) => files.to_vec(),
                None => cache.file_list(),
            };
            files
                .into_iter()
                .map(|f| {
                    let markers = cache.diagnostics(&f);
                    (f, markers)
                })
                .collect()
        };
        for (file, markers) in entries {
            self.fs.clear_diagnostics(&file);
            for marker in markers {
                self.fs
                    .add_diagnostic(&file, marker.kind, marker.line(), &marker.message);
            }
        }
    }
}

/// Files that include `path` and files it includes, transitively, in
/// breadth-first order. Siblings sharing an includer are not neighbours.
fn tree_neighbours(cache: &dyn SymbolCache, path: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::from([path.to_string()]);
    let mut out = Vec::new();
    for upward in [true, false] {
        let mut queue = VecDeque::from([path.to_string()]);
        while let Some(current) = queue.pop_front() {
            let Some(node) = cache.file_tree(&current) else {
                continue;
            };
            let next: Vec<String> = if upward {
                node.included_by.clone()
            } else {
                node.resolved_includes().map(str::to_string).collect()
            };
            for file in next {
                if seen.insert(file.clone()) {
                    out.push(file.clone());
                    queue.push_back(file);
                }
            }
        }
    }
    out
}

impl TreeStore for Index {
    fn preprocessed(&self, path: &str) -> Option<SymbolTree> {
        let cached = self.cache.lock().preprocessed(path);
        cached.or_else(|| self.preprocess_file(path))
    }

    fn is_cached(&self, path: &str) -> bool {
        self.cache.lock().contains(path)
    }

    fn store_node(&self, mut node: FileTreeNode, markers: Vec<Marker>) {
        let path = node.path.clone();
        let mut cache = self.cache.lock();
        if let Some(existing) = cache.file_tree(&path) {
            node.merge_included_by(&existing);
        }
        cache.set_file_tree(&path, Some(node));
        let merged = replace_phase(cache.diagnostics(&path), markers, Marker::is_resolution_phase);
        cache.set_diagnostics(&path, merged);
    }

    fn add_back_edge(&self, target: &str, includer: &str) {
        let mut cache = self.cache.lock();
        let mut node = cache
            .file_tree(target)
            .unwrap_or_else(|| FileTreeNode::new(target));
        if !node.has_includer(includer) {
            node.add_includer(includer);
            cache.set_file_tree(target, Some(node));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_phase_keeps_other_markers() {
        let existing = vec![
            Marker::error(MarkerCategory::MissingInclude, "Failed to find include file a.svh"),
            Marker::error(MarkerCategory::ParseError, "old parse error"),
            Marker::warning(MarkerCategory::External, "lint"),
        ];
        let fresh = vec![Marker::error(MarkerCategory::UndefinedMacro, "macro `X is undefined")];

        let merged = replace_phase(existing, fresh, Marker::is_parse_phase);
        let categories: Vec<_> = merged.iter().map(|m| m.category).collect();
        assert_eq!(
            categories,
            vec![
                MarkerCategory::MissingInclude,
                MarkerCategory::External,
                MarkerCategory::UndefinedMacro
            ]
        );
    }
}
