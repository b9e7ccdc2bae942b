//! Incremental index over one project's sources.
//!
//! ## Pipeline
//!
//! ```text
//! AllInvalid → RootFilesDiscovered → FilesPreProcessed → FileTreeValid → AllFilesParsed
//!               [discovery]           [preprocess]        [resolve]        [parse]
//! ```
//!
//! Every query names the state it needs and calls [`Index::ensure_state`],
//! which runs the missing stages in order. Each stage hands one job per file
//! to the scheduler and waits for the whole batch before the next stage.
//!
//! Change notifications only flip flags (see `invalidation.rs`); the
//! pending work is applied at the start of the next `ensure_state`.

mod invalidation;
mod pipeline;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tokio_util::sync::CancellationToken;

use crate::fs::{FileChangeListener, FileSystemProvider};
use crate::indexing::cache_data::CacheData;
use crate::indexing::collection::IncludeFileProvider;
use crate::indexing::config::IndexConfig;
use crate::indexing::decl_cache::{DeclCacheEntry, DeclMatcher};
use crate::indexing::discovery::{RootDiscovery, SourceCollection};
use crate::indexing::file_tree::FileTreeNode;
use crate::indexing::paths;
use crate::indexing::references::{RefCacheEntry, RefMatcher};
use crate::indexing::resolver::IncludeSearch;
use crate::indexing::scheduler::{JobScheduler, scheduler_for};
use crate::indexing::state::IndexState;
use crate::parsing::{FileFactory, PreProcessor, StructuralScanner};
use crate::storage::{MemoryCache, SymbolCache};
use crate::symbol::SymbolTree;
use crate::types::Marker;

/// How many invalidations one `ensure_state` call absorbs before giving up.
pub const MAX_STAGE_RETRIES: u32 = 3;

/// Notified after an index reaches [`IndexState::FileTreeValid`] and its
/// diagnostics have been pushed to the file system provider.
pub trait IndexChangeListener: Send + Sync {
    fn index_rebuilt(&self, base_location: &str);
}

/// Outcome of [`Index::parse_content`].
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub preprocessed: Option<SymbolTree>,
    pub parsed: Option<SymbolTree>,
    pub markers: Vec<Marker>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub base_location: String,
    pub state: IndexState,
    pub files: usize,
    pub root_files: usize,
    pub declarations: usize,
    pub references: usize,
    pub missing_includes: usize,
    pub dirty: bool,
}

pub struct IndexBuilder {
    base_location: String,
    fs: Arc<dyn FileSystemProvider>,
    cache: Option<Box<dyn SymbolCache>>,
    discovery: Option<Box<dyn RootDiscovery>>,
    preprocessor: Option<Arc<dyn PreProcessor>>,
    factory: Option<Arc<dyn FileFactory>>,
    scheduler: Option<Box<dyn JobScheduler>>,
    config: IndexConfig,
}

impl IndexBuilder {
    pub fn cache(mut self, cache: Box<dyn SymbolCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn discovery(mut self, discovery: Box<dyn RootDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn preprocessor(mut self, preprocessor: Arc<dyn PreProcessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn factory(mut self, factory: Arc<dyn FileFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Override the scheduler chosen from the config's thread settings.
    pub fn scheduler(mut self, scheduler: Box<dyn JobScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the index and register it for change events from its provider.
    pub fn build(self) -> Arc<Index> {
        let config = self.config;
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| scheduler_for(config.enable_threads, config.worker_threads));
        let scanner = Arc::new(StructuralScanner::new());

        let mut data = CacheData::new(self.base_location.clone());
        data.global_defines = config.defines.clone();

        let index = Arc::new(Index {
            base_location: self.base_location,
            fs: self.fs,
            cache: Mutex::new(
                self.cache
                    .unwrap_or_else(|| Box::new(MemoryCache::new()) as Box<dyn SymbolCache>),
            ),
            data: RwLock::new(data),
            discovery: self
                .discovery
                .unwrap_or_else(|| Box::new(SourceCollection::default()) as Box<dyn RootDiscovery>),
            preprocessor: self
                .preprocessor
                .unwrap_or_else(|| scanner.clone() as Arc<dyn PreProcessor>),
            factory: self.factory.unwrap_or(scanner as Arc<dyn FileFactory>),
            scheduler,
            state: AtomicU8::new(IndexState::AllInvalid as u8),
            pipeline: ReentrantMutex::new(()),
            generation: AtomicU64::new(0),
            dirty: AtomicBool::new(true),
            reset_requested: AtomicBool::new(false),
            auto_rebuild: AtomicBool::new(config.auto_rebuild),
            stale: Mutex::new(BTreeSet::new()),
            stale_defines: Mutex::new(BTreeMap::new()),
            tracked_dirs: RwLock::new(BTreeSet::new()),
            include_provider: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
            fs_listener: OnceLock::new(),
            disposed: AtomicBool::new(false),
            config,
        });

        let listener: Arc<dyn FileChangeListener> = index.clone();
        let weak = Arc::downgrade(&listener);
        index.fs.add_change_listener(weak.clone());
        let _ = index.fs_listener.set(weak);

        tracing::debug!(
            "[index] created {} ({} scheduler)",
            index.base_location,
            if index.scheduler.is_concurrent() { "pool" } else { "inline" }
        );
        index
    }
}

/// One project's index.
///
/// Lock order: `pipeline` before anything else; `cache` and `data` are never
/// held at the same time.
pub struct Index {
    base_location: String,
    fs: Arc<dyn FileSystemProvider>,
    cache: Mutex<Box<dyn SymbolCache>>,
    data: RwLock<CacheData>,
    discovery: Box<dyn RootDiscovery>,
    preprocessor: Arc<dyn PreProcessor>,
    factory: Arc<dyn FileFactory>,
    scheduler: Box<dyn JobScheduler>,
    config: IndexConfig,
    state: AtomicU8,
    /// Held for the duration of every `ensure_state`.
    pipeline: ReentrantMutex<()>,
    /// Bumped by every invalidation.
    generation: AtomicU64,
    dirty: AtomicBool,
    reset_requested: AtomicBool,
    auto_rebuild: AtomicBool,
    /// Files changed on disk, waiting to be refreshed.
    stale: Mutex<BTreeSet<String>>,
    /// Macro definitions of refreshed files as they were before the change.
    stale_defines: Mutex<BTreeMap<String, Vec<(String, String)>>>,
    tracked_dirs: RwLock<BTreeSet<String>>,
    include_provider: RwLock<Option<Weak<dyn IncludeFileProvider>>>,
    listeners: Mutex<Vec<Arc<dyn IndexChangeListener>>>,
    fs_listener: OnceLock<Weak<dyn FileChangeListener>>,
    disposed: AtomicBool,
}

impl Index {
    pub fn builder(base_location: impl Into<String>, fs: Arc<dyn FileSystemProvider>) -> IndexBuilder {
        IndexBuilder {
            base_location: base_location.into(),
            fs,
            cache: None,
            discovery: None,
            preprocessor: None,
            factory: None,
            scheduler: None,
            config: IndexConfig::default(),
        }
    }

    pub fn base_location(&self) -> &str {
        &self.base_location
    }

    /// Base location with `${workspace_loc}` and environment references expanded.
    pub fn resolved_base_location(&self) -> String {
        let root = self.fs.workspace_root();
        let expanded = paths::expand_workspace_loc(&self.base_location, root.as_deref());
        paths::normalize(&paths::expand_env(&expanded))
    }

    /// The base location itself when it is a directory, else its parent.
    pub fn resolved_base_location_dir(&self) -> String {
        let resolved = self.resolved_base_location();
        if self.fs.is_dir(&resolved) {
            return resolved;
        }
        paths::parent_dir(&resolved).unwrap_or(resolved)
    }

    pub fn state(&self) -> IndexState {
        IndexState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: IndexState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// True while an invalidation has not yet been fully processed.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn is_file_list_loaded(&self) -> bool {
        self.state() >= IndexState::RootFilesDiscovered
    }

    pub fn auto_rebuild(&self) -> bool {
        self.auto_rebuild.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Every file the index tracks: roots and everything they include.
    pub fn file_list(&self) -> Vec<String> {
        self.ensure(IndexState::FileTreeValid);
        self.cache.lock().file_list()
    }

    pub fn root_files(&self) -> Vec<String> {
        self.ensure(IndexState::RootFilesDiscovered);
        self.data.read().root_files.clone()
    }

    /// Parsed tree of `path`, parsing it now if the parse stage has not.
    pub fn find_file(&self, path: &str) -> Option<SymbolTree> {
        let path = paths::normalize(path);
        let _guard = self.pipeline.lock();
        self.ensure(IndexState::FileTreeValid);
        {
            let cache = self.cache.lock();
            if let Some(tree) = cache.parsed(&path) {
                return Some(tree);
            }
            if !cache.contains(&path) {
                return None;
            }
        }
        self.parse_on_demand(&path)
    }

    pub fn find_preprocessed_file(&self, path: &str) -> Option<SymbolTree> {
        self.ensure(IndexState::FileTreeValid);
        self.cache.lock().preprocessed(&paths::normalize(path))
    }

    pub fn find_file_tree(&self, path: &str) -> Option<FileTreeNode> {
        self.ensure(IndexState::FileTreeValid);
        self.cache.lock().file_tree(&paths::normalize(path))
    }

    /// Global and package-scope declarations whose names satisfy `matcher`.
    pub fn find_global_scope_decl(&self, name: &str, matcher: &dyn DeclMatcher) -> Vec<DeclCacheEntry> {
        self.ensure(IndexState::AllFilesParsed);
        self.data.read().decl_cache.find(name, matcher)
    }

    pub fn find_references(&self, name: &str, matcher: &dyn RefMatcher) -> Vec<RefCacheEntry> {
        self.ensure(IndexState::AllFilesParsed);
        self.data.read().ref_cache.find(name, matcher)
    }

    pub fn get_diagnostics(&self, path: &str) -> Vec<Marker> {
        self.ensure(IndexState::FileTreeValid);
        self.cache.lock().diagnostics(&paths::normalize(path))
    }

    pub fn get_decl_file(&self, entry: &DeclCacheEntry) -> Option<SymbolTree> {
        self.find_file(&entry.file)
    }

    pub fn get_decl_file_preprocessed(&self, entry: &DeclCacheEntry) -> Option<SymbolTree> {
        self.find_preprocessed_file(&entry.file)
    }

    /// Parse an unsaved buffer for `path` with the macros visible to that file.
    ///
    /// The cache is left untouched. Missing-include markers recorded for the
    /// file are carried into the result.
    pub fn parse_content(&self, content: &[u8], path: &str) -> ParseResult {
        let path = paths::normalize(path);
        self.ensure(IndexState::FileTreeValid);

        let known = self.cache.lock().contains(&path);
        if !known && self.fs.exists(&path) {
            tracing::info!("[index] {path} is not part of {}; rebuilding", self.base_location);
            self.rebuild();
            if self.auto_rebuild() {
                self.ensure(IndexState::FileTreeValid);
            }
        }

        let mut markers: Vec<Marker> = self
            .cache
            .lock()
            .diagnostics(&path)
            .into_iter()
            .filter(Marker::is_resolution_phase)
            .collect();

        let preprocessed = self.preprocessor.preprocess(content, &path, &mut markers);
        let macros = self.macro_context(&path);
        let parsed = self.factory.parse(content, &path, &macros, &mut markers);

        ParseResult {
            preprocessed,
            parsed,
            markers,
        }
    }

    /// Resolve `literal` against this index alone, without the global provider.
    pub fn find_local_include(&self, literal: &str) -> Option<String> {
        let include_paths = self.data.read().include_paths.clone();
        let base_dir = self.resolved_base_location_dir();
        let search = IncludeSearch::new(&base_dir, &include_paths, self.fs.as_ref());
        let is_cached = |p: &str| self.cache.lock().contains(p);
        search
            .resolve(literal, &is_cached)
            .map(|hit| hit.path().to_string())
    }

    /// Whether the cache currently holds `path`. Does not advance the pipeline.
    pub fn contains_file(&self, path: &str) -> bool {
        self.cache.lock().contains(&paths::normalize(path))
    }

    pub fn set_include_provider(&self, provider: Weak<dyn IncludeFileProvider>) {
        *self.include_provider.write() = Some(provider);
    }

    pub fn add_change_listener(&self, listener: Arc<dyn IndexChangeListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn remove_change_listener(&self, listener: &Arc<dyn IndexChangeListener>) {
        self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn notify_rebuilt(&self) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.index_rebuilt(&self.base_location);
        }
    }

    pub fn stats(&self) -> IndexStats {
        let files = self.cache.lock().file_list().len();
        let data = self.data.read();
        IndexStats {
            base_location: self.base_location.clone(),
            state: self.state(),
            files,
            root_files: data.root_files.len(),
            declarations: data.decl_cache.len(),
            references: data.ref_cache.len(),
            missing_includes: data.missing_includes.len(),
            dirty: self.is_dirty(),
        }
    }

    /// Include strings that could not be resolved by the last tree build.
    pub fn missing_includes(&self) -> Vec<String> {
        self.ensure(IndexState::FileTreeValid);
        self.data.read().missing_includes.iter().cloned().collect()
    }

    /// Directories whose additions matter to this index, as of the last tree
    /// build, plus the base directory. Does not advance the pipeline.
    pub fn watched_dirs(&self) -> BTreeSet<String> {
        let mut dirs = self.tracked_dirs.read().clone();
        dirs.insert(self.resolved_base_location_dir());
        dirs
    }

    pub fn global_defines(&self) -> Vec<(String, String)> {
        self.data
            .read()
            .global_defines
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn cache_mutation_count(&self) -> u64 {
        self.cache.lock().mutation_count()
    }

    pub fn cache_dump(&self) -> Option<String> {
        self.cache.lock().dump()
    }

    /// Serialized index data, for comparing two indexes.
    pub fn data_dump(&self) -> Option<String> {
        serde_json::to_string(&*self.data.read()).ok()
    }

    /// Detach from the file system provider and flush the cache.
    pub fn dispose(&self) {
        let _guard = self.pipeline.lock();
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(weak) = self.fs_listener.get() {
            self.fs.remove_change_listener(weak);
        }
        self.sync_cache();
        self.listeners.lock().clear();
        tracing::debug!("[index] disposed {}", self.base_location);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn sync_cache(&self) {
        let data = self.data.read().clone();
        if let Err(e) = self.cache.lock().sync(&data) {
            tracing::warn!("[cache] sync failed for {}: {e}", self.base_location);
        }
    }

    /// Run the whole pipeline without a cancellation token.
    pub fn ensure_parsed(&self) -> IndexState {
        self.ensure(IndexState::AllFilesParsed)
    }

    /// `ensure_state` for queries, which cannot be cancelled.
    fn ensure(&self, target: IndexState) -> IndexState {
        self.ensure_state(target, &CancellationToken::new())
    }
}
