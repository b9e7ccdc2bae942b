//! Reactions to file changes and rebuild requests.
//!
//! Listeners run on whatever thread the provider reports from, possibly in
//! the middle of a stage. They only record what happened: a full reset
//! request, or a set of stale files. [`Index::apply_pending`] turns that into
//! cache changes at the next `ensure_state`, while the pipeline lock is held.
//!
//! With auto-rebuild off a reset request only marks the index dirty and
//! waits until auto-rebuild is switched back on or [`Index::force_rebuild`]
//! is called.

use std::sync::Weak;
use std::sync::atomic::Ordering;

use super::Index;
use crate::fs::{FileChangeEvent, FileChangeKind, FileChangeListener};
use crate::indexing::cache_data::CacheData;
use crate::indexing::paths;
use crate::indexing::resolver::IncludeSearch;
use crate::indexing::state::IndexState;

impl Index {
    /// Restore persisted state if it is still valid, else start from scratch.
    ///
    /// A valid snapshot puts the index straight into
    /// [`IndexState::FileTreeValid`]; nothing is re-read or re-parsed.
    pub fn init(&self) -> IndexState {
        let _guard = self.pipeline.lock();
        let globals = self.data.read().global_defines.clone();

        let mut restored = CacheData::new(self.base_location.clone());
        let loaded = self.cache.lock().init(&mut restored);
        if loaded && restored.base_location == self.base_location && restored.global_defines == globals {
            *self.data.write() = restored;
            if self.check_cache_valid() {
                tracing::info!("[index] {}: cache is valid", self.base_location);
                self.set_state(IndexState::FileTreeValid);
                self.dirty.store(false, Ordering::SeqCst);
                self.propagate_markers(None);
                self.notify_rebuilt();
                return self.state();
            }
        } else if loaded {
            tracing::info!("[index] {}: snapshot belongs to other settings", self.base_location);
        }

        self.reset();
        self.data.write().global_defines = globals;
        self.state()
    }

    /// Whether cached data still matches the file system.
    ///
    /// Fails on an engine version change, an empty cache, any timestamp that
    /// differs from the file system, or any previously missing include that
    /// can now be resolved.
    pub fn check_cache_valid(&self) -> bool {
        let (current_version, include_paths, missing) = {
            let data = self.data.read();
            (
                data.is_current_version(),
                data.include_paths.clone(),
                data.missing_includes.clone(),
            )
        };
        if !current_version {
            tracing::info!("[index] {}: cache version mismatch", self.base_location);
            return false;
        }

        let files = self.cache.lock().file_list();
        if files.is_empty() {
            return false;
        }
        for file in &files {
            let cached = self.cache.lock().last_modified(file);
            if self.fs.last_modified(file) != cached {
                tracing::info!("[index] {file} changed since it was cached");
                return false;
            }
        }

        let base_dir = self.resolved_base_location_dir();
        let provider = self.include_provider.read().as_ref().and_then(Weak::upgrade);
        let search = IncludeSearch::new(&base_dir, &include_paths, self.fs.as_ref())
            .with_provider(provider, &self.base_location);
        let is_cached = |p: &str| self.cache.lock().contains(p);
        if let Some(found) = missing.iter().find(|lit| search.probe(lit, &is_cached)) {
            tracing::info!("[index] previously missing include {found} can now be resolved");
            return false;
        }
        true
    }

    /// Request a full rebuild. Deferred while auto-rebuild is off.
    pub fn rebuild(&self) {
        self.invalidate("rebuild requested");
    }

    /// Reset now, regardless of auto-rebuild.
    pub fn force_rebuild(&self) {
        let _guard = self.pipeline.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.dirty.store(true, Ordering::SeqCst);
        self.reset_requested.store(false, Ordering::SeqCst);
        self.reset();
    }

    /// Enable or disable automatic rebuilds. Enabling applies any deferred reset.
    pub fn set_auto_rebuild(&self, enabled: bool) {
        self.auto_rebuild.store(enabled, Ordering::SeqCst);
        if enabled && self.reset_requested.load(Ordering::SeqCst) {
            let _guard = self.pipeline.lock();
            self.apply_pending();
        }
    }

    /// Set an engine-wide define. Rebuilds only when the value changes.
    pub fn set_global_define(&self, name: &str, value: &str) {
        let previous = self
            .data
            .write()
            .global_defines
            .insert(name.to_string(), value.to_string());
        if previous.as_deref() != Some(value) {
            self.invalidate("global define changed");
        }
    }

    pub fn clear_global_defines(&self) {
        let had_any = {
            let mut data = self.data.write();
            let had_any = !data.global_defines.is_empty();
            data.global_defines.clear();
            had_any
        };
        if had_any {
            self.invalidate("global defines cleared");
        }
    }

    fn invalidate(&self, reason: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.dirty.store(true, Ordering::SeqCst);
        self.reset_requested.store(true, Ordering::SeqCst);
        if self.auto_rebuild() {
            tracing::debug!("[index] {}: {reason}", self.base_location);
        } else {
            tracing::debug!("[index] {}: {reason} (deferred)", self.base_location);
        }
    }

    fn mark_stale(&self, path: String) {
        tracing::debug!("[index] {path} changed");
        self.stale.lock().insert(path);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Apply recorded invalidations. Returns true if anything changed.
    ///
    /// Caller holds the pipeline lock.
    pub(super) fn apply_pending(&self) -> bool {
        let mut applied = false;
        if self.auto_rebuild() && self.reset_requested.swap(false, Ordering::SeqCst) {
            self.reset();
            applied = true;
        }

        let stale = std::mem::take(&mut *self.stale.lock());
        if !stale.is_empty() {
            {
                let mut cache = self.cache.lock();
                let mut stale_defines = self.stale_defines.lock();
                for path in &stale {
                    if let Some(tree) = cache.preprocessed(path) {
                        stale_defines
                            .entry(path.clone())
                            .or_insert_with(|| tree.macro_defs());
                    }
                    if cache.contains(path) {
                        cache.set_parsed(path, None);
                        cache.set_preprocessed(path, None);
                        cache.set_last_modified(path, None);
                    }
                }
            }
            if self.state() > IndexState::RootFilesDiscovered {
                self.set_state(IndexState::RootFilesDiscovered);
            }
            tracing::debug!("[index] refreshing {} changed files", stale.len());
            applied = true;
        }
        applied
    }

    /// Drop everything derived from the sources. Global defines survive.
    fn reset(&self) {
        self.cache.lock().clear();
        self.data.write().clear();
        self.tracked_dirs.write().clear();
        self.stale.lock().clear();
        self.stale_defines.lock().clear();
        self.set_state(IndexState::AllInvalid);
        tracing::info!("[index] {}: reset", self.base_location);
    }

    fn is_discovery_source(&self, path: &str) -> bool {
        self.discovery
            .source_file(&self.resolved_base_location())
            .is_some_and(|source| source == path)
    }

    fn could_satisfy_missing_include(&self, path: &str) -> bool {
        let name = paths::file_name(path);
        self.data
            .read()
            .missing_includes
            .iter()
            .any(|lit| paths::file_name(lit) == name)
    }
}

impl FileChangeListener for Index {
    fn file_changed(&self, event: &FileChangeEvent) {
        if self.is_disposed() {
            return;
        }
        let path = paths::normalize(&event.path);
        match event.kind {
            FileChangeKind::Modified => {
                if self.is_discovery_source(&path) {
                    self.invalidate("argument file changed");
                } else if self.cache.lock().contains(&path) {
                    self.mark_stale(path);
                }
            }
            FileChangeKind::Removed => {
                if self.is_discovery_source(&path) || self.cache.lock().contains(&path) {
                    self.invalidate("file removed");
                }
            }
            FileChangeKind::Added => {
                let tracked_dir = paths::parent_dir(&path)
                    .is_some_and(|dir| self.tracked_dirs.read().contains(&dir));
                if tracked_dir
                    || self.is_discovery_source(&path)
                    || self
                        .discovery
                        .tracks(&self.resolved_base_location(), &path)
                    || self.could_satisfy_missing_include(&path)
                {
                    self.invalidate("file added");
                }
            }
        }
    }
}
