use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::indexing::decl_cache::DeclCache;
use crate::indexing::references::RefCache;

/// Engine version stamped into cache data; a mismatch invalidates it.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Derived index state persisted alongside the symbol cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheData {
    pub version: String,
    pub base_location: String,
    pub root_files: Vec<String>,
    pub include_paths: Vec<String>,
    /// Engine-wide defines.
    pub global_defines: IndexMap<String, String>,
    /// Defines found by root discovery.
    pub defines: IndexMap<String, String>,
    pub decl_cache: DeclCache,
    pub ref_cache: RefCache,
    pub missing_includes: BTreeSet<String>,
}

impl CacheData {
    pub fn new(base_location: impl Into<String>) -> Self {
        Self {
            version: ENGINE_VERSION.to_string(),
            base_location: base_location.into(),
            root_files: Vec::new(),
            include_paths: Vec::new(),
            global_defines: IndexMap::new(),
            defines: IndexMap::new(),
            decl_cache: DeclCache::default(),
            ref_cache: RefCache::default(),
            missing_includes: BTreeSet::new(),
        }
    }

    /// Drop everything derived from the sources. Global defines survive.
    pub fn clear(&mut self) {
        self.version = ENGINE_VERSION.to_string();
        self.root_files.clear();
        self.include_paths.clear();
        self.defines.clear();
        self.decl_cache.clear();
        self.ref_cache.clear();
        self.missing_includes.clear();
    }

    pub fn is_current_version(&self) -> bool {
        self.version == ENGINE_VERSION
    }
}
