//! The incremental indexing engine.

pub mod cache_data;
pub mod collection;
pub mod config;
pub mod decl_cache;
pub mod discovery;
pub mod file_tree;
pub mod index;
pub mod paths;
pub mod references;
pub mod resolver;
pub mod scheduler;
pub mod state;

pub use cache_data::{CacheData, ENGINE_VERSION};
pub use collection::{IncludeFileProvider, IndexCollection};
pub use config::IndexConfig;
pub use decl_cache::{DeclCache, DeclCacheEntry, DeclMatcher, NameMatch};
pub use discovery::{ArgFileDiscovery, Discovery, ExplicitRoots, RootDiscovery, SourceCollection};
pub use file_tree::{FileTreeNode, IncludeEdge};
pub use index::{Index, IndexBuilder, IndexChangeListener, IndexStats, MAX_STAGE_RETRIES, ParseResult};
pub use references::{RefCache, RefCacheEntry, RefKind, RefMatcher};
pub use resolver::{FileTreeBuilder, IncludeSearch, Resolution, TreeStore};
pub use scheduler::{InlineScheduler, Job, JobScheduler, PoolScheduler, scheduler_for};
pub use state::IndexState;
