//! Incremental, include-aware indexing for SystemVerilog projects.
//!
//! An [`Index`] discovers a project's root files, follows their `` `include ``
//! directives into a file tree, and parses every file into symbol trees whose
//! declarations and references feed project-wide queries. Work is done lazily
//! in ordered stages (see [`IndexState`]) and redone only where file changes
//! require it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hdlindex::{Index, LocalFileSystem, NameMatch};
//!
//! let fs = Arc::new(LocalFileSystem::new(None));
//! let index = Index::builder("/work/chip/rtl", fs).build();
//! for decl in index.find_global_scope_decl("top", &NameMatch::Exact) {
//!     println!("{} {}", decl.kind, decl.file);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod indexing;
pub mod logging;
pub mod parsing;
pub mod storage;
pub mod symbol;
pub mod types;
pub mod watcher;

pub use config::Settings;
pub use error::{IndexError, IndexResult};
pub use fs::{FileChangeEvent, FileChangeKind, FileSystemProvider, LocalFileSystem, MemoryFileSystem};
pub use indexing::{
    ArgFileDiscovery, DeclCacheEntry, ExplicitRoots, Index, IndexBuilder, IndexChangeListener,
    IndexCollection, IndexConfig, IndexState, NameMatch, RefCacheEntry, SourceCollection,
};
pub use parsing::{FileFactory, MacroContext, PreProcessor, StructuralScanner};
pub use storage::{MemoryCache, SymbolCache};
pub use symbol::{SymbolItem, SymbolTree};
pub use types::*;
pub use watcher::FsWatcher;
