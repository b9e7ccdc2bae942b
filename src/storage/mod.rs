pub mod cache;
pub mod memory;
pub mod persistence;

pub use cache::SymbolCache;
pub use memory::{CacheEntry, MemoryCache};
pub use persistence::{Snapshot, SnapshotStore};
