//! File system watching for local projects.
//!
//! [`FsWatcher`] owns a single OS watcher and a background thread. Raw
//! notifications are classified, modifications are debounced, and the
//! resulting [`FileChangeEvent`](crate::fs::FileChangeEvent)s are handed to a
//! [`LocalFileSystem`](crate::fs::LocalFileSystem), which dispatches them to
//! the indexes listening on it.

mod debouncer;
mod error;
mod fs_watcher;
mod path_registry;

pub use debouncer::Debouncer;
pub use error::WatchError;
pub use fs_watcher::FsWatcher;
pub use path_registry::{PathRegistry, WatchDiff};
