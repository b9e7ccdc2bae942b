use std::path::PathBuf;
use thiserror::Error;

/// Errors from setup operations (settings, snapshots, argument files, watchers).
///
/// Pipeline work never surfaces these; per-file problems become diagnostics.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Failed to write configuration to {path}: {reason}")]
    ConfigWrite { path: PathBuf, reason: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read argument file {path}")]
    ArgFileNotFound { path: String },

    #[error("Cannot discover root files under {base}: {reason}")]
    Discovery { base: String, reason: String },

    #[error("Snapshot error for {path}: {reason}")]
    Snapshot { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Watch(#[from] crate::watcher::WatchError),
}

pub type IndexResult<T> = Result<T, IndexError>;

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }
}
