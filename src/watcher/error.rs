//! Errors from the file system watcher.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to start the file watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Failed to watch {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Watch event error: {details}")]
    EventError { details: String },

    #[error("Watcher thread has stopped")]
    ChannelClosed,
}

impl From<notify::Error> for WatchError {
    fn from(err: notify::Error) -> Self {
        let reason = match &err.kind {
            notify::ErrorKind::Io(e) => e.to_string(),
            notify::ErrorKind::Generic(msg) => msg.clone(),
            _ => err.to_string(),
        };
        match err.paths.first() {
            Some(path) => WatchError::PathWatchFailed {
                path: path.clone(),
                reason,
            },
            None => WatchError::EventError { details: reason },
        }
    }
}
