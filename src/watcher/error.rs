//! Error types for watch sessions.

use std::path::PathBuf;
use thiserror::Error;

/// Setup failures of a watch session.
///
/// Problems while a session runs are logged, never returned: a broken event
/// stream must not take the host down.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("native file notifications unavailable: {reason}")]
    InitFailed { reason: String },

    #[error("cannot watch {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("file system event error: {details}")]
    EventError { details: String },

    #[error("cannot spawn watch thread: {reason}")]
    WorkerFailed { reason: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
