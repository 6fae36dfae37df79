//! Dispatch target for settled events.

use std::path::{Path, PathBuf};

use super::event::SettledEvent;

/// Receives settled events from a watch session.
///
/// Sessions call `dispatch` synchronously on their worker thread, so events
/// for one session are never handled concurrently.
pub trait SettledSink: Send + Sync {
    /// Sink name for logging.
    fn name(&self) -> &str;

    /// Handle one settled event.
    fn dispatch(&self, event: SettledEvent);
}

/// Files an event source should keep an eye on when it cannot subscribe to
/// the filesystem and has to poll instead.
pub trait TrackedFiles: Send + Sync {
    /// Tracked files located under `root`.
    fn tracked_under(&self, root: &Path) -> Vec<PathBuf>;
}
