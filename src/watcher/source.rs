//! Event sources feeding a watch session.
//!
//! The native source subscribes to the filesystem through `notify`. When that
//! is unavailable (or configured off), a poller stats the tracked files under
//! the session root and synthesizes Modified events when their mtime moves
//! forward. Downstream code cannot tell the two apart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam_channel::{Receiver, Sender, select};
use notify::{RecursiveMode, Watcher};

use crate::config::WatchBackend;

use super::error::WatchError;
use super::event::{EventKind, RawEvent};
use super::handler::TrackedFiles;

/// Which backend a session ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Native,
    Polling,
}

pub(crate) enum EventSource {
    Native(notify::RecommendedWatcher),
    Polling(Poller),
}

impl EventSource {
    pub(crate) fn start(
        backend: WatchBackend,
        root: &Path,
        tx: Sender<RawEvent>,
        tracked: &Arc<dyn TrackedFiles>,
        poll_interval: Duration,
    ) -> Result<Self, WatchError> {
        match backend {
            WatchBackend::Native => Self::native(root, tx),
            WatchBackend::Poll => Poller::spawn(root, tx, tracked.clone(), poll_interval),
            WatchBackend::Auto => match Self::native(root, tx.clone()) {
                Ok(source) => Ok(source),
                Err(e) => {
                    tracing::warn!("[watcher] native backend unavailable, polling instead: {e}");
                    Poller::spawn(root, tx, tracked.clone(), poll_interval)
                }
            },
        }
    }

    fn native(root: &Path, tx: Sender<RawEvent>) -> Result<Self, WatchError> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for raw in RawEvent::from_notify(&event) {
                        // The session may already be gone.
                        let _ = tx.send(raw);
                    }
                }
                Err(e) => {
                    let error = WatchError::EventError {
                        details: e.to_string(),
                    };
                    tracing::error!("[watcher] {error}");
                }
            }
        })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(EventSource::Native(watcher))
    }

    pub(crate) fn kind(&self) -> SourceKind {
        match self {
            EventSource::Native(_) => SourceKind::Native,
            EventSource::Polling(_) => SourceKind::Polling,
        }
    }

    /// Stop producing events. Blocks until a poller thread has exited.
    pub(crate) fn shutdown(self) {
        match self {
            EventSource::Native(watcher) => drop(watcher),
            EventSource::Polling(poller) => poller.stop(),
        }
    }
}

pub(crate) struct Poller {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Poller {
    fn spawn(
        root: &Path,
        tx: Sender<RawEvent>,
        tracked: Arc<dyn TrackedFiles>,
        interval: Duration,
    ) -> Result<EventSource, WatchError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let root = root.to_path_buf();

        let handle = thread::Builder::new()
            .name("hotreload-poll".to_string())
            .spawn(move || poll_loop(&root, &tx, tracked.as_ref(), interval, &stop_rx))
            .map_err(|e| WatchError::WorkerFailed {
                reason: e.to_string(),
            })?;

        Ok(EventSource::Polling(Poller { stop_tx, handle }))
    }

    fn stop(self) {
        drop(self.stop_tx);
        if self.handle.thread().id() != thread::current().id() && self.handle.join().is_err() {
            tracing::error!("[watcher] poll thread panicked");
        }
    }
}

fn poll_loop(
    root: &Path,
    tx: &Sender<RawEvent>,
    tracked: &dyn TrackedFiles,
    interval: Duration,
    stop_rx: &Receiver<()>,
) {
    let mut last_mtime: HashMap<PathBuf, SystemTime> = HashMap::new();
    crate::debug_event!("poller", "started", "{} every {interval:?}", root.display());

    loop {
        for path in tracked.tracked_under(root) {
            let Ok(mtime) = std::fs::metadata(&path).and_then(|meta| meta.modified()) else {
                continue;
            };
            let last = last_mtime.entry(path.clone()).or_insert(mtime);
            if mtime > *last {
                *last = mtime;
                if tx.send(RawEvent::new(path, EventKind::Modified)).is_err() {
                    return;
                }
            }
        }

        select! {
            recv(stop_rx) -> _ => break,
            default(interval) => {}
        }
    }

    crate::debug_event!("poller", "stopped", "{}", root.display());
}
