//! Watch sessions: one debounced subscription per directory.
//!
//! ```text
//! event source --RawEvent--> worker thread
//!                               Debouncer::submit / drain
//!                               SettledSink::dispatch (synchronous)
//! ```
//!
//! The worker sleeps until the next event arrives or the earliest buffered
//! event is due, whichever comes first.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, select};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use crate::config::WatchConfig;

use super::debouncer::Debouncer;
use super::error::WatchError;
use super::event::{RawEvent, SettledEvent};
use super::handler::{SettledSink, TrackedFiles};
use super::source::{EventSource, SourceKind};

struct Running {
    source: EventSource,
    stop_tx: Sender<()>,
    worker: JoinHandle<()>,
}

struct SessionInner {
    root: PathBuf,
    kind: SourceKind,
    stopped: Arc<AtomicBool>,
    running: Mutex<Option<Running>>,
}

/// A running debounced watch on one directory.
///
/// Cheap to clone; all clones control the same session.
#[derive(Clone)]
pub struct WatchSession {
    inner: Arc<SessionInner>,
}

impl WatchSession {
    fn start(
        root: PathBuf,
        config: &WatchConfig,
        sink: Arc<dyn SettledSink>,
        tracked: &Arc<dyn TrackedFiles>,
    ) -> Result<Self, WatchError> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<RawEvent>();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let source = EventSource::start(
            config.backend,
            &root,
            event_tx,
            tracked,
            Duration::from_millis(config.poll_interval_ms),
        )?;
        let kind = source.kind();

        let stopped = Arc::new(AtomicBool::new(false));
        let worker = {
            let stopped = stopped.clone();
            let debouncer = Debouncer::new(config.debounce_ms);
            let idle_tick = Duration::from_millis(config.idle_tick_ms);
            thread::Builder::new()
                .name("hotreload-watch".to_string())
                .spawn(move || {
                    run_worker(debouncer, &event_rx, &stop_rx, sink.as_ref(), &stopped, idle_tick)
                })
                .map_err(|e| WatchError::WorkerFailed {
                    reason: e.to_string(),
                })?
        };

        crate::log_event!("watcher", "watching", "{} ({kind:?})", root.display());

        Ok(Self {
            inner: Arc::new(SessionInner {
                root,
                kind,
                stopped,
                running: Mutex::new(Some(Running {
                    source,
                    stop_tx,
                    worker,
                })),
            }),
        })
    }

    /// Canonical directory this session watches.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn source_kind(&self) -> SourceKind {
        self.inner.kind
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stop the session. Idempotent.
    ///
    /// Buffered events are discarded and nothing is dispatched once this
    /// returns. Calling it from inside a dispatch does not wait for the
    /// worker, which exits after the current dispatch.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        let Some(running) = self.inner.running.lock().take() else {
            return;
        };

        running.source.shutdown();
        drop(running.stop_tx);
        if running.worker.thread().id() != thread::current().id()
            && running.worker.join().is_err()
        {
            tracing::error!("[watcher] worker for {} panicked", self.inner.root.display());
        }

        crate::log_event!("watcher", "stopped", "{}", self.inner.root.display());
    }

    pub fn ptr_eq(&self, other: &WatchSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for WatchSession {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("root", &self.inner.root)
            .field("source", &self.inner.kind)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_worker(
    mut debouncer: Debouncer,
    events: &Receiver<RawEvent>,
    stop: &Receiver<()>,
    sink: &dyn SettledSink,
    stopped: &AtomicBool,
    idle_tick: Duration,
) {
    let dispatch = |event: SettledEvent| {
        if stopped.load(Ordering::Acquire) {
            return false;
        }
        crate::debug_event!("watcher", "settled", "{:?} -> {}", event, sink.name());
        sink.dispatch(event);
        true
    };

    loop {
        let drained = debouncer.drain(Instant::now());
        for event in drained.ready {
            if !dispatch(event) {
                return;
            }
        }

        let timeout = drained.next_due.unwrap_or(idle_tick);
        select! {
            recv(stop) -> _ => break,
            recv(events) -> msg => match msg {
                Ok(event) => {
                    if let Some(immediate) = debouncer.submit(event) {
                        if !dispatch(immediate) {
                            return;
                        }
                    }
                }
                Err(_) => break,
            },
            default(timeout) => {}
        }
    }

    debouncer.clear();
}

/// Maps canonical directories to their watch session.
pub struct SessionManager {
    sessions: DashMap<PathBuf, WatchSession>,
    config: WatchConfig,
    default_sink: Arc<dyn SettledSink>,
    tracked: Arc<dyn TrackedFiles>,
}

impl SessionManager {
    pub fn new(
        config: WatchConfig,
        default_sink: Arc<dyn SettledSink>,
        tracked: Arc<dyn TrackedFiles>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            default_sink,
            tracked,
        }
    }

    /// Watch a directory, or the directory containing a file.
    pub fn watch(&self, path: impl AsRef<Path>) -> Result<WatchSession, WatchError> {
        self.watch_with(path, self.default_sink.clone())
    }

    /// Like [`SessionManager::watch`] with an explicit dispatch target.
    ///
    /// An existing session for the same directory is returned unchanged and
    /// keeps its original sink.
    pub fn watch_with(
        &self,
        path: impl AsRef<Path>,
        sink: Arc<dyn SettledSink>,
    ) -> Result<WatchSession, WatchError> {
        let root = resolve_root(path.as_ref())?;

        match self.sessions.entry(root.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_running() {
                    crate::debug_event!("watcher", "already watching", "{}", root.display());
                    return Ok(entry.get().clone());
                }
                let session = WatchSession::start(root, &self.config, sink, &self.tracked)?;
                entry.insert(session.clone());
                Ok(session)
            }
            Entry::Vacant(entry) => {
                let session = WatchSession::start(root, &self.config, sink, &self.tracked)?;
                entry.insert(session.clone());
                Ok(session)
            }
        }
    }

    /// Stop a session and forget it.
    pub fn stop(&self, session: &WatchSession) {
        self.sessions
            .remove_if(session.root(), |_, existing| existing.ptr_eq(session));
        session.stop();
    }

    pub fn stop_all(&self) {
        let sessions: Vec<WatchSession> = self.sessions.iter().map(|e| e.value().clone()).collect();
        self.sessions.clear();
        for session in sessions {
            session.stop();
        }
    }

    /// Session for a directory or file path, if one is running.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<WatchSession> {
        let root = resolve_root(path.as_ref()).ok()?;
        self.sessions
            .get(&root)
            .map(|e| e.value().clone())
            .filter(WatchSession::is_running)
    }

    pub fn sessions(&self) -> Vec<WatchSession> {
        self.sessions
            .iter()
            .map(|e| e.value().clone())
            .filter(WatchSession::is_running)
            .collect()
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Canonicalize a path and reduce files to their parent directory.
fn resolve_root(path: &Path) -> Result<PathBuf, WatchError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| WatchError::PathWatchFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if canonical.is_dir() {
        return Ok(canonical);
    }

    canonical
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| WatchError::PathWatchFailed {
            path: path.to_path_buf(),
            reason: "file has no parent directory".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchBackend;
    use crate::watcher::event::EventKind;
    use std::fs;
    use tempfile::TempDir;

    struct Collect(Mutex<Vec<SettledEvent>>);

    impl SettledSink for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        fn dispatch(&self, event: SettledEvent) {
            self.0.lock().push(event);
        }
    }

    struct Nothing;

    impl TrackedFiles for Nothing {
        fn tracked_under(&self, _root: &Path) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    fn manager(backend: WatchBackend) -> (SessionManager, Arc<Collect>) {
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));
        let config = WatchConfig {
            backend,
            debounce_ms: 50,
            ..WatchConfig::default()
        };
        (
            SessionManager::new(config, sink.clone(), Arc::new(Nothing)),
            sink,
        )
    }

    #[test]
    fn test_resolve_root_uses_parent_of_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.hr");
        fs::write(&file, "").unwrap();

        let root = resolve_root(&file).unwrap();
        assert_eq!(root, temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_watch_missing_directory_fails() {
        let (manager, _) = manager(WatchBackend::Poll);
        let err = manager.watch("/definitely/not/here").unwrap_err();
        assert!(matches!(err, WatchError::PathWatchFailed { .. }));
    }

    #[test]
    fn test_same_directory_same_session() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.hr");
        fs::write(&file, "").unwrap();
        let (manager, _) = manager(WatchBackend::Poll);

        let first = manager.watch(temp.path()).unwrap();
        let second = manager.watch(&file).unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(manager.sessions().len(), 1);

        manager.stop(&second);
        assert!(!first.is_running());
        assert!(manager.get(temp.path()).is_none());
    }

    #[test]
    fn test_watch_after_stop_starts_fresh_session() {
        let temp = TempDir::new().unwrap();
        let (manager, _) = manager(WatchBackend::Poll);

        let first = manager.watch(temp.path()).unwrap();
        first.stop();
        first.stop();

        let second = manager.watch(temp.path()).unwrap();
        assert!(!first.ptr_eq(&second));
        assert!(second.is_running());
        manager.stop_all();
        assert!(!second.is_running());
    }

    #[test]
    fn test_native_session_delivers_settled_event() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.hr");
        fs::write(&file, "one").unwrap();
        let (manager, sink) = manager(WatchBackend::Native);

        let session = manager.watch(temp.path()).unwrap();
        assert_eq!(session.source_kind(), SourceKind::Native);
        thread::sleep(Duration::from_millis(100));

        fs::write(&file, "two").unwrap();
        fs::write(&file, "three").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let canonical = file.canonicalize().unwrap();
        while Instant::now() < deadline {
            if sink.0.lock().iter().any(|e| e.path == canonical) {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        session.stop();
        let events = sink.0.lock();
        let modified: Vec<_> = events
            .iter()
            .filter(|e| e.path == canonical && e.kind == EventKind::Modified)
            .collect();
        assert_eq!(modified.len(), 1);
    }

    struct Files(Vec<PathBuf>);

    impl TrackedFiles for Files {
        fn tracked_under(&self, root: &Path) -> Vec<PathBuf> {
            self.0.iter().filter(|path| path.starts_with(root)).cloned().collect()
        }
    }

    #[test]
    fn test_poll_session_delivers_modified_for_tracked_file() {
        let temp = TempDir::new().unwrap();
        let touched = temp.path().join("a.hr");
        let untouched = temp.path().join("b.hr");
        fs::write(&touched, "one").unwrap();
        fs::write(&untouched, "one").unwrap();
        let touched = touched.canonicalize().unwrap();
        let untouched = untouched.canonicalize().unwrap();

        let sink = Arc::new(Collect(Mutex::new(Vec::new())));
        let config = WatchConfig {
            backend: WatchBackend::Poll,
            debounce_ms: 50,
            poll_interval_ms: 20,
            ..WatchConfig::default()
        };
        let tracked = Files(vec![touched.clone(), untouched.clone()]);
        let manager = SessionManager::new(config, sink.clone(), Arc::new(tracked));

        let session = manager.watch(temp.path()).unwrap();
        assert_eq!(session.source_kind(), SourceKind::Polling);
        thread::sleep(Duration::from_millis(100));

        fs::write(&touched, "two").unwrap();
        // Push the mtime past the recorded one even on coarse-grained filesystems.
        fs::File::options()
            .write(true)
            .open(&touched)
            .unwrap()
            .set_modified(std::time::SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && sink.0.lock().is_empty() {
            thread::sleep(Duration::from_millis(20));
        }
        thread::sleep(Duration::from_millis(200));
        session.stop();

        let events = sink.0.lock();
        assert_eq!(
            *events,
            vec![SettledEvent {
                path: touched,
                kind: EventKind::Modified,
            }]
        );
        assert!(events.iter().all(|event| event.path != untouched));
    }
}
