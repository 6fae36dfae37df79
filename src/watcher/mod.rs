//! Debounced directory watching.
//!
//! # Architecture
//!
//! ```text
//! SessionManager (one session per canonical directory)
//!   WatchSession
//!     - EventSource: notify::RecommendedWatcher or mtime poller
//!     - worker thread owning a Debouncer
//!     - SettledSink (orchestrator, or EventLoopHandoff in front of it)
//! ```

mod debouncer;
mod error;
mod event;
mod handler;
mod handoff;
mod session;
mod source;

pub use debouncer::{DEFAULT_DELAY, Debouncer, Drained};
pub use error::WatchError;
pub use event::{EventKind, RawEvent, SettledEvent};
pub use handler::{SettledSink, TrackedFiles};
pub use handoff::EventLoopHandoff;
pub use session::{SessionManager, WatchSession};
pub use source::SourceKind;
