//! Collapsing debouncer for file change events.
//!
//! Events are buffered per path for a short window before they settle.
//! Within that window, later events collapse earlier ones:
//!
//! - Modified cancels pending Deleted and Modified events, so a burst of
//!   writes settles as one Modified.
//! - Created and Deleted cancel each other. Editors that delete and rewrite
//!   a file, or create short-lived temporaries, produce no event at all.
//! - Deleted also cancels pending Modified events.
//!
//! Directory events are never buffered.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::event::{EventKind, RawEvent, SettledEvent};

/// Default settle window.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug)]
struct BufferedEvent {
    event: RawEvent,
    fire_at: Instant,
    cancelled: bool,
}

/// Result of one drain pass.
#[derive(Debug, Default)]
pub struct Drained {
    /// Events whose window elapsed, ready to dispatch.
    pub ready: Vec<SettledEvent>,
    /// Time until the earliest pending event is due, if any are pending.
    pub next_due: Option<Duration>,
}

/// Debounces file change events by path.
#[derive(Debug)]
pub struct Debouncer {
    /// Pending events per path, most recent first.
    buffers: HashMap<PathBuf, VecDeque<BufferedEvent>>,
    /// How long a path must stay quiet before its event settles.
    delay: Duration,
}

impl Debouncer {
    /// Create a new debouncer with the given window in milliseconds.
    pub fn new(debounce_ms: u64) -> Self {
        Self::with_delay(Duration::from_millis(debounce_ms))
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            buffers: HashMap::new(),
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record an event.
    ///
    /// Returns the event immediately for directories; file events are
    /// buffered and come back out of [`Debouncer::drain`].
    pub fn submit(&mut self, event: RawEvent) -> Option<SettledEvent> {
        if event.is_directory {
            return Some(SettledEvent::from(&event));
        }

        let buffer = self.buffers.entry(event.path.clone()).or_default();

        let keep = match event.kind {
            EventKind::Modified => {
                cancel(buffer, &[EventKind::Deleted, EventKind::Modified]);
                true
            }
            EventKind::Created => cancel(buffer, &[EventKind::Deleted]) == 0,
            EventKind::Deleted => {
                let keep = cancel(buffer, &[EventKind::Created]) == 0;
                cancel(buffer, &[EventKind::Modified]);
                keep
            }
        };

        if keep {
            buffer.push_front(BufferedEvent {
                fire_at: event.timestamp + self.delay,
                event,
                cancelled: false,
            });
        } else {
            crate::debug_event!(
                "debouncer",
                "collapsed",
                "{} {}",
                event.kind,
                event.path.display()
            );
        }

        None
    }

    /// Take every event whose window has elapsed at `now`.
    ///
    /// Cancelled heads are dropped. Once a path's head fires, the older
    /// entries behind it are discarded with it.
    pub fn drain(&mut self, now: Instant) -> Drained {
        let mut drained = Drained::default();

        self.buffers.retain(|_, buffer| {
            while let Some(head) = buffer.front() {
                if head.cancelled {
                    buffer.pop_front();
                    continue;
                }
                if now >= head.fire_at {
                    drained.ready.push(SettledEvent::from(&head.event));
                    return false;
                }
                let wait = head.fire_at - now;
                drained.next_due = Some(drained.next_due.map_or(wait, |due| due.min(wait)));
                return true;
            }
            false
        });

        drained
    }

    /// Check if any live (not cancelled) event is pending.
    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Number of live buffered events across all paths.
    pub fn pending_count(&self) -> usize {
        self.buffers
            .values()
            .flat_map(|buffer| buffer.iter())
            .filter(|buffered| !buffered.cancelled)
            .count()
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::with_delay(DEFAULT_DELAY)
    }
}

/// Mark every pending event of the given kinds as cancelled.
fn cancel(buffer: &mut VecDeque<BufferedEvent>, kinds: &[EventKind]) -> usize {
    let mut cancelled = 0;
    for buffered in buffer.iter_mut() {
        if !buffered.cancelled && kinds.contains(&buffered.event.kind) {
            buffered.cancelled = true;
            cancelled += 1;
        }
    }
    cancelled
}
