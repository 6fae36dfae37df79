//! Broadcast of reload outcomes.
//!
//! Hosts subscribe to learn when a unit has a new generation, for example to
//! re-run an entry point after every successful reload.

use std::path::PathBuf;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum ReloadEvent {
    Loaded { unit: String, path: PathBuf },
    Reloaded { unit: String, generation: u64 },
    ReloadFailed { unit: String, message: String },
    Unregistered { unit: String },
}

impl ReloadEvent {
    pub fn unit(&self) -> &str {
        match self {
            Self::Loaded { unit, .. }
            | Self::Reloaded { unit, .. }
            | Self::ReloadFailed { unit, .. }
            | Self::Unregistered { unit } => unit,
        }
    }
}

/// Fan-out of [`ReloadEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct ReloadNotifier {
    sender: broadcast::Sender<ReloadEvent>,
}

impl ReloadNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, event: ReloadEvent) {
        match self.sender.send(event.clone()) {
            Ok(count) => {
                crate::debug_event!("notify", "sent", "{event:?} to {count} subscribers");
            }
            Err(_) => {
                crate::debug_event!("notify", "dropped", "no subscribers for {event:?}");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.sender.subscribe()
    }
}

impl Default for ReloadNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}
