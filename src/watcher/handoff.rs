//! Re-marshal settled events onto a tokio runtime.
//!
//! Hosts built around an event loop want reloads to run on that loop, not on
//! the watch worker. The handoff sink queues events on a tokio channel and a
//! task on the runtime feeds them to the real sink.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::event::SettledEvent;
use super::handler::SettledSink;

/// Sink that forwards events to another sink running on a tokio runtime.
pub struct EventLoopHandoff {
    name: String,
    tx: mpsc::UnboundedSender<SettledEvent>,
}

impl EventLoopHandoff {
    /// Spawn the forwarding task on `handle`.
    ///
    /// The task ends once every handoff sink for it has been dropped.
    pub fn spawn(handle: &Handle, target: Arc<dyn SettledSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SettledEvent>();
        let name = format!("handoff:{}", target.name());

        handle.spawn(async move {
            while let Some(event) = rx.recv().await {
                target.dispatch(event);
            }
            crate::debug_event!("handoff", "closed", "{}", target.name());
        });

        Self { name, tx }
    }
}

impl SettledSink for EventLoopHandoff {
    fn name(&self) -> &str {
        &self.name
    }

    fn dispatch(&self, event: SettledEvent) {
        if let Err(e) = self.tx.send(event) {
            crate::debug_event!("handoff", "dropped", "runtime gone: {:?}", e.0);
        }
    }
}
