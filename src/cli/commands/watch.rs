//! Watch command - print settled events for a directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::config::Settings;
use crate::reload::UnitTable;
use crate::watcher::{SessionManager, SettledEvent, SettledSink, SourceKind};

/// Prints every settled event to stdout.
struct PrintSink;

impl SettledSink for PrintSink {
    fn name(&self) -> &str {
        "print"
    }

    fn dispatch(&self, event: SettledEvent) {
        println!("{:<8} {}", event.kind.to_string(), event.path.display());
    }
}

pub async fn run(path: PathBuf, settings: Settings) -> anyhow::Result<()> {
    let manager = SessionManager::new(
        settings.watch.clone(),
        Arc::new(PrintSink),
        Arc::new(UnitTable::new()),
    );
    let session = manager
        .watch(&path)
        .with_context(|| format!("failed to watch {}", path.display()))?;

    if session.source_kind() == SourceKind::Polling {
        eprintln!("Native notifications unavailable; polling only sees loaded units");
    }
    eprintln!("Watching {}; press Ctrl+C to stop", session.root().display());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    manager.stop_all();
    Ok(())
}
