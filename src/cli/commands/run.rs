//! Run command - load a script, call its entry function, reload on change.

use std::path::PathBuf;

use anyhow::Context;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;

use crate::config::Settings;
use crate::context::ReloadContext;
use crate::reload::{CodeUnit, ReloadEvent};

pub async fn run(file: PathBuf, entry: Option<String>, settings: Settings) -> anyhow::Result<()> {
    let entry = entry.unwrap_or_else(|| settings.reload.entry.clone());
    let context = ReloadContext::with_settings(settings);
    let mut events = context.subscribe();

    let unit = context
        .load(&file)
        .with_context(|| format!("failed to load {}", file.display()))?;
    call_entry(&unit, &entry);

    let session = context
        .watch_on(&file, &Handle::current())
        .with_context(|| format!("failed to watch {}", file.display()))?;
    eprintln!(
        "Watching {} ({:?}); press Ctrl+C to stop",
        session.root().display(),
        session.source_kind()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                eprintln!("Received shutdown signal");
                break;
            }
            event = events.recv() => match event {
                Ok(ReloadEvent::Reloaded { unit: name, generation }) if name == unit.name() => {
                    eprintln!("Reloaded '{name}' (generation {generation})");
                    call_entry(&unit, &entry);
                }
                Ok(ReloadEvent::ReloadFailed { unit: name, message }) => {
                    eprintln!("Reload of '{name}' failed: {message}");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("[run] missed {skipped} reload events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    context.stop(&session);
    Ok(())
}

fn call_entry(unit: &CodeUnit, entry: &str) {
    let Some(function) = unit.function(entry) else {
        eprintln!("Unit '{}' defines no function '{entry}'", unit.name());
        return;
    };
    match function.call(&[]) {
        Ok(value) => println!("{value}"),
        Err(e) => eprintln!("{entry}() failed: {e}"),
    }
}
