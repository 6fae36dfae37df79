//! Process-level wiring of registry, units, orchestrator and watch sessions.
//!
//! Most hosts use [`ReloadContext::global`]. Tests and embedders that need
//! isolated state build their own with [`ReloadContext::new`].

use std::path::Path;
use std::sync::{Arc, OnceLock};

use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::config::Settings;
use crate::registry::Registry;
use crate::reload::{
    CodeUnit, DiagnosticSink, Orchestrator, ReloadError, ReloadEvent, ReloadNotifier,
    ReloadResult, TracingSink, UnitLoader, UnitTable,
};
use crate::script::DefinitionLoader;
use crate::watcher::{EventLoopHandoff, SessionManager, SettledSink, WatchError, WatchSession};

static GLOBAL: OnceLock<ReloadContext> = OnceLock::new();

pub struct ReloadContext {
    settings: Settings,
    registry: Arc<Registry>,
    units: Arc<UnitTable>,
    orchestrator: Arc<Orchestrator>,
    sessions: SessionManager,
}

impl ReloadContext {
    pub fn new(
        settings: Settings,
        loader: Arc<dyn UnitLoader>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let units = Arc::new(UnitTable::new());
        let orchestrator = Arc::new(
            Orchestrator::new(registry.clone(), units.clone(), loader, diagnostics)
                .with_notifier(ReloadNotifier::default())
                .trim_traceback(settings.reload.trim_traceback),
        );
        let sessions = SessionManager::new(
            settings.watch.clone(),
            orchestrator.clone(),
            units.clone(),
        );

        Self {
            settings,
            registry,
            units,
            orchestrator,
            sessions,
        }
    }

    /// Context running definition scripts and logging failures.
    pub fn with_settings(settings: Settings) -> Self {
        Self::new(settings, Arc::new(DefinitionLoader), Arc::new(TracingSink))
    }

    /// The process-wide context, created on first use from the workspace settings.
    pub fn global() -> &'static ReloadContext {
        GLOBAL.get_or_init(|| {
            let settings = Settings::load().unwrap_or_else(|e| {
                tracing::warn!("[config] falling back to defaults: {e}");
                Settings::default()
            });
            Self::with_settings(settings)
        })
    }

    /// Load a unit named after the file stem of `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> ReloadResult<Arc<CodeUnit>> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| ReloadError::Read {
                unit: path.display().to_string(),
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no usable file name",
                ),
            })?;
        self.orchestrator.load_unit(name, path)
    }

    pub fn load_as(&self, name: &str, path: impl AsRef<Path>) -> ReloadResult<Arc<CodeUnit>> {
        self.orchestrator.load_unit(name, path)
    }

    pub fn unit(&self, name: &str) -> Option<Arc<CodeUnit>> {
        self.units.get_by_name(name)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<CodeUnit>> {
        self.orchestrator.unregister_unit(name)
    }

    /// Watch a directory; reloads run on the session's worker thread.
    pub fn watch(&self, path: impl AsRef<Path>) -> Result<WatchSession, WatchError> {
        self.sessions.watch(path)
    }

    /// Watch a directory; reloads run on the given tokio runtime.
    pub fn watch_on(&self, path: impl AsRef<Path>, handle: &Handle) -> Result<WatchSession, WatchError> {
        let orchestrator: Arc<dyn SettledSink> = self.orchestrator.clone();
        let handoff = EventLoopHandoff::spawn(handle, orchestrator);
        self.sessions.watch_with(path, Arc::new(handoff))
    }

    pub fn stop(&self, session: &WatchSession) {
        self.sessions.stop(session);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.orchestrator.notifier().subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn units(&self) -> &Arc<UnitTable> {
        &self.units
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }
}

impl Drop for ReloadContext {
    fn drop(&mut self) {
        self.sessions.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Value;
    use crate::reload::MemorySink;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_names_unit_after_file_stem() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("greeting.hr");
        fs::write(&path, "fn hello() = \"hi\"\n").unwrap();

        let context = ReloadContext::new(
            Settings::default(),
            Arc::new(DefinitionLoader),
            Arc::new(MemorySink::new()),
        );
        let unit = context.load(&path).unwrap();
        assert_eq!(unit.name(), "greeting");
        assert!(context.unit("greeting").is_some());
        assert_eq!(
            unit.function("hello").unwrap().call(&[]).unwrap(),
            Value::from("hi")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let context = ReloadContext::with_settings(Settings::default());
        let err = context.load(temp_dir.path().join("nope.hr")).unwrap_err();
        assert!(matches!(err, ReloadError::Read { .. }));
        assert!(context.units().is_empty());
    }
}
