//! Turns settled file events into unit reloads.
//!
//! ```text
//! SettledEvent --> UnitTable lookup (untracked paths are ignored)
//!   Created/Modified -> reload_unit
//!   Deleted          -> keep the last loaded generation
//!
//! reload_unit: read source -> UnitLoader::load into a fresh LoadScope
//!   ok  -> install namespace, generation += 1, ReloadEvent::Reloaded
//!   err -> Diagnostic to the sink, old namespace stays, ReloadEvent::ReloadFailed
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::diagnostic::{Diagnostic, DiagnosticSink, Frame};
use super::error::{ReloadError, ReloadResult};
use super::loader::{LoadScope, UnitLoader, UnitSource};
use super::notify::{ReloadEvent, ReloadNotifier};
use super::unit::{CodeUnit, Namespace, UnitTable};
use crate::registry::Registry;
use crate::watcher::{EventKind, SettledEvent, SettledSink};
use crate::{debug_event, log_event};

pub struct Orchestrator {
    registry: Arc<Registry>,
    units: Arc<UnitTable>,
    loader: Arc<dyn UnitLoader>,
    diagnostics: Arc<dyn DiagnosticSink>,
    notifier: ReloadNotifier,
    trim_traceback: bool,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<Registry>,
        units: Arc<UnitTable>,
        loader: Arc<dyn UnitLoader>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            registry,
            units,
            loader,
            diagnostics,
            notifier: ReloadNotifier::default(),
            trim_traceback: true,
        }
    }

    pub fn with_notifier(mut self, notifier: ReloadNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Whether failure reports drop frames outside the failing unit.
    pub fn trim_traceback(mut self, trim: bool) -> Self {
        self.trim_traceback = trim;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn units(&self) -> &Arc<UnitTable> {
        &self.units
    }

    pub fn notifier(&self) -> &ReloadNotifier {
        &self.notifier
    }

    pub fn unit(&self, name: &str) -> Option<Arc<CodeUnit>> {
        self.units.get_by_name(name)
    }

    /// Load `path` as unit `name` and start tracking it.
    ///
    /// Loading a path that is already tracked reloads it instead. A failed
    /// first load leaves nothing tracked.
    pub fn load_unit(&self, name: &str, path: impl AsRef<Path>) -> ReloadResult<Arc<CodeUnit>> {
        let path = path.as_ref();
        let origin = path.canonicalize().map_err(|source| ReloadError::Read {
            unit: name.to_string(),
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(existing) = self.units.get_by_path(&origin) {
            self.reload_unit(&existing)?;
            return Ok(existing);
        }
        if let Some(other) = self.units.get_by_name(name) {
            return Err(ReloadError::NameConflict {
                unit: name.to_string(),
                existing: other.origin().to_path_buf(),
            });
        }

        let namespace = match self.execute(name, &origin) {
            Ok(namespace) => namespace,
            Err(e) => {
                self.notifier.send(ReloadEvent::ReloadFailed {
                    unit: name.to_string(),
                    message: e.summary(),
                });
                return Err(e);
            }
        };
        // A concurrent load may have claimed the name since the check above.
        let unit = self
            .units
            .insert(Arc::new(CodeUnit::new(name, origin.clone(), namespace)))?;

        log_event!("reload", "loaded", "{name} from {}", origin.display());
        self.notifier.send(ReloadEvent::Loaded {
            unit: name.to_string(),
            path: origin,
        });
        Ok(unit)
    }

    /// Re-execute a unit's current source, swapping its definitions in place.
    ///
    /// Returns the new generation. On failure the unit keeps the namespace of
    /// its last successful load, though definitions registered before the
    /// failure point stay swapped.
    pub fn reload_unit(&self, unit: &CodeUnit) -> ReloadResult<u64> {
        let guard = unit.begin_reload();
        match self.execute(unit.name(), unit.origin()) {
            Ok(namespace) => {
                let generation = guard.commit(namespace);
                log_event!("reload", "reloaded", "{} (generation {generation})", unit.name());
                self.notifier.send(ReloadEvent::Reloaded {
                    unit: unit.name().to_string(),
                    generation,
                });
                Ok(generation)
            }
            Err(e) => {
                drop(guard);
                self.notifier.send(ReloadEvent::ReloadFailed {
                    unit: unit.name().to_string(),
                    message: e.summary(),
                });
                Err(e)
            }
        }
    }

    /// Stop tracking a unit. Its identities expire once nothing else holds them.
    pub fn unregister_unit(&self, name: &str) -> Option<Arc<CodeUnit>> {
        let unit = self.units.remove_by_name(name)?;
        log_event!("reload", "unregistered", "{name}");
        self.notifier.send(ReloadEvent::Unregistered {
            unit: name.to_string(),
        });
        Some(unit)
    }

    /// React to one settled filesystem event.
    pub fn on_settled(&self, event: &SettledEvent) {
        let unit = self.units.get_by_path(&event.path).or_else(|| {
            let canonical = event.path.canonicalize().ok()?;
            self.units.get_by_path(&canonical)
        });
        let Some(unit) = unit else {
            debug_event!("reload", "untracked", "{}", event.path.display());
            return;
        };

        match event.kind {
            EventKind::Deleted => {
                tracing::warn!(
                    "[reload] source of '{}' was deleted; keeping generation {}",
                    unit.name(),
                    unit.generation()
                );
            }
            EventKind::Created | EventKind::Modified => {
                debug_event!("reload", "reloading", "{} ({})", unit.name(), event.kind);
                // Failures were already reported to the diagnostic sink.
                let _ = self.reload_unit(&unit);
            }
        }
    }

    fn execute(&self, name: &str, origin: &Path) -> ReloadResult<Namespace> {
        let text = match fs::read_to_string(origin) {
            Ok(text) => text,
            Err(source) => {
                let err = ReloadError::Read {
                    unit: name.to_string(),
                    path: origin.to_path_buf(),
                    source,
                };
                self.report(name, origin, &err, None);
                return Err(err);
            }
        };

        let source = UnitSource {
            name,
            origin,
            text: &text,
        };
        let mut scope = LoadScope::new(name, origin, &self.registry);
        match self.loader.load(&source, &mut scope) {
            Ok(()) => Ok(scope.into_namespace()),
            Err(source) => {
                let err = ReloadError::Load {
                    unit: name.to_string(),
                    source,
                };
                self.report(name, origin, &err, Some(&text));
                Err(err)
            }
        }
    }

    fn report(&self, name: &str, origin: &Path, error: &ReloadError, text: Option<&str>) {
        let mut frames = vec![Frame::internal(file!(), line!(), "Orchestrator::execute")];
        frames.extend(error.frames());

        let diagnostic = Diagnostic::new(name, origin, frames, error.summary())
            .with_source(text)
            .trimmed(self.trim_traceback);
        self.diagnostics.report(&diagnostic);
    }
}

impl SettledSink for Orchestrator {
    fn name(&self) -> &str {
        "orchestrator"
    }

    fn dispatch(&self, event: SettledEvent) {
        self.on_settled(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Implementation, Value};
    use crate::reload::diagnostic::MemorySink;
    use crate::reload::error::LoadError;
    use tempfile::TempDir;

    /// Binds `f` to the integer on the first line; fails on anything else.
    struct NumberLoader;

    impl UnitLoader for NumberLoader {
        fn load(&self, source: &UnitSource<'_>, scope: &mut LoadScope<'_>) -> Result<(), LoadError> {
            let first = source.text.lines().next().unwrap_or_default();
            let value: i64 = first.trim().parse().map_err(|_| {
                LoadError::syntax(
                    format!("not a number: {first:?}"),
                    Frame::new(source.origin, Some(1), format!("<unit {}>", source.name)),
                )
            })?;
            scope.define_function("f", Implementation::constant(Value::Int(value)));
            Ok(())
        }
    }

    fn orchestrator(trim: bool) -> (Orchestrator, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let orchestrator = Orchestrator::new(
            Arc::new(Registry::new()),
            Arc::new(UnitTable::new()),
            Arc::new(NumberLoader),
            sink.clone(),
        )
        .trim_traceback(trim);
        (orchestrator, sink)
    }

    #[test]
    fn test_reload_swaps_function_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.num");
        fs::write(&path, "1\n").unwrap();

        let (orchestrator, sink) = orchestrator(true);
        let unit = orchestrator.load_unit("a", &path).unwrap();
        let f = unit.function("f").unwrap();
        assert_eq!(f.call(&[]).unwrap(), Value::Int(1));

        fs::write(&path, "2\n").unwrap();
        assert_eq!(orchestrator.reload_unit(&unit).unwrap(), 2);
        assert_eq!(f.call(&[]).unwrap(), Value::Int(2));
        assert!(unit.function("f").unwrap().ptr_eq(&f));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_failed_reload_keeps_previous_generation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.num");
        fs::write(&path, "1\n").unwrap();

        let (orchestrator, sink) = orchestrator(true);
        let mut events = orchestrator.notifier().subscribe();
        let unit = orchestrator.load_unit("a", &path).unwrap();
        let f = unit.function("f").unwrap();

        fs::write(&path, "oops\n").unwrap();
        assert!(orchestrator.reload_unit(&unit).is_err());
        assert_eq!(unit.generation(), 1);
        assert_eq!(f.call(&[]).unwrap(), Value::Int(1));

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].frames.len(), 1);
        assert_eq!(reports[0].frames[0].line, Some(1));
        assert!(reports[0].to_string().contains("not a number"));

        assert!(matches!(events.try_recv().unwrap(), ReloadEvent::Loaded { .. }));
        assert!(matches!(events.try_recv().unwrap(), ReloadEvent::ReloadFailed { .. }));
    }

    #[test]
    fn test_untrimmed_report_keeps_internal_frames() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.num");
        fs::write(&path, "x\n").unwrap();

        let (orchestrator, sink) = orchestrator(false);
        assert!(orchestrator.load_unit("a", &path).is_err());
        assert!(orchestrator.units().is_empty());
        assert_eq!(sink.reports()[0].frames.len(), 2);
    }

    #[test]
    fn test_settled_events_route_by_kind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.num");
        fs::write(&path, "1\n").unwrap();

        let (orchestrator, _sink) = orchestrator(true);
        let unit = orchestrator.load_unit("a", &path).unwrap();
        let origin = unit.origin().to_path_buf();

        fs::write(&path, "5\n").unwrap();
        orchestrator.dispatch(SettledEvent {
            path: origin.clone(),
            kind: EventKind::Modified,
        });
        assert_eq!(unit.generation(), 2);

        orchestrator.dispatch(SettledEvent {
            path: origin,
            kind: EventKind::Deleted,
        });
        assert_eq!(unit.generation(), 2);

        orchestrator.dispatch(SettledEvent {
            path: temp_dir.path().join("untracked.num"),
            kind: EventKind::Modified,
        });
        assert_eq!(orchestrator.units().len(), 1);
    }

    #[test]
    fn test_name_conflict_and_unregister() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.num");
        let b = temp_dir.path().join("b.num");
        fs::write(&a, "1\n").unwrap();
        fs::write(&b, "2\n").unwrap();

        let (orchestrator, _sink) = orchestrator(true);
        let unit = orchestrator.load_unit("a", &a).unwrap();
        let f = unit.function("f").unwrap();
        drop(unit);

        assert!(matches!(
            orchestrator.load_unit("a", &b),
            Err(ReloadError::NameConflict { .. })
        ));

        assert!(orchestrator.unregister_unit("a").is_some());
        assert!(orchestrator.unit("a").is_none());
        // The registry entry survives only while the host still holds it.
        assert!(orchestrator.registry().function("a", "f").is_some());
        drop(f);
        assert!(orchestrator.registry().function("a", "f").is_none());
    }
}
