//! Code units and the table that tracks them.
//!
//! A unit is one source file loaded under a name. Its namespace holds the
//! strong references to the identities it defined; the registry only keeps
//! weak ones, so dropping a unit lets its identities expire.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::registry::{ClassIdentity, FunctionIdentity, Value};
use crate::watcher::TrackedFiles;

use super::error::{ReloadError, ReloadResult};

/// What a top-level name in a unit is bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Function(FunctionIdentity),
    Class(ClassIdentity),
    Value(Value),
}

/// Top-level bindings of one unit generation, in definition order.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    bindings: IndexMap<String, Binding>,
}

impl Namespace {
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn function(&self, name: &str) -> Option<FunctionIdentity> {
        match self.bindings.get(name)? {
            Binding::Function(function) => Some(function.clone()),
            _ => None,
        }
    }

    pub fn class(&self, name: &str) -> Option<ClassIdentity> {
        match self.bindings.get(name)? {
            Binding::Class(class) => Some(class.clone()),
            _ => None,
        }
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        match self.bindings.get(name)? {
            Binding::Value(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, binding: Binding) {
        self.bindings.insert(name.into(), binding);
    }
}

/// Lifecycle phase of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    Loaded,
    Reloading,
}

struct UnitState {
    generation: u64,
    phase: UnitPhase,
    namespace: Arc<Namespace>,
}

/// A loaded source file.
pub struct CodeUnit {
    name: String,
    origin: PathBuf,
    state: RwLock<UnitState>,
    reload_lock: Mutex<()>,
}

impl CodeUnit {
    pub(crate) fn new(name: impl Into<String>, origin: impl Into<PathBuf>, namespace: Namespace) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            state: RwLock::new(UnitState {
                generation: 1,
                phase: UnitPhase::Loaded,
                namespace: Arc::new(namespace),
            }),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical path of the unit's source.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Number of successful loads, starting at 1.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn phase(&self) -> UnitPhase {
        self.state.read().phase
    }

    /// Bindings of the last successful load.
    pub fn namespace(&self) -> Arc<Namespace> {
        self.state.read().namespace.clone()
    }

    pub fn function(&self, name: &str) -> Option<FunctionIdentity> {
        self.state.read().namespace.function(name)
    }

    pub fn class(&self, name: &str) -> Option<ClassIdentity> {
        self.state.read().namespace.class(name)
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.state.read().namespace.value(name)
    }

    /// Serialize reloads of this unit and mark it as reloading.
    pub(crate) fn begin_reload(&self) -> ReloadGuard<'_> {
        let lock = self.reload_lock.lock();
        self.state.write().phase = UnitPhase::Reloading;
        ReloadGuard {
            unit: self,
            _lock: lock,
        }
    }
}

impl std::fmt::Debug for CodeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("CodeUnit")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("generation", &state.generation)
            .field("phase", &state.phase)
            .finish()
    }
}

/// Held while a unit reloads; returns the unit to [`UnitPhase::Loaded`] on drop.
pub(crate) struct ReloadGuard<'a> {
    unit: &'a CodeUnit,
    _lock: MutexGuard<'a, ()>,
}

impl ReloadGuard<'_> {
    /// Install the namespace of a successful reload.
    pub(crate) fn commit(self, namespace: Namespace) -> u64 {
        // Released before `Drop` takes the lock again.
        let mut state = self.unit.state.write();
        state.generation += 1;
        state.namespace = Arc::new(namespace);
        let generation = state.generation;
        drop(state);
        generation
    }
}

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        self.unit.state.write().phase = UnitPhase::Loaded;
    }
}

#[derive(Default)]
struct Tables {
    by_path: HashMap<PathBuf, Arc<CodeUnit>>,
    by_name: HashMap<String, PathBuf>,
}

/// Loaded units, keyed both by canonical path and by name.
#[derive(Default)]
pub struct UnitTable {
    tables: RwLock<Tables>,
}

impl UnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a unit unless its path is already tracked; returns the tracked unit.
    ///
    /// A name already bound to another path is a [`ReloadError::NameConflict`].
    pub(crate) fn insert(&self, unit: Arc<CodeUnit>) -> ReloadResult<Arc<CodeUnit>> {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.by_path.get(unit.origin()) {
            return Ok(existing.clone());
        }
        if let Some(existing) = tables.by_name.get(unit.name()) {
            return Err(ReloadError::NameConflict {
                unit: unit.name().to_string(),
                existing: existing.clone(),
            });
        }
        tables
            .by_name
            .insert(unit.name().to_string(), unit.origin().to_path_buf());
        tables
            .by_path
            .insert(unit.origin().to_path_buf(), unit.clone());
        Ok(unit)
    }

    pub fn get_by_path(&self, path: &Path) -> Option<Arc<CodeUnit>> {
        self.tables.read().by_path.get(path).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<CodeUnit>> {
        let tables = self.tables.read();
        let path = tables.by_name.get(name)?;
        tables.by_path.get(path).cloned()
    }

    pub(crate) fn remove_by_name(&self, name: &str) -> Option<Arc<CodeUnit>> {
        let mut tables = self.tables.write();
        let path = tables.by_name.remove(name)?;
        tables.by_path.remove(&path)
    }

    pub fn units(&self) -> Vec<Arc<CodeUnit>> {
        self.tables.read().by_path.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().by_path.is_empty()
    }
}

impl TrackedFiles for UnitTable {
    fn tracked_under(&self, root: &Path) -> Vec<PathBuf> {
        self.tables
            .read()
            .by_path
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, path: &str) -> Arc<CodeUnit> {
        let mut namespace = Namespace::default();
        namespace.insert("answer", Binding::Value(Value::Int(42)));
        Arc::new(CodeUnit::new(name, path, namespace))
    }

    #[test]
    fn test_table_lookup_by_path_and_name() {
        let table = UnitTable::new();
        table.insert(unit("a", "/src/a.hr")).unwrap();

        let by_name = table.get_by_name("a").unwrap();
        let by_path = table.get_by_path(Path::new("/src/a.hr")).unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_path));
        assert_eq!(by_name.value("answer"), Some(Value::Int(42)));
    }

    #[test]
    fn test_insert_keeps_existing_unit_for_path() {
        let table = UnitTable::new();
        let first = table.insert(unit("a", "/src/a.hr")).unwrap();
        let second = table.insert(unit("a", "/src/a.hr")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_rejects_name_bound_to_other_path() {
        let table = UnitTable::new();
        table.insert(unit("a", "/src/a.hr")).unwrap();

        let err = table.insert(unit("a", "/src/other.hr")).unwrap_err();
        assert!(matches!(
            err,
            ReloadError::NameConflict { unit: name, existing } if name == "a" && existing == Path::new("/src/a.hr")
        ));
        assert_eq!(table.len(), 1);
        assert!(table.get_by_path(Path::new("/src/other.hr")).is_none());
        assert_eq!(table.get_by_name("a").unwrap().origin(), Path::new("/src/a.hr"));
    }

    #[test]
    fn test_concurrent_inserts_keep_name_and_path_consistent() {
        let table = Arc::new(UnitTable::new());
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let table = table.clone();
                std::thread::spawn(move || table.insert(unit("a", &format!("/src/a{i}.hr"))).is_ok())
            })
            .collect();
        let inserted = workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(table.len(), 1);
        let by_name = table.get_by_name("a").unwrap();
        assert!(Arc::ptr_eq(&by_name, &table.get_by_path(by_name.origin()).unwrap()));
    }

    #[test]
    fn test_remove_by_name() {
        let table = UnitTable::new();
        table.insert(unit("a", "/src/a.hr")).unwrap();
        assert!(table.remove_by_name("a").is_some());
        assert!(table.is_empty());
        assert!(table.get_by_path(Path::new("/src/a.hr")).is_none());
    }

    #[test]
    fn test_tracked_under_filters_by_root() {
        let table = UnitTable::new();
        table.insert(unit("a", "/src/a.hr")).unwrap();
        table.insert(unit("b", "/other/b.hr")).unwrap();
        assert_eq!(
            table.tracked_under(Path::new("/src")),
            vec![PathBuf::from("/src/a.hr")]
        );
    }

    #[test]
    fn test_reload_guard_commits_generation() {
        let unit = unit("a", "/src/a.hr");
        {
            let guard = unit.begin_reload();
            assert_eq!(unit.phase(), UnitPhase::Reloading);
            assert_eq!(guard.commit(Namespace::default()), 2);
        }
        assert_eq!(unit.phase(), UnitPhase::Loaded);
        assert!(unit.namespace().is_empty());

        drop(unit.begin_reload());
        assert_eq!(unit.generation(), 2);
        assert_eq!(unit.phase(), UnitPhase::Loaded);
    }
}
