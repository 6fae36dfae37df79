//! Identity-preserving hot-swap registry.
//!
//! Functions and classes are keyed by `(unit, qualified name)`. The registry
//! only holds weak references: identities stay alive as long as a unit
//! namespace or some other holder keeps them. Registering an existing live
//! key swaps the contents of the stored identity and hands the same identity
//! back.
//!
//! ```text
//! register_function(unit, name, impl)
//!   key new/expired -> new FunctionIdentity, stored weakly
//!   key live        -> existing.swap(impl), same identity returned
//!
//! register_class(unit, name, bases, members)
//!   key live        -> replace bases, copy members, drop stale members,
//!                      run `reinit` on every live instance
//! ```

mod class;
mod error;
mod function;
mod value;

pub use class::{ClassIdentity, INIT_HOOK, Instance, Member, Members, REINIT_HOOK};
pub use error::{CallError, RegistryError};
pub use function::FunctionIdentity;
pub use value::{Implementation, Value};

use std::collections::HashMap;
use std::fmt;
use std::sync::Weak;

use parking_lot::RwLock;

use class::ClassSlot;
use function::FunctionSlot;

/// Identity slot key: the unit a definition came from and its qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub unit: String,
    pub name: String,
}

impl RegistryKey {
    pub fn new(unit: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.unit, self.name)
    }
}

/// Something a unit asks to bind under a name.
#[derive(Debug, Clone)]
pub enum Definition {
    Function(Implementation),
    Class {
        bases: Vec<ClassIdentity>,
        members: Members,
    },
    Value(Value),
}

/// Identity produced by [`Registry::register`].
#[derive(Debug, Clone, PartialEq)]
pub enum Defined {
    Function(FunctionIdentity),
    Class(ClassIdentity),
}

/// Key to identity tables for functions and classes.
#[derive(Default)]
pub struct Registry {
    functions: RwLock<HashMap<RegistryKey, Weak<FunctionSlot>>>,
    classes: RwLock<HashMap<RegistryKey, Weak<ClassSlot>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register any definition, rejecting kinds that cannot be hot-swapped.
    pub fn register(
        &self,
        unit: &str,
        name: &str,
        definition: Definition,
    ) -> Result<Defined, RegistryError> {
        match definition {
            Definition::Function(implementation) => Ok(Defined::Function(
                self.register_function(unit, name, implementation),
            )),
            Definition::Class { bases, members } => Ok(Defined::Class(
                self.register_class(unit, name, bases, members)?,
            )),
            Definition::Value(value) => Err(RegistryError::UnsupportedKind {
                key: RegistryKey::new(unit, name),
                kind: value.type_name(),
            }),
        }
    }

    /// Register a function, swapping the implementation of a live identity.
    pub fn register_function(
        &self,
        unit: &str,
        name: &str,
        implementation: Implementation,
    ) -> FunctionIdentity {
        let key = RegistryKey::new(unit, name);
        let mut functions = self.functions.write();

        if let Some(existing) = functions.get(&key).and_then(FunctionIdentity::upgrade) {
            crate::debug_event!("registry", "redefining function", "{key}");
            existing.swap(implementation);
            return existing;
        }

        functions.retain(|_, slot| slot.strong_count() > 0);
        let identity = FunctionIdentity::new(key.clone(), implementation);
        functions.insert(key, identity.downgrade());
        identity
    }

    /// Register a class, transplanting the definition into a live identity.
    ///
    /// A failing `reinit` hook is reported after the new members are already
    /// in place; instances after the failing one are left as they were.
    pub fn register_class(
        &self,
        unit: &str,
        name: &str,
        bases: Vec<ClassIdentity>,
        members: Members,
    ) -> Result<ClassIdentity, RegistryError> {
        let key = RegistryKey::new(unit, name);

        // Hooks run user code, which may register more definitions, so the
        // table lock is released before the swap.
        let existing = {
            let mut classes = self.classes.write();
            match classes.get(&key).and_then(ClassIdentity::upgrade) {
                Some(existing) => existing,
                None => {
                    classes.retain(|_, slot| slot.strong_count() > 0);
                    let identity = ClassIdentity::new(key.clone(), bases, members);
                    classes.insert(key, identity.downgrade());
                    return Ok(identity);
                }
            }
        };

        crate::debug_event!("registry", "redefining class", "{key}");
        existing.redefine(bases, members)?;
        Ok(existing)
    }

    pub fn function(&self, unit: &str, name: &str) -> Option<FunctionIdentity> {
        let key = RegistryKey::new(unit, name);
        self.functions
            .read()
            .get(&key)
            .and_then(FunctionIdentity::upgrade)
    }

    pub fn class(&self, unit: &str, name: &str) -> Option<ClassIdentity> {
        let key = RegistryKey::new(unit, name);
        self.classes.read().get(&key).and_then(ClassIdentity::upgrade)
    }

    /// Number of live identities.
    pub fn len(&self) -> usize {
        let functions = self
            .functions
            .read()
            .values()
            .filter(|slot| slot.strong_count() > 0)
            .count();
        let classes = self
            .classes
            .read()
            .values()
            .filter(|slot| slot.strong_count() > 0)
            .count();
        functions + classes
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.functions.read().len())
            .field("classes", &self.classes.read().len())
            .finish()
    }
}
