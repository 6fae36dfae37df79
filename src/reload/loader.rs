//! Seam between the orchestrator and whatever executes unit source.

use std::path::Path;
use std::sync::Arc;

use super::error::LoadError;
use super::unit::{Binding, Namespace};
use crate::registry::{
    ClassIdentity, Definition, Defined, FunctionIdentity, Implementation, Members, Registry,
    RegistryError, Value,
};

/// Source text of a unit about to be executed.
#[derive(Debug, Clone, Copy)]
pub struct UnitSource<'a> {
    pub name: &'a str,
    pub origin: &'a Path,
    pub text: &'a str,
}

/// Executes unit source, binding its definitions through a [`LoadScope`].
///
/// A loader must report failures before registering anything it cannot
/// finish; whatever it did register stays registered.
pub trait UnitLoader: Send + Sync {
    fn load(&self, source: &UnitSource<'_>, scope: &mut LoadScope<'_>) -> Result<(), LoadError>;
}

/// Definitions made by one execution of a unit.
///
/// Functions and classes go through the registry so that earlier identities
/// are swapped in place; everything ends up in a fresh namespace that the
/// orchestrator installs only if the whole load succeeds.
pub struct LoadScope<'a> {
    unit: &'a str,
    origin: &'a Path,
    registry: &'a Arc<Registry>,
    namespace: Namespace,
}

impl<'a> LoadScope<'a> {
    pub(crate) fn new(unit: &'a str, origin: &'a Path, registry: &'a Arc<Registry>) -> Self {
        Self {
            unit,
            origin,
            registry,
            namespace: Namespace::default(),
        }
    }

    pub fn unit(&self) -> &str {
        self.unit
    }

    pub fn origin(&self) -> &Path {
        self.origin
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.registry
    }

    pub fn define_function(&mut self, name: &str, implementation: Implementation) -> FunctionIdentity {
        let identity = self
            .registry
            .register_function(self.unit, name, implementation);
        self.namespace
            .insert(name, Binding::Function(identity.clone()));
        identity
    }

    pub fn define_class(
        &mut self,
        name: &str,
        bases: Vec<ClassIdentity>,
        members: Members,
    ) -> Result<ClassIdentity, RegistryError> {
        let identity = self
            .registry
            .register_class(self.unit, name, bases, members)?;
        self.namespace.insert(name, Binding::Class(identity.clone()));
        Ok(identity)
    }

    /// Bind any definition; plain values are bound without registration.
    pub fn define(&mut self, name: &str, definition: Definition) -> Result<Binding, RegistryError> {
        let binding = match definition {
            Definition::Value(value) => Binding::Value(value),
            definition => match self.registry.register(self.unit, name, definition)? {
                Defined::Function(function) => Binding::Function(function),
                Defined::Class(class) => Binding::Class(class),
            },
        };
        self.namespace.insert(name, binding.clone());
        Ok(binding)
    }

    pub fn bind_value(&mut self, name: &str, value: Value) {
        self.namespace.insert(name, Binding::Value(value));
    }

    /// Class bound earlier in this execution.
    pub fn class(&self, name: &str) -> Option<ClassIdentity> {
        self.namespace.class(name)
    }

    /// Function bound earlier in this execution.
    pub fn function(&self, name: &str) -> Option<FunctionIdentity> {
        self.namespace.function(name)
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub(crate) fn into_namespace(self) -> Namespace {
        self.namespace
    }
}
