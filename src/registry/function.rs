//! Hot-swappable function identities.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::RegistryKey;
use super::error::CallError;
use super::value::{Implementation, Value};

pub(crate) struct FunctionSlot {
    key: RegistryKey,
    implementation: RwLock<Implementation>,
    generation: AtomicU64,
}

/// Stable handle to a function whose behavior can be replaced in place.
///
/// Every clone refers to the same slot, so a swap through the registry is
/// observed by all holders on their next call.
#[derive(Clone)]
pub struct FunctionIdentity {
    slot: Arc<FunctionSlot>,
}

impl FunctionIdentity {
    pub(crate) fn new(key: RegistryKey, implementation: Implementation) -> Self {
        Self {
            slot: Arc::new(FunctionSlot {
                key,
                implementation: RwLock::new(implementation),
                generation: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn upgrade(slot: &Weak<FunctionSlot>) -> Option<Self> {
        slot.upgrade().map(|slot| Self { slot })
    }

    pub(crate) fn downgrade(&self) -> Weak<FunctionSlot> {
        Arc::downgrade(&self.slot)
    }

    pub fn key(&self) -> &RegistryKey {
        &self.slot.key
    }

    /// Number of definitions this identity has carried, starting at 1.
    pub fn generation(&self) -> u64 {
        self.slot.generation.load(Ordering::Acquire)
    }

    /// Call the current implementation.
    ///
    /// The lock is released before the body runs, so a function may call
    /// itself or trigger a swap of itself.
    pub fn call(&self, args: &[Value]) -> Result<Value, CallError> {
        let implementation = self.implementation();
        implementation.invoke(None, args)
    }

    /// Snapshot of the current implementation.
    pub fn implementation(&self) -> Implementation {
        self.slot.implementation.read().clone()
    }

    pub fn ptr_eq(&self, other: &FunctionIdentity) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    pub(crate) fn swap(&self, implementation: Implementation) {
        *self.slot.implementation.write() = implementation;
        self.slot.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl PartialEq for FunctionIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for FunctionIdentity {}

impl fmt::Debug for FunctionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionIdentity")
            .field("key", &self.slot.key)
            .field("generation", &self.generation())
            .finish()
    }
}
