//! Hot-swappable class identities and their instances.
//!
//! A class owns its bases and an ordered member table behind a lock. Instances
//! resolve members through their class at call time, which is what makes a
//! swap visible to objects constructed before it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::RegistryKey;
use super::error::{CallError, RegistryError};
use super::value::{Implementation, Value};

/// Member invoked on every live instance after its class is redefined.
pub const REINIT_HOOK: &str = "reinit";

/// Member invoked with the constructor arguments on instantiation.
pub const INIT_HOOK: &str = "init";

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// A class-level member.
#[derive(Debug, Clone)]
pub enum Member {
    Method(Implementation),
    Value(Value),
}

/// Ordered member table of a class definition.
pub type Members = IndexMap<String, Member>;

struct ClassBody {
    bases: Vec<ClassIdentity>,
    members: Members,
}

pub(crate) struct ClassSlot {
    key: RegistryKey,
    body: RwLock<ClassBody>,
    instances: Mutex<Vec<Weak<InstanceSlot>>>,
    generation: AtomicU64,
}

/// Stable handle to a class whose bases and members can be replaced in place.
#[derive(Clone)]
pub struct ClassIdentity {
    slot: Arc<ClassSlot>,
}

impl ClassIdentity {
    pub(crate) fn new(key: RegistryKey, bases: Vec<ClassIdentity>, members: Members) -> Self {
        Self {
            slot: Arc::new(ClassSlot {
                key,
                body: RwLock::new(ClassBody { bases, members }),
                instances: Mutex::new(Vec::new()),
                generation: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn upgrade(slot: &Weak<ClassSlot>) -> Option<Self> {
        slot.upgrade().map(|slot| Self { slot })
    }

    pub(crate) fn downgrade(&self) -> Weak<ClassSlot> {
        Arc::downgrade(&self.slot)
    }

    pub fn key(&self) -> &RegistryKey {
        &self.slot.key
    }

    pub fn generation(&self) -> u64 {
        self.slot.generation.load(Ordering::Acquire)
    }

    pub fn bases(&self) -> Vec<ClassIdentity> {
        self.slot.body.read().bases.clone()
    }

    /// Names of the members defined on this class itself, in definition order.
    pub fn member_names(&self) -> Vec<String> {
        self.slot.body.read().members.keys().cloned().collect()
    }

    pub fn has_own_member(&self, name: &str) -> bool {
        self.slot.body.read().members.contains_key(name)
    }

    /// Resolve a member on this class, then depth-first through its bases.
    pub fn member(&self, name: &str) -> Option<Member> {
        let bases = {
            let body = self.slot.body.read();
            if let Some(member) = body.members.get(name) {
                return Some(member.clone());
            }
            body.bases.clone()
        };
        bases.iter().find_map(|base| base.member(name))
    }

    /// Construct a tracked instance, running the `init` member if present.
    pub fn instantiate(&self, args: &[Value]) -> Result<Instance, CallError> {
        let instance = Instance {
            slot: Arc::new(InstanceSlot {
                id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
                class: self.clone(),
                fields: RwLock::new(HashMap::new()),
            }),
        };
        self.track(&instance);

        match self.member(INIT_HOOK) {
            Some(Member::Method(init)) => {
                init.invoke(Some(&instance), args)?;
            }
            Some(Member::Value(_)) => {
                return Err(CallError::NotCallable {
                    member: INIT_HOOK.to_string(),
                });
            }
            None if !args.is_empty() => {
                return Err(CallError::Arity {
                    expected: 0,
                    got: args.len(),
                });
            }
            None => {}
        }

        Ok(instance)
    }

    /// Instances constructed from this class that are still alive.
    pub fn live_instances(&self) -> Vec<Instance> {
        let mut tracked = self.slot.instances.lock();
        tracked.retain(|weak| weak.strong_count() > 0);
        tracked
            .iter()
            .filter_map(|weak| weak.upgrade().map(|slot| Instance { slot }))
            .collect()
    }

    pub fn instance_count(&self) -> usize {
        let mut tracked = self.slot.instances.lock();
        tracked.retain(|weak| weak.strong_count() > 0);
        tracked.len()
    }

    pub fn ptr_eq(&self, other: &ClassIdentity) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    fn track(&self, instance: &Instance) {
        let mut tracked = self.slot.instances.lock();
        tracked.retain(|weak| weak.strong_count() > 0);
        tracked.push(Arc::downgrade(&instance.slot));
    }

    /// Transplant a new definition into this identity.
    ///
    /// Members are written straight into the table; members missing from the
    /// new definition are removed. The swap is committed before any
    /// `reinit` hook runs, and the first failing hook stops the rest.
    pub(crate) fn redefine(
        &self,
        bases: Vec<ClassIdentity>,
        members: Members,
    ) -> Result<(), RegistryError> {
        {
            let mut body = self.slot.body.write();
            body.bases = bases;
            body.members.retain(|name, _| members.contains_key(name));
            for (name, member) in members {
                body.members.insert(name, member);
            }
        }
        self.slot.generation.fetch_add(1, Ordering::AcqRel);

        let hook = match self.member(REINIT_HOOK) {
            Some(Member::Method(hook)) => hook,
            Some(Member::Value(_)) => {
                return Err(RegistryError::Hook {
                    key: self.key().clone(),
                    source: CallError::NotCallable {
                        member: REINIT_HOOK.to_string(),
                    },
                });
            }
            None => return Ok(()),
        };

        for instance in self.live_instances() {
            hook.invoke(Some(&instance), &[])
                .map_err(|source| RegistryError::Hook {
                    key: self.key().clone(),
                    source,
                })?;
        }

        Ok(())
    }
}

impl PartialEq for ClassIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ClassIdentity {}

impl fmt::Debug for ClassIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassIdentity")
            .field("key", &self.slot.key)
            .field("generation", &self.generation())
            .field("members", &self.member_names())
            .finish()
    }
}

struct InstanceSlot {
    id: u64,
    class: ClassIdentity,
    fields: RwLock<HashMap<String, Value>>,
}

/// An object constructed from a [`ClassIdentity`].
///
/// The host owns instances; the class only keeps weak references to them.
#[derive(Clone)]
pub struct Instance {
    slot: Arc<InstanceSlot>,
}

impl Instance {
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    pub fn class(&self) -> &ClassIdentity {
        &self.slot.class
    }

    /// Read an instance field, falling back to a class-level value.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.slot.fields.read().get(name) {
            return Some(value.clone());
        }
        match self.slot.class.member(name) {
            Some(Member::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.slot.fields.write().insert(name.into(), value);
    }

    /// Call a method resolved through the class as it is defined right now.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, CallError> {
        match self.slot.class.member(name) {
            Some(Member::Method(method)) => method.invoke(Some(self), args),
            Some(Member::Value(_)) => Err(CallError::NotCallable {
                member: name.to_string(),
            }),
            None => Err(CallError::NoSuchMember {
                class: self.slot.class.key().name.clone(),
                member: name.to_string(),
            }),
        }
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.slot.id)
            .field("class", &self.slot.class.key())
            .finish_non_exhaustive()
    }
}
