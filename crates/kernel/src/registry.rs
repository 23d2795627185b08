//! Handle registry.
//!
//! A generation-checked arena mapping handles to live objects. Allocation,
//! destruction and signalling take the write lock, so no caller can observe
//! a half-destroyed slot; lookups take the read lock and hand out an `Arc`
//! to the object, which stays usable by the caller even if the handle is
//! destroyed concurrently.
//!
//! # Slot reuse
//!
//! New slots are preferred until the configured capacity is reached; after
//! that freed slots are recycled oldest-first, each time under a new
//! generation. A slot whose generation is exhausted is retired for good, so
//! a handle value is never issued twice.

use crate::handle::{Handle, ObjectKind, MAX_GENERATION, MAX_INDEX};
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

enum SlotState<T> {
    Vacant,
    Live(Entry<T>),
    /// Destroyed by an external event; the object is gone but the handle
    /// stays reserved until the owner destroys it.
    Signalled { kind: ObjectKind },
    Retired,
}

struct Entry<T> {
    kind: ObjectKind,
    object: Arc<T>,
    depends_on: Option<Handle>,
}

struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

struct Inner<T> {
    slots: Vec<Slot<T>>,
    free: VecDeque<u32>,
    live: usize,
}

pub struct HandleRegistry<T> {
    inner: RwLock<Inner<T>>,
    capacity: usize,
}

impl<T> HandleRegistry<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_INDEX as usize + 1);
        Self {
            inner: RwLock::new(Inner {
                slots: Vec::new(),
                free: VecDeque::new(),
                live: 0,
            }),
            capacity,
        }
    }

    /// Register an object. `depends_on` names the object whose destruction
    /// signals this one.
    pub fn allocate(
        &self,
        kind: ObjectKind,
        object: T,
        depends_on: Option<Handle>,
    ) -> CryptResult<Handle> {
        let mut inner = self.inner.write();
        let index = if inner.slots.len() < self.capacity {
            inner.slots.push(Slot {
                generation: 1,
                state: SlotState::Vacant,
            });
            (inner.slots.len() - 1) as u32
        } else {
            inner.free.pop_front().ok_or_else(|| {
                CryptError::new(ErrorCode::Overflow).with_detail("object table full")
            })?
        };

        let slot = &mut inner.slots[index as usize];
        slot.state = SlotState::Live(Entry {
            kind,
            object: Arc::new(object),
            depends_on,
        });
        let handle = Handle::new(index, slot.generation);
        inner.live += 1;
        Ok(handle)
    }

    fn slot<'a>(inner: &'a Inner<T>, handle: Handle) -> CryptResult<&'a Slot<T>> {
        inner
            .slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .ok_or_else(|| CryptError::new(ErrorCode::NotInited))
    }

    /// Look up a live object.
    ///
    /// Unknown or destroyed handles fail with `NotInited`; signalled handles
    /// fail with `Signalled`.
    pub fn resolve(&self, handle: Handle) -> CryptResult<(ObjectKind, Arc<T>)> {
        let inner = self.inner.read();
        match &Self::slot(&inner, handle)?.state {
            SlotState::Live(entry) => Ok((entry.kind, Arc::clone(&entry.object))),
            SlotState::Signalled { .. } => Err(CryptError::new(ErrorCode::Signalled)),
            SlotState::Vacant | SlotState::Retired => Err(CryptError::new(ErrorCode::NotInited)),
        }
    }

    /// Kind of a live or signalled handle.
    pub fn kind_of(&self, handle: Handle) -> CryptResult<ObjectKind> {
        let inner = self.inner.read();
        match &Self::slot(&inner, handle)?.state {
            SlotState::Live(entry) => Ok(entry.kind),
            SlotState::Signalled { kind } => Ok(*kind),
            SlotState::Vacant | SlotState::Retired => Err(CryptError::new(ErrorCode::NotInited)),
        }
    }

    pub fn depends_on(&self, handle: Handle) -> CryptResult<Option<Handle>> {
        let inner = self.inner.read();
        match &Self::slot(&inner, handle)?.state {
            SlotState::Live(entry) => Ok(entry.depends_on),
            SlotState::Signalled { .. } => Err(CryptError::new(ErrorCode::Signalled)),
            SlotState::Vacant | SlotState::Retired => Err(CryptError::new(ErrorCode::NotInited)),
        }
    }

    /// Destroy a handle and signal everything that depends on it.
    ///
    /// Returns the object if it was still live, plus the handles that were
    /// signalled as a consequence.
    pub fn destroy(&self, handle: Handle) -> CryptResult<(Option<Arc<T>>, Vec<Handle>)> {
        let mut inner = self.inner.write();
        Self::slot(&inner, handle)?;
        let index = handle.index() as usize;

        let object = match std::mem::replace(&mut inner.slots[index].state, SlotState::Vacant) {
            SlotState::Live(entry) => {
                inner.live -= 1;
                Some(entry.object)
            }
            SlotState::Signalled { .. } => None,
            state @ (SlotState::Vacant | SlotState::Retired) => {
                inner.slots[index].state = state;
                return Err(CryptError::new(ErrorCode::NotInited));
            }
        };
        Self::release_slot(&mut inner, index);
        let signalled = Self::signal_dependents(&mut inner, handle);
        Ok((object, signalled))
    }

    /// Mark a handle as destroyed by an external event, cascading to its
    /// dependants. Returns every handle that changed state.
    pub fn signal(&self, handle: Handle) -> CryptResult<Vec<Handle>> {
        let mut inner = self.inner.write();
        let kind = match &Self::slot(&inner, handle)?.state {
            SlotState::Live(entry) => entry.kind,
            SlotState::Signalled { .. } => return Ok(Vec::new()),
            SlotState::Vacant | SlotState::Retired => {
                return Err(CryptError::new(ErrorCode::NotInited))
            }
        };
        inner.slots[handle.index() as usize].state = SlotState::Signalled { kind };
        inner.live -= 1;
        let mut changed = vec![handle];
        changed.extend(Self::signal_dependents(&mut inner, handle));
        Ok(changed)
    }

    /// Signal only the dependants of `handle`, leaving it live.
    pub fn signal_dependents_of(&self, handle: Handle) -> Vec<Handle> {
        let mut inner = self.inner.write();
        Self::signal_dependents(&mut inner, handle)
    }

    fn signal_dependents(inner: &mut Inner<T>, root: Handle) -> Vec<Handle> {
        let mut signalled = Vec::new();
        let mut pending = vec![root];
        while let Some(parent) = pending.pop() {
            for (index, slot) in inner.slots.iter_mut().enumerate() {
                let (kind, depends_on) = match &slot.state {
                    SlotState::Live(entry) => (entry.kind, entry.depends_on),
                    _ => continue,
                };
                if depends_on == Some(parent) {
                    let child = Handle::new(index as u32, slot.generation);
                    slot.state = SlotState::Signalled { kind };
                    inner.live -= 1;
                    signalled.push(child);
                    pending.push(child);
                }
            }
        }
        signalled
    }

    fn release_slot(inner: &mut Inner<T>, index: usize) {
        let slot = &mut inner.slots[index];
        if slot.generation >= MAX_GENERATION {
            slot.state = SlotState::Retired;
        } else {
            slot.generation += 1;
            slot.state = SlotState::Vacant;
            inner.free.push_back(index as u32);
        }
    }

    /// Handles of all live objects, in slot order.
    pub fn live_handles(&self) -> Vec<(Handle, ObjectKind)> {
        let inner = self.inner.read();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.state {
                SlotState::Live(entry) => Some((Handle::new(index as u32, slot.generation), entry.kind)),
                _ => None,
            })
            .collect()
    }

    /// Live objects whose dependency is `handle`.
    pub fn dependents(&self, handle: Handle) -> Vec<Handle> {
        let inner = self.inner.read();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.state {
                SlotState::Live(entry) if entry.depends_on == Some(handle) => {
                    Some(Handle::new(index as u32, slot.generation))
                }
                _ => None,
            })
            .collect()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.inner.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_resolve_destroy() {
        let registry = HandleRegistry::new(8);
        let h = registry.allocate(ObjectKind::Context, "ctx", None).unwrap();
        let (kind, obj) = registry.resolve(h).unwrap();
        assert_eq!(kind, ObjectKind::Context);
        assert_eq!(*obj, "ctx");
        assert_eq!(registry.len(), 1);

        let (object, signalled) = registry.destroy(h).unwrap();
        assert!(object.is_some());
        assert!(signalled.is_empty());
        assert_eq!(registry.resolve(h).unwrap_err().kind(), ErrorCode::NotInited);
        assert_eq!(registry.destroy(h).unwrap_err().kind(), ErrorCode::NotInited);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_destroyed_handle_never_revalidated() {
        let registry = HandleRegistry::new(1);
        let first = registry.allocate(ObjectKind::Envelope, 1, None).unwrap();
        registry.destroy(first).unwrap();
        let second = registry.allocate(ObjectKind::Envelope, 2, None).unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(registry.resolve(first).is_err());
        assert_eq!(*registry.resolve(second).unwrap().1, 2);
    }

    #[test]
    fn test_capacity_exhaustion() {
        let registry = HandleRegistry::new(2);
        registry.allocate(ObjectKind::User, (), None).unwrap();
        registry.allocate(ObjectKind::User, (), None).unwrap();
        let err = registry.allocate(ObjectKind::User, (), None).unwrap_err();
        assert_eq!(err.kind(), ErrorCode::Overflow);
    }

    #[test]
    fn test_fifo_reuse() {
        let registry = HandleRegistry::new(3);
        let a = registry.allocate(ObjectKind::Context, 'a', None).unwrap();
        let b = registry.allocate(ObjectKind::Context, 'b', None).unwrap();
        let _c = registry.allocate(ObjectKind::Context, 'c', None).unwrap();
        registry.destroy(b).unwrap();
        registry.destroy(a).unwrap();
        let next = registry.allocate(ObjectKind::Context, 'd', None).unwrap();
        assert_eq!(next.index(), b.index());
    }

    #[test]
    fn test_generation_exhaustion_retires_slot() {
        let registry = HandleRegistry::new(1);
        registry.inner.write().slots.push(Slot {
            generation: MAX_GENERATION,
            state: SlotState::Vacant,
        });
        registry.inner.write().free.push_back(0);
        let h = registry.allocate(ObjectKind::Context, (), None).unwrap();
        assert_eq!(h.generation(), MAX_GENERATION);
        registry.destroy(h).unwrap();
        assert_eq!(
            registry.allocate(ObjectKind::Context, (), None).unwrap_err().kind(),
            ErrorCode::Overflow
        );
    }

    #[test]
    fn test_destroy_signals_dependents() {
        let registry = HandleRegistry::new(8);
        let device = registry.allocate(ObjectKind::Device, "dev", None).unwrap();
        let ctx = registry.allocate(ObjectKind::Context, "ctx", Some(device)).unwrap();
        let grandchild = registry.allocate(ObjectKind::Envelope, "env", Some(ctx)).unwrap();
        let other = registry.allocate(ObjectKind::Context, "other", None).unwrap();

        let (_, signalled) = registry.destroy(device).unwrap();
        assert_eq!(signalled, vec![ctx, grandchild]);
        assert_eq!(registry.resolve(ctx).unwrap_err().kind(), ErrorCode::Signalled);
        assert_eq!(registry.kind_of(ctx).unwrap(), ObjectKind::Context);
        assert!(registry.resolve(other).is_ok());

        let (object, _) = registry.destroy(ctx).unwrap();
        assert!(object.is_none());
        assert_eq!(registry.resolve(ctx).unwrap_err().kind(), ErrorCode::NotInited);
    }

    #[test]
    fn test_signal_in_place() {
        let registry = HandleRegistry::new(4);
        let user = registry.allocate(ObjectKind::User, 0, None).unwrap();
        let ctx = registry.allocate(ObjectKind::Context, 1, Some(user)).unwrap();
        let changed = registry.signal(user).unwrap();
        assert_eq!(changed, vec![user, ctx]);
        assert!(registry.signal(user).unwrap().is_empty());
        assert_eq!(registry.len(), 0);
    }
}
