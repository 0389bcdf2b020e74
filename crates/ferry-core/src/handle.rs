//! Generation-checked handles
//!
//! Objects that cross the foreign boundary are never exposed by address.
//! The foreign side holds a `u64` made of a slot index (low 32 bits) and the
//! slot's generation (high 32 bits). Removing an entry bumps the generation,
//! so a stale handle is rejected even after its slot is reused.

use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;

/// Opaque identifier issued by a [`HandleArena`]; the raw value 0 is never issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    fn new(index: u32, generation: u32) -> Self {
        Handle(((generation as u64) << 32) | index as u64)
    }

    /// Rebuild from the raw value held by the foreign side
    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Handle(raw))
    }

    /// Raw value handed to the foreign side
    pub fn raw(self) -> u64 {
        self.0
    }

    fn index(self) -> usize {
        (self.0 & 0xffff_ffff) as usize
    }

    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    entries: Vec<Slot<T>>,
    free: Vec<u32>,
}

/// Arena owning the objects behind issued handles
///
/// Lookups take a short read lock and clone an `Arc`, so the object stays
/// alive for the caller even if another thread removes it concurrently.
pub struct HandleArena<T> {
    slots: RwLock<Slots<T>>,
}

impl<T> Default for HandleArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleArena<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slots {
                entries: Vec::new(),
                free: Vec::new(),
            }),
        }
    }

    /// Take ownership of `value` and issue a handle for it
    pub fn insert(&self, value: Arc<T>) -> Handle {
        let mut slots = self.slots.write();
        if let Some(index) = slots.free.pop() {
            let slot = &mut slots.entries[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }

        let index = slots.entries.len() as u32;
        slots.entries.push(Slot {
            generation: 1,
            value: Some(value),
        });
        Handle::new(index, 1)
    }

    /// Look up a live handle
    pub fn get(&self, raw: u64) -> Result<Arc<T>> {
        let handle = Handle::from_raw(raw).ok_or(Error::UnknownHandle(raw))?;
        let slots = self.slots.read();
        slots
            .entries
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.clone())
            .ok_or(Error::UnknownHandle(raw))
    }

    /// Invalidate a handle and hand back the arena's reference
    pub fn remove(&self, raw: u64) -> Result<Arc<T>> {
        let handle = Handle::from_raw(raw).ok_or(Error::UnknownHandle(raw))?;
        let mut slots = self.slots.write();
        let slot = slots
            .entries
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .ok_or(Error::UnknownHandle(raw))?;
        let value = slot.value.take().ok_or(Error::UnknownHandle(raw))?;

        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        slots.free.push(handle.index() as u32);
        Ok(value)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        let slots = self.slots.read();
        slots.entries.len() - slots.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let arena = HandleArena::new();
        let handle = arena.insert(Arc::new("router"));
        assert_ne!(handle.raw(), 0);
        assert_eq!(*arena.get(handle.raw()).unwrap(), "router");
        assert_eq!(arena.len(), 1);

        assert_eq!(*arena.remove(handle.raw()).unwrap(), "router");
        assert!(arena.is_empty());
        assert!(matches!(arena.get(handle.raw()), Err(Error::UnknownHandle(_))));
    }

    #[test]
    fn test_double_remove_is_rejected() {
        let arena = HandleArena::new();
        let handle = arena.insert(Arc::new(1u8));
        arena.remove(handle.raw()).unwrap();
        assert!(matches!(arena.remove(handle.raw()), Err(Error::UnknownHandle(_))));
    }

    #[test]
    fn test_stale_handle_rejected_after_slot_reuse() {
        let arena = HandleArena::new();
        let first = arena.insert(Arc::new("first"));
        arena.remove(first.raw()).unwrap();

        let second = arena.insert(Arc::new("second"));
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(arena.get(first.raw()).is_err());
        assert_eq!(*arena.get(second.raw()).unwrap(), "second");
    }

    #[test]
    fn test_null_and_foreign_values_rejected() {
        let arena: HandleArena<u8> = HandleArena::new();
        assert!(matches!(arena.get(0), Err(Error::UnknownHandle(0))));
        assert!(arena.get(0xdead_beef_0000_0007).is_err());
        assert!(arena.remove(12345).is_err());
    }

    #[test]
    fn test_value_outlives_removal_for_holders() {
        let arena = HandleArena::new();
        let handle = arena.insert(Arc::new(String::from("ctx")));
        let held = arena.get(handle.raw()).unwrap();
        arena.remove(handle.raw()).unwrap();
        assert_eq!(held.as_str(), "ctx");
    }
}
