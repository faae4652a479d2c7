//! Generation-checked slot storage for module matrices
//!
//! Released slots are recycled, but each reuse bumps the slot generation.
//! An id carries the generation it was issued with, so stale ids never alias
//! a newer matrix.

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::matrix::MatrixId;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slab of values addressed by [`MatrixId`].
pub struct GenerationalArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> GenerationalArena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store `value` and return its id, reusing a released slot if any.
    pub fn insert(&mut self, value: T) -> MatrixId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            debug!(index, generation = slot.generation, "Reusing arena slot");
            return MatrixId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        MatrixId::new(index, 0)
    }

    /// Borrow the value behind `id`; stale ids yield `UseAfterRelease`.
    pub fn get(&self, id: MatrixId) -> Result<&T> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_ref())
            .ok_or(BridgeError::UseAfterRelease(id))
    }

    pub fn get_mut(&mut self, id: MatrixId) -> Result<&mut T> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_mut())
            .ok_or(BridgeError::UseAfterRelease(id))
    }

    /// Take the value out and retire the id; stale ids yield `DoubleRelease`.
    pub fn remove(&mut self, id: MatrixId) -> Result<T> {
        let slot = self
            .slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .ok_or(BridgeError::DoubleRelease(id))?;
        let value = slot.value.take().ok_or(BridgeError::DoubleRelease(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.live -= 1;
        Ok(value)
    }

    pub fn contains(&self, id: MatrixId) -> bool {
        self.get(id).is_ok()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl<T> Default for GenerationalArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = GenerationalArena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(*arena.get(a).unwrap(), "a");
        assert_eq!(*arena.get(b).unwrap(), "b");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_reused_slot_rejects_stale_id() {
        let mut arena = GenerationalArena::new();
        let old = arena.insert(1);
        arena.remove(old).unwrap();

        let new = arena.insert(2);
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());

        assert!(matches!(arena.get(old), Err(BridgeError::UseAfterRelease(_))));
        assert_eq!(*arena.get(new).unwrap(), 2);
    }

    #[test]
    fn test_double_remove() {
        let mut arena = GenerationalArena::new();
        let id = arena.insert(5u8);
        assert_eq!(arena.remove(id).unwrap(), 5);
        assert!(matches!(arena.remove(id), Err(BridgeError::DoubleRelease(_))));
        assert!(arena.is_empty());
    }

    #[test]
    fn test_unknown_index() {
        let arena = GenerationalArena::<u8>::default();
        let bogus = MatrixId::new(42, 0);
        assert!(!arena.contains(bogus));
        assert!(matches!(arena.get(bogus), Err(BridgeError::UseAfterRelease(_))));
    }

    #[test]
    fn test_get_mut() {
        let mut arena = GenerationalArena::new();
        let id = arena.insert(vec![1u8]);
        arena.get_mut(id).unwrap().push(2);
        assert_eq!(arena.get(id).unwrap(), &vec![1, 2]);
    }
}
