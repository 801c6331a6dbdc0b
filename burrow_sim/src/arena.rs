// Generational slab storage for scheduler-owned entities.
//
// Tasks and agents live in `Arena<T>`s owned by the `Scheduler`. Cross
// references between them are `TaskId`/`AgentId` handles (slot index plus
// generation), never pointers, so a task and its agent can refer to each
// other without a reference cycle. Removing a value bumps the slot's
// generation, which makes every outstanding handle to it stale: `get` on a
// stale handle returns `None` instead of aliasing whatever reuses the slot.
//
// Freed slots are reused lowest-index-first (the free list is a min-heap),
// so allocation order depends only on the sequence of inserts and removes.
//
// See also: `types.rs` for the `arena_id!` handle types, `scheduler.rs` for
// the owner.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::marker::PhantomData;

/// Implemented by handle types produced by `arena_id!`.
pub trait ArenaId: Copy {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn index(self) -> u32;
    fn generation(self) -> u32;
}

#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slab of `T` addressed by generational handles of type `I`.
#[derive(Clone, Debug)]
pub struct Arena<I, T> {
    slots: Vec<Slot<T>>,
    free: BinaryHeap<Reverse<u32>>,
    len: usize,
    _id: PhantomData<I>,
}

impl<I, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: BinaryHeap::new(),
            len: 0,
            _id: PhantomData,
        }
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value and return its handle.
    pub fn insert(&mut self, value: T) -> I {
        self.len += 1;
        if let Some(Reverse(index)) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return I::from_parts(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        I::from_parts(index, 0)
    }

    /// Remove and return the value behind `id`. Stale handles yield `None`.
    pub fn remove(&mut self, id: I) -> Option<T> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(Reverse(id.index()));
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.slots
            .get(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.value.as_mut())
    }

    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (I::from_parts(i as u32, s.generation), v))
        })
    }

    /// Drop every value. Handles issued before the call become stale.
    pub fn clear(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(Reverse(i as u32));
            }
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;

    #[test]
    fn insert_and_get() {
        let mut arena: Arena<TaskId, &str> = Arena::new();
        let a = arena.insert("dig");
        let b = arena.insert("build");
        assert_eq!(arena.get(a), Some(&"dig"));
        assert_eq!(arena.get(b), Some(&"build"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn removed_handle_is_stale_after_slot_reuse() {
        let mut arena: Arena<TaskId, u32> = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Some(1));
        let b = arena.insert(2);
        // Same slot, new generation.
        assert_eq!(a.index, b.index);
        assert_ne!(a.generation, b.generation);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn free_slots_reuse_lowest_index_first() {
        let mut arena: Arena<TaskId, u32> = Arena::new();
        let ids: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
        arena.remove(ids[3]);
        arena.remove(ids[1]);
        let reused = arena.insert(9);
        assert_eq!(reused.index, 1);
    }

    #[test]
    fn iter_skips_removed_entries() {
        let mut arena: Arena<TaskId, u32> = Arena::new();
        let a = arena.insert(10);
        let _b = arena.insert(20);
        arena.remove(a);
        let values: Vec<u32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![20]);
    }

    #[test]
    fn clear_invalidates_all_handles() {
        let mut arena: Arena<TaskId, u32> = Arena::new();
        let a = arena.insert(1);
        arena.clear();
        assert!(arena.is_empty());
        assert!(!arena.contains(a));
    }
}
