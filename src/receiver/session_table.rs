//! Fixed-capacity slot arena
//!
//! Free slots are kept on a free-list so insert and remove are O(1). Every
//! slot carries a generation that bumps when it is freed; a [`SlotId`] from an
//! earlier occupant no longer resolves.

use super::session::SessionError;

/// Handle to an occupied slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    index: usize,
    generation: u64,
}

impl SlotId {
    /// Slot number
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Occupancy generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    value: Option<T>,
}

/// Bounded arena of session slots
#[derive(Debug)]
pub struct SessionTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> SessionTable<T> {
    /// Create a table with `capacity` slots
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        // Lowest index is handed out first
        let free = (0..capacity).rev().collect();
        Self { slots, free }
    }

    /// Number of slots
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Check if no slot is occupied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if every slot is occupied
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Id the next insert will return, if a slot is free
    #[must_use]
    pub fn next_id(&self) -> Option<SlotId> {
        let &index = self.free.last()?;
        Some(SlotId {
            index,
            generation: self.slots[index].generation,
        })
    }

    /// Place `value` in a free slot
    ///
    /// # Errors
    /// Returns `SessionError::TableFull` when no slot is free.
    pub fn insert(&mut self, value: T) -> Result<SlotId, SessionError> {
        let index = self.free.pop().ok_or(SessionError::TableFull {
            capacity: self.capacity(),
        })?;
        let slot = &mut self.slots[index];
        slot.value = Some(value);
        Ok(SlotId {
            index,
            generation: slot.generation,
        })
    }

    /// Resolve an id to its value
    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)?
            .value
            .as_ref()
    }

    /// Resolve an id to its value, mutably
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?
            .value
            .as_mut()
    }

    /// Free a slot, returning its value
    ///
    /// Stale ids are ignored.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(value)
    }

    /// Occupied slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SlotId {
                        index,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Occupied slots in index order, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotId, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (SlotId { index, generation }, value))
        })
    }

    /// Ids of all occupied slots
    #[must_use]
    pub fn ids(&self) -> Vec<SlotId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Empty every slot, returning the values
    pub fn drain(&mut self) -> Vec<T> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }
}
