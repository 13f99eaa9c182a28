use std::{
    fmt,
    sync::atomic::{AtomicI64, Ordering},
};

use crate::archetype::ArchetypeId;
use crate::storage::TableId;

/// A generational identifier for an entity.
///
/// The identifier is valid iff its generation matches the generation
/// currently recorded for its index in [`Entities`]; freeing an entity bumps
/// the recorded generation, invalidating outstanding ids.
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// A sentinel used for placeholder initialization. Never returned by the
    /// allocator with generation `u32::MAX`.
    pub const PLACEHOLDER: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    #[inline]
    pub const fn from_raw(index: u32) -> Self {
        Self {
            index,
            generation: 0,
        }
    }

    #[inline]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where an entity's components currently live.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EntityLocation {
    pub archetype_id: ArchetypeId,
    pub archetype_row: usize,
    pub table_id: TableId,
    pub table_row: usize,
}

impl EntityLocation {
    /// The location of an entity that has been reserved or freed but not yet
    /// placed into an archetype.
    pub const INVALID: Self = Self {
        archetype_id: ArchetypeId::INVALID,
        archetype_row: usize::MAX,
        table_id: TableId::INVALID,
        table_row: usize::MAX,
    };

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.archetype_id != ArchetypeId::INVALID
    }
}

#[derive(Debug, Clone, Copy)]
struct EntityMeta {
    generation: u32,
    location: EntityLocation,
}

impl EntityMeta {
    const EMPTY: Self = Self {
        generation: 0,
        location: EntityLocation::INVALID,
    };
}

/// The generational entity allocator.
///
/// Freed indices feed a LIFO free-list (`pending`). `free_cursor` mirrors
/// `pending.len()` and doubles as the lock-free reservation cursor: systems
/// may call [`reserve_entity`](Self::reserve_entity) concurrently, which
/// decrements the cursor; once it goes negative, fresh indices past the end
/// of `meta` are being handed out. A subsequent [`flush`](Self::flush) (which
/// requires `&mut self`) materializes all reservations. Every operation that
/// touches `meta` or `pending` directly first asserts the flushed state.
#[derive(Default)]
pub struct Entities {
    meta: Vec<EntityMeta>,
    pending: Vec<u32>,
    free_cursor: AtomicI64,
}

impl Entities {
    /// Panics if there are outstanding reservations. Mirrors the invariant
    /// that meta/pending may only be used between flushes.
    #[inline]
    #[track_caller]
    pub fn verify_flushed(&self) {
        assert!(
            !self.needs_flush(),
            "Entities need to be flushed before accessing metadata or the free-list"
        );
    }

    #[inline]
    pub fn needs_flush(&self) -> bool {
        self.free_cursor.load(Ordering::Relaxed) != self.pending.len() as i64
    }

    /// Allocates an entity immediately, preferring the free-list.
    pub fn alloc(&mut self) -> Entity {
        self.verify_flushed();
        if let Some(index) = self.pending.pop() {
            let new_free_cursor = self.pending.len() as i64;
            *self.free_cursor.get_mut() = new_free_cursor;
            Entity::from_parts(index, self.meta[index as usize].generation)
        } else {
            let index = u32::try_from(self.meta.len()).expect("too many entities");
            self.meta.push(EntityMeta::EMPTY);
            Entity::from_raw(index)
        }
    }

    /// Reserves an entity id without locking. The entity's location is
    /// invalid until the next [`flush`](Self::flush).
    pub fn reserve_entity(&self) -> Entity {
        let n = self.free_cursor.fetch_sub(1, Ordering::Relaxed);
        if n > 0 {
            // There was a freed index available to hand out.
            let index = self.pending[(n - 1) as usize];
            Entity::from_parts(index, self.meta[index as usize].generation)
        } else {
            // Grab a fresh index past the end of `meta`; `flush` will grow
            // the metadata vector to cover it.
            let index = u32::try_from(self.meta.len() as i64 - n).expect("too many entities");
            Entity::from_raw(index)
        }
    }

    /// Frees an entity, returning its last location if the id was current.
    pub fn free(&mut self, entity: Entity) -> Option<EntityLocation> {
        self.verify_flushed();
        let meta = &mut self.meta[entity.index as usize];
        if meta.generation != entity.generation {
            return None;
        }
        meta.generation = meta.generation.wrapping_add(1);
        let loc = std::mem::replace(&mut meta.location, EntityLocation::INVALID);
        self.pending.push(entity.index);
        *self.free_cursor.get_mut() = self.pending.len() as i64;
        Some(loc)
    }

    /// Ensures capacity for `count` additional allocations.
    pub fn reserve(&mut self, count: u32) {
        self.verify_flushed();
        let free = *self.free_cursor.get_mut();
        let shortfall = count as i64 - free;
        if shortfall > 0 {
            self.meta.reserve(shortfall as usize);
        }
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.resolve_from_index(entity.index)
            .is_some_and(|e| e.generation == entity.generation)
    }

    /// Returns the location recorded for the entity, if the id is current
    /// and the entity has been placed.
    pub fn get(&self, entity: Entity) -> Option<EntityLocation> {
        let meta = self.meta.get(entity.index as usize)?;
        if meta.generation != entity.generation || !meta.location.is_valid() {
            return None;
        }
        Some(meta.location)
    }

    /// Updates the recorded location. Caller must hold a current id.
    pub fn set(&mut self, index: u32, location: EntityLocation) {
        self.meta[index as usize].location = location;
    }

    /// Bumps a freed slot's generation by `generations` without reusing it.
    /// Returns whether the slot was actually free.
    pub fn reserve_generations(&mut self, index: u32, generations: u32) -> bool {
        let Some(meta) = self.meta.get_mut(index as usize) else {
            return false;
        };
        if !meta.location.is_valid() {
            meta.generation = meta.generation.wrapping_add(generations);
            true
        } else {
            false
        }
    }

    /// Resolves the entity currently (or about to be) living at `index`.
    /// Reserved-but-unflushed indices resolve at generation zero.
    pub fn resolve_from_index(&self, index: u32) -> Option<Entity> {
        if let Some(meta) = self.meta.get(index as usize) {
            Some(Entity::from_parts(index, meta.generation))
        } else {
            let free = self.free_cursor.load(Ordering::Relaxed);
            if free >= 0 {
                return None;
            }
            let reserved_end = self.meta.len() as i64 + (-free);
            ((index as i64) < reserved_end).then(|| Entity::from_raw(index))
        }
    }

    /// Materializes all outstanding reservations, invoking `init` with each
    /// newly flushed entity and a mutable reference to its location slot.
    pub fn flush(&mut self, mut init: impl FnMut(Entity, &mut EntityLocation)) {
        let free_cursor = self.free_cursor.get_mut();
        let current = *free_cursor;
        if current >= 0 {
            // Reserved ids were served from the free-list; drop them off it.
            let new_len = current as usize;
            for index in self.pending.drain(new_len..) {
                let meta = &mut self.meta[index as usize];
                init(
                    Entity::from_parts(index, meta.generation),
                    &mut meta.location,
                );
            }
        } else {
            // Free-list exhausted: every pending entry was handed out, plus
            // `-current` fresh indices past the end of `meta`.
            let fresh = (-current) as usize;
            let old_len = self.meta.len();
            self.meta.resize(old_len + fresh, EntityMeta::EMPTY);
            *free_cursor = 0;
            for index in self.pending.drain(..) {
                let meta = &mut self.meta[index as usize];
                init(
                    Entity::from_parts(index, meta.generation),
                    &mut meta.location,
                );
            }
            for index in old_len..old_len + fresh {
                let meta = &mut self.meta[index];
                init(Entity::from_raw(index as u32), &mut meta.location);
            }
            return;
        }
        *self.free_cursor.get_mut() = self.pending.len() as i64;
    }

    /// Flushes reservations, marking every flushed entity's location invalid.
    pub fn flush_as_invalid(&mut self) {
        self.flush(|_, location| *location = EntityLocation::INVALID);
    }

    pub fn clear(&mut self) {
        self.meta.clear();
        self.pending.clear();
        *self.free_cursor.get_mut() = 0;
    }

    /// Total number of index slots ever allocated.
    pub fn total_count(&self) -> usize {
        self.meta.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn alloc_never_repeats_ids() {
        let mut entities = Entities::default();
        let mut seen = HashSet::new();
        let mut live = Vec::new();
        // Deterministic alloc/free churn; every returned id must be unique.
        for round in 0u32..1000 {
            let e = entities.alloc();
            assert!(seen.insert(e), "duplicate id {e:?}");
            live.push(e);
            if round % 3 == 0 {
                let victim = live.swap_remove((round as usize * 7) % live.len());
                entities.free(victim).unwrap();
            }
        }
    }

    #[test]
    fn free_invalidates_and_recycles() {
        let mut entities = Entities::default();
        let a = entities.alloc();
        assert!(entities.contains(a));
        entities.free(a).unwrap();
        assert!(!entities.contains(a));
        let b = entities.alloc();
        assert_eq!(b.index(), a.index());
        assert_eq!(b.generation(), a.generation() + 1);
    }

    #[test]
    fn reserve_entity_is_deferred_until_flush() {
        let mut entities = Entities::default();
        let a = entities.alloc();
        entities.free(a).unwrap();

        let reserved = entities.reserve_entity();
        assert_eq!(reserved.index(), a.index());
        assert!(entities.needs_flush());
        assert!(entities.get(reserved).is_none());

        let fresh = entities.reserve_entity();
        assert_ne!(fresh.index(), reserved.index());

        let mut flushed = Vec::new();
        entities.flush(|e, loc| {
            *loc = EntityLocation::INVALID;
            flushed.push(e);
        });
        assert_eq!(flushed.len(), 2);
        assert!(entities.contains(reserved));
        assert!(entities.contains(fresh));
    }

    #[test]
    #[should_panic(expected = "flushed")]
    fn alloc_during_pending_reservations_panics() {
        let mut entities = Entities::default();
        entities.reserve_entity();
        entities.alloc();
    }

    #[test]
    fn reserve_generations_only_on_free_slots() {
        let mut entities = Entities::default();
        let a = entities.alloc();
        // Slot has no location yet, so it counts as free.
        assert!(entities.reserve_generations(a.index(), 3));
        assert!(!entities.contains(a));
    }
}
