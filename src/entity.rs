//! Entity id allocation and the entity-to-location table. A single-threaded,
//! generation-free table: ids are bare `u64`s with no generation field. The
//! two-phase reserve/commit/abort shape mirrors
//! `archetype::storage::ArchetypeStorage` so `World::spawn` can roll both
//! back together on failure.

use smallvec::SmallVec;
use std::ptr::NonNull;

/// An opaque identifier for a row in some archetype's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity(pub u64);

impl Entity {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Where a live entity's row lives: which archetype, and a pointer to the
/// row's first byte within one of that archetype's chunks.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub archetype: usize,
    pub row: NonNull<u8>,
}

/// The outcome of [`EntityTable::reserve`]: freshly minted or recycled
/// entity ids, with enough bookkeeping to commit or abort.
pub struct EntityReservation {
    entities: SmallVec<[Entity; 8]>,
    new_recycled_count: usize,
    fresh_count: usize,
}

impl EntityReservation {
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }
}

/// Maps entity id to [`Location`]; recycles despawned ids before minting new
/// ones.
#[derive(Default)]
pub struct EntityTable {
    locations: Vec<Option<Location>>,
    recycled: Vec<u64>,
}

impl EntityTable {
    pub fn new() -> Self {
        EntityTable::default()
    }

    /// Phase 1: reserve `count` entity ids, drawing first from the
    /// recycled-id stack (LIFO), then minting fresh ones. Does not assign
    /// locations; callers fill those in with [`EntityTable::set_location`]
    /// once the corresponding archetype rows are reserved.
    pub fn reserve(&mut self, count: usize) -> EntityReservation {
        let mut entities = SmallVec::with_capacity(count);

        let stack_len = self.recycled.len();
        let take = count.min(stack_len);
        for i in 0..take {
            entities.push(Entity(self.recycled[stack_len - 1 - i]));
        }
        let new_recycled_count = stack_len - take;

        let fresh_count = count - take;
        for _ in 0..fresh_count {
            let id = self.locations.len() as u64;
            self.locations.push(None);
            entities.push(Entity(id));
        }

        EntityReservation {
            entities,
            new_recycled_count,
            fresh_count,
        }
    }

    pub fn set_location(&mut self, entity: Entity, location: Location) {
        self.locations[entity.0 as usize] = Some(location);
    }

    /// Phase 2 (commit): truncate the recycled-id stack to the size
    /// recorded during `reserve`.
    pub fn commit(&mut self, reservation: EntityReservation) {
        self.recycled.truncate(reservation.new_recycled_count);
    }

    /// Phase 2 (abort): freshly minted ids are removed from the table
    /// entirely (they were never observed by a caller); recycled-origin
    /// ids were never taken out of the stack, so nothing else is needed.
    pub fn abort(&mut self, reservation: EntityReservation) {
        let new_len = self.locations.len() - reservation.fresh_count;
        self.locations.truncate(new_len);
    }

    pub fn location(&self, entity: Entity) -> Option<Location> {
        self.locations.get(entity.0 as usize).copied().flatten()
    }

    /// Removes `entity`, pushing its id onto the recycled stack. Returns
    /// its prior location (so the caller can recycle the row itself), or
    /// `None` if `entity` was never spawned or already despawned.
    ///
    /// Despawning an id twice is a caller bug, not a detected error:
    /// `Entity` is a bare id with no generation counter, so a double
    /// despawn cannot be distinguished from a fresh spawn that happens to
    /// have recycled the same id.
    pub fn despawn(&mut self, entity: Entity) -> Option<Location> {
        let slot = self.locations.get_mut(entity.0 as usize)?;
        let location = slot.take()?;
        self.recycled.push(entity.0);
        Some(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_location(archetype: usize) -> Location {
        Location {
            archetype,
            row: NonNull::dangling(),
        }
    }

    #[test]
    fn fresh_ids_are_dense_from_zero() {
        let mut table = EntityTable::new();
        let reservation = table.reserve(3);
        let ids: Vec<u64> = reservation.entities().iter().map(|e| e.id()).collect();
        table.commit(reservation);
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn despawned_ids_are_recycled_before_fresh_ones() {
        let mut table = EntityTable::new();
        let r1 = table.reserve(2);
        let e0 = r1.entities()[0];
        let e1 = r1.entities()[1];
        table.set_location(e0, dummy_location(0));
        table.set_location(e1, dummy_location(0));
        table.commit(r1);

        table.despawn(e0);

        let r2 = table.reserve(1);
        assert_eq!(r2.entities()[0], e0);
        table.commit(r2);
    }

    #[test]
    fn abort_discards_fresh_ids_but_leaves_recycled_ids_untouched() {
        let mut table = EntityTable::new();
        let r1 = table.reserve(2);
        let e0 = r1.entities()[0];
        let e1 = r1.entities()[1];
        table.set_location(e0, dummy_location(0));
        table.set_location(e1, dummy_location(0));
        table.commit(r1);
        table.despawn(e1);

        let r2 = table.reserve(2); // 1 recycled (e1) + 1 fresh
        assert_eq!(r2.entities()[0], e1);
        let fresh = r2.entities()[1];
        table.abort(r2);

        // The fresh id must not be observable any more.
        assert!(table.location(fresh).is_none());
        // Re-reserving 1 must still find e1 recycled.
        let r3 = table.reserve(1);
        assert_eq!(r3.entities()[0], e1);
    }

    #[test]
    fn location_of_unknown_entity_is_none() {
        let table = EntityTable::new();
        assert!(table.location(Entity(42)).is_none());
    }
}
