//! The top-level container: interns types and systems, resolves a
//! composition to its archetype via a mask map, and drives spawning and
//! system execution.

use hashbrown::HashMap;
use std::ptr::NonNull;

use crate::archetype::Archetype;
use crate::entity::{Entity, EntityTable, Location};
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::mask::Mask;
use crate::matching::{link_new_archetype, link_new_system};
use crate::registry::{TypeId, TypeRegistry};
use crate::requirement::{parse_composition, parse_requirement};
use crate::system::{System, SystemCallback};

/// The ECS core. Not safe for concurrent use: every operation runs on the
/// calling execution context, with no internal locking.
///
/// Field declaration order matters: systems reference archetype and type
/// ids, so they must drop before archetypes and the type registry, which
/// in turn reference entity locations. Rust drops struct fields in
/// declaration order.
pub struct World {
    systems: Vec<System>,
    system_by_name: HashMap<Box<str>, usize>,
    archetypes: Vec<Archetype>,
    archetype_by_mask: HashMap<Mask, usize>,
    registry: TypeRegistry,
    entities: EntityTable,
    last_spawned: Vec<Entity>,
}

impl Default for World {
    fn default() -> Self {
        World::new()
    }
}

impl World {
    pub fn new() -> Self {
        World {
            systems: Vec::new(),
            system_by_name: HashMap::new(),
            archetypes: Vec::new(),
            archetype_by_mask: HashMap::new(),
            registry: TypeRegistry::new(),
            entities: EntityTable::new(),
            last_spawned: Vec::new(),
        }
    }

    /// Registers a component type.
    pub fn register_type(&mut self, name: &str, size: usize, align: usize) -> Result<TypeId> {
        self.registry.register(name, size, align)
    }

    /// Registers a system: parses `requirements`, computes its masks, and
    /// matches it against every existing archetype.
    pub fn register_system(
        &mut self,
        name: &str,
        requirements: &str,
        callback: SystemCallback,
        user_data: Option<NonNull<()>>,
    ) -> Result<()> {
        if self.system_by_name.contains_key(name) {
            return Err(Error::AlreadyExists(name.into()));
        }

        let requirement = parse_requirement(&self.registry, requirements)?;
        let system = System::new(name, requirement, callback, user_data);

        if self.systems.try_reserve(1).is_err() {
            return Err(Error::AllocFailed);
        }
        self.systems.push(system);
        let system_id = self.systems.len() - 1;

        if self.system_by_name.try_reserve(1).is_err() {
            self.systems.pop();
            return Err(Error::AllocFailed);
        }
        self.system_by_name.insert(name.into(), system_id);

        if let Err(err) = link_new_system(&mut self.archetypes, &mut self.systems, system_id) {
            self.system_by_name.remove(name);
            self.systems.pop();
            return Err(err);
        }

        log::debug!(
            "registered system `{}`: must_have={:?}, must_not_have={:?}, matched {} archetypes",
            name,
            self.systems[system_id].must_have(),
            self.systems[system_id].must_not_have(),
            self.systems[system_id].matching_archetypes().len(),
        );

        Ok(())
    }

    /// Spawns `count` entities with the given composition, returning the
    /// newly assigned ids. The returned slice is world-owned and valid
    /// until the next call to `spawn`.
    pub fn spawn(&mut self, count: usize, composition: &str) -> Result<&[Entity]> {
        let mask = parse_composition(&self.registry, composition)?;

        let archetype_id = match self.archetype_by_mask.get(&mask) {
            Some(&id) => id,
            None => self.create_archetype(mask)?,
        };

        let family_size = self.archetypes[archetype_id].layout().family_size();
        let entity_reservation = self.entities.reserve(count);
        let region_request = self.archetypes[archetype_id].request_regions(count);

        // Freshly spawned rows are all zero bytes, whether carved from a
        // fresh chunk or drawn from the recycled stack.
        for row_ptr in region_request.row_pointers(family_size) {
            if family_size > 0 {
                unsafe { std::ptr::write_bytes(row_ptr.as_ptr(), 0u8, family_size) };
            }
        }

        for (&entity, row_ptr) in entity_reservation
            .entities()
            .iter()
            .zip(region_request.row_pointers(family_size))
        {
            self.entities.set_location(
                entity,
                Location {
                    archetype: archetype_id,
                    row: row_ptr,
                },
            );
        }

        self.archetypes[archetype_id].commit_regions(region_request);

        self.last_spawned.clear();
        self.last_spawned
            .extend_from_slice(entity_reservation.entities());
        self.entities.commit(entity_reservation);

        log::trace!(
            "spawned {} entities into archetype {}",
            count,
            archetype_id
        );

        Ok(&self.last_spawned)
    }

    fn create_archetype(&mut self, mask: Mask) -> Result<usize> {
        let layout = Layout::compute(&self.registry, &mask);
        let archetype = Archetype::new(mask.clone(), layout);

        if self.archetypes.try_reserve(1).is_err() {
            return Err(Error::AllocFailed);
        }
        self.archetypes.push(archetype);
        let archetype_id = self.archetypes.len() - 1;

        if self.archetype_by_mask.try_reserve(1).is_err() {
            self.archetypes.pop();
            return Err(Error::AllocFailed);
        }
        self.archetype_by_mask.insert(mask.clone(), archetype_id);

        if let Err(err) = link_new_archetype(&mut self.archetypes, archetype_id, &mut self.systems)
        {
            self.archetype_by_mask.remove(&mask);
            self.archetypes.pop();
            return Err(err);
        }

        log::trace!(
            "created archetype {} (family_size={})",
            archetype_id,
            self.archetypes[archetype_id].layout().family_size(),
        );

        Ok(archetype_id)
    }

    /// Resolves `entity`'s component `type_name` to a pointer within its
    /// row, or `None` if the entity has no storage, the type is
    /// unregistered, or the archetype lacks that type.
    pub fn get_component(&self, entity: Entity, type_name: &str) -> Option<NonNull<u8>> {
        let type_id = self.registry.lookup_id(type_name)?;
        let location = self.entities.location(entity)?;
        self.archetypes[location.archetype].component_ptr(type_id, location.row)
    }

    /// Removes `entity`, recycling both its id and its row. See
    /// `EntityTable::despawn` for the no-generation-counter caveat on
    /// double despawn.
    pub fn despawn(&mut self, entity: Entity) {
        if let Some(location) = self.entities.despawn(entity) {
            self.archetypes[location.archetype].recycle_row(location.row);
        }
    }

    /// Invokes a single system by name.
    pub fn run(&mut self, system_name: &str, dt: f32) -> Result<()> {
        let system_id = *self
            .system_by_name
            .get(system_name)
            .ok_or_else(|| Error::NotFound(system_name.into()))?;
        self.run_system(system_id, dt);
        Ok(())
    }

    /// Invokes every registered system, in registration order.
    pub fn step(&mut self, dt: f32) -> Result<()> {
        for system_id in 0..self.systems.len() {
            self.run_system(system_id, dt);
        }
        Ok(())
    }

    /// Executes one system's matching archetypes: rebuilds its offsets
    /// vector per archetype, then walks chunks head-to-tail and rows in
    /// ascending order within each chunk.
    fn run_system(&mut self, system_id: usize, dt: f32) {
        let archetype_ids: Vec<usize> = self.systems[system_id].matching_archetypes().to_vec();

        for archetype_id in archetype_ids {
            let archetype = &self.archetypes[archetype_id];
            self.systems[system_id].rebuild_offsets(archetype.layout());
            let family_size = archetype.layout().family_size();

            for (chunk_ptr, count) in archetype.iter_chunks() {
                for row in 0..count {
                    let row_ptr = if family_size == 0 {
                        chunk_ptr
                    } else {
                        unsafe { NonNull::new_unchecked(chunk_ptr.as_ptr().add(row * family_size)) }
                    };
                    self.systems[system_id].invoke(row_ptr, dt);
                }
            }
        }
    }
}
