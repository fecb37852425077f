//! The bidirectional archetype-to-system relation, maintained incrementally
//! as either side grows. Uses dense integer handles into the world's
//! archetype/system vectors rather than raw pointers, avoiding invalidation
//! when those vectors grow.

use crate::archetype::Archetype;
use crate::error::Error;
use crate::mask::is_match;
use crate::system::System;

/// Links a newly created archetype against every already-registered
/// system.
///
/// On a mid-scan allocation failure, every pair inserted during this scan
/// is rolled back before the error is returned: the index must never
/// observe a half-registered pair.
pub fn link_new_archetype(
    archetypes: &mut [Archetype],
    archetype_id: usize,
    systems: &mut [System],
) -> Result<(), Error> {
    let mask = archetypes[archetype_id].mask().clone();
    let mut linked = Vec::new();

    for system_id in 0..systems.len() {
        let matches = is_match(
            &mask,
            systems[system_id].must_have(),
            systems[system_id].must_not_have(),
        );
        if !matches {
            continue;
        }

        if let Err(()) = systems[system_id].try_add_matching_archetype(archetype_id) {
            rollback(archetypes, archetype_id, systems, &linked);
            return Err(Error::AllocFailed);
        }
        if let Err(()) = archetypes[archetype_id].try_add_matching_system(system_id) {
            systems[system_id].remove_matching_archetype(archetype_id);
            rollback(archetypes, archetype_id, systems, &linked);
            return Err(Error::AllocFailed);
        }

        linked.push(system_id);
    }

    Ok(())
}

/// Links a newly registered system against every existing archetype.
pub fn link_new_system(
    archetypes: &mut [Archetype],
    systems: &mut [System],
    system_id: usize,
) -> Result<(), Error> {
    let must_have = systems[system_id].must_have().clone();
    let must_not_have = systems[system_id].must_not_have().clone();
    let mut linked = Vec::new();

    for archetype_id in 0..archetypes.len() {
        if !is_match(archetypes[archetype_id].mask(), &must_have, &must_not_have) {
            continue;
        }

        if let Err(()) = archetypes[archetype_id].try_add_matching_system(system_id) {
            rollback_system(archetypes, systems, system_id, &linked);
            return Err(Error::AllocFailed);
        }
        if let Err(()) = systems[system_id].try_add_matching_archetype(archetype_id) {
            archetypes[archetype_id].remove_matching_system(system_id);
            rollback_system(archetypes, systems, system_id, &linked);
            return Err(Error::AllocFailed);
        }

        linked.push(archetype_id);
    }

    Ok(())
}

fn rollback(
    archetypes: &mut [Archetype],
    archetype_id: usize,
    systems: &mut [System],
    linked: &[usize],
) {
    for &system_id in linked {
        systems[system_id].remove_matching_archetype(archetype_id);
        archetypes[archetype_id].remove_matching_system(system_id);
    }
}

fn rollback_system(
    archetypes: &mut [Archetype],
    systems: &mut [System],
    system_id: usize,
    linked: &[usize],
) {
    for &archetype_id in linked {
        archetypes[archetype_id].remove_matching_system(system_id);
        systems[system_id].remove_matching_archetype(archetype_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;
    use crate::mask::Mask;
    use crate::registry::TypeRegistry;
    use crate::requirement::parse_requirement;

    fn archetype_with(reg: &TypeRegistry, ids: &[&str]) -> Archetype {
        let mut mask = Mask::with_width(reg.len());
        for &name in ids {
            mask.incl(reg.lookup_id(name).unwrap());
        }
        let layout = Layout::compute(reg, &mask);
        Archetype::new(mask, layout)
    }

    fn system_with(reg: &TypeRegistry, name: &str, requirement: &str) -> System {
        let req = parse_requirement(reg, requirement).unwrap();
        System::new(name, req, Box::new(|_, _| {}), None)
    }

    #[test]
    fn matching_archetype_set_grows_as_new_archetypes_are_linked() {
        let mut reg = TypeRegistry::new();
        reg.register("int", 4, 4).unwrap();
        let mut systems = vec![system_with(&reg, "s1", "int")];
        let mut archetypes = vec![archetype_with(&reg, &["int"])];

        link_new_archetype(&mut archetypes, 0, &mut systems).unwrap();
        assert_eq!(systems[0].matching_archetypes(), &[0]);

        reg.register("float", 4, 4).unwrap();
        archetypes.push(archetype_with(&reg, &["int", "float"]));
        link_new_archetype(&mut archetypes, 1, &mut systems).unwrap();

        assert_eq!(systems[0].matching_archetypes(), &[0, 1]);
    }

    #[test]
    fn negative_predicate_excludes_matching_archetype() {
        let mut reg = TypeRegistry::new();
        reg.register("a", 1, 1).unwrap();
        reg.register("b", 1, 1).unwrap();
        let mut systems = vec![system_with(&reg, "s1", "a, !b")];
        let mut archetypes = vec![
            archetype_with(&reg, &["a"]),
            archetype_with(&reg, &["a", "b"]),
        ];

        link_new_archetype(&mut archetypes, 0, &mut systems).unwrap();
        link_new_archetype(&mut archetypes, 1, &mut systems).unwrap();

        assert_eq!(systems[0].matching_archetypes(), &[0]);
    }

    #[test]
    fn link_new_system_matches_existing_archetypes() {
        let mut reg = TypeRegistry::new();
        reg.register("a", 1, 1).unwrap();
        let mut archetypes = vec![archetype_with(&reg, &["a"])];
        let mut systems = vec![system_with(&reg, "s1", "a")];

        link_new_system(&mut archetypes, &mut systems, 0).unwrap();

        assert_eq!(archetypes[0].matching_systems(), &[0]);
        assert_eq!(systems[0].matching_archetypes(), &[0]);
    }
}
