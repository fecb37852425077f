//! One exact component-set bucket: owns its bitmask, its packed row layout,
//! its chunked row storage, and the set of systems the matching index
//! currently says run over it.

pub mod storage;

use std::ptr::NonNull;

use crate::layout::Layout;
use crate::mask::Mask;
use crate::registry::TypeId;
use storage::{ArchetypeStorage, RegionRequest};

/// One archetype: a fixed component set, its packed row layout, and its
/// chunked byte storage.
pub struct Archetype {
    mask: Mask,
    layout: Layout,
    storage: ArchetypeStorage,
    /// Ids of systems whose requirement currently matches this archetype's
    /// mask, kept in sync by the matching index.
    matching_systems: Vec<usize>,
}

impl Archetype {
    pub fn new(mask: Mask, layout: Layout) -> Self {
        let storage = ArchetypeStorage::new(layout.family_size(), layout.alignment());
        Archetype {
            mask,
            layout,
            storage,
            matching_systems: Vec::new(),
        }
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn matching_systems(&self) -> &[usize] {
        &self.matching_systems
    }

    pub fn add_matching_system(&mut self, system_id: usize) {
        if !self.matching_systems.contains(&system_id) {
            self.matching_systems.push(system_id);
        }
    }

    /// Fallible variant used by the matching index, so a mid-scan
    /// allocation failure can be rolled back instead of aborting the
    /// process.
    pub fn try_add_matching_system(&mut self, system_id: usize) -> Result<(), ()> {
        if self.matching_systems.contains(&system_id) {
            return Ok(());
        }
        self.matching_systems.try_reserve(1).map_err(|_| ())?;
        self.matching_systems.push(system_id);
        Ok(())
    }

    pub fn remove_matching_system(&mut self, system_id: usize) {
        self.matching_systems.retain(|&id| id != system_id);
    }

    pub fn request_regions(&mut self, needed: usize) -> RegionRequest {
        self.storage.request_regions(needed)
    }

    pub fn commit_regions(&mut self, request: RegionRequest) {
        self.storage.commit(request)
    }

    pub fn abort_regions(&mut self, request: RegionRequest) {
        self.storage.abort(request)
    }

    pub fn recycle_row(&mut self, row: NonNull<u8>) {
        self.storage.recycle_row(row)
    }

    /// Chunks in iteration order (newest first), each as `(base_ptr, count)`.
    pub fn iter_chunks(&self) -> impl Iterator<Item = (NonNull<u8>, usize)> + '_ {
        self.storage.iter_chunks()
    }

    /// Pointer to component `type_id` within the row starting at `row_ptr`,
    /// or `None` if this archetype doesn't carry that component.
    pub fn component_ptr(&self, type_id: TypeId, row_ptr: NonNull<u8>) -> Option<NonNull<u8>> {
        let offset = self.layout.offset_of(type_id)?;
        Some(unsafe { NonNull::new_unchecked(row_ptr.as_ptr().add(offset)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;

    fn archetype_of(reg: &TypeRegistry, ids: &[TypeId]) -> Archetype {
        let mut mask = Mask::with_width(reg.len());
        for &id in ids {
            mask.incl(id);
        }
        let layout = Layout::compute(reg, &mask);
        Archetype::new(mask, layout)
    }

    #[test]
    fn component_ptr_resolves_via_layout_offset() {
        let mut reg = TypeRegistry::new();
        let a = reg.register("a", 4, 4).unwrap();
        let b = reg.register("b", 8, 8).unwrap();
        let mut arch = archetype_of(&reg, &[a, b]);

        let request = arch.request_regions(1);
        let row_ptr = request.regions[0].ptr;
        arch.commit_regions(request);

        let off_a = arch.layout().offset_of(a).unwrap();
        let off_b = arch.layout().offset_of(b).unwrap();
        assert_eq!(
            arch.component_ptr(a, row_ptr).unwrap().as_ptr() as usize,
            row_ptr.as_ptr() as usize + off_a
        );
        assert_eq!(
            arch.component_ptr(b, row_ptr).unwrap().as_ptr() as usize,
            row_ptr.as_ptr() as usize + off_b
        );
    }

    #[test]
    fn component_ptr_is_none_for_absent_type() {
        let mut reg = TypeRegistry::new();
        let a = reg.register("a", 4, 4).unwrap();
        let c = reg.register("c", 1, 1).unwrap();
        let arch = archetype_of(&reg, &[a]);
        assert!(arch.component_ptr(c, NonNull::dangling()).is_none());
    }

    #[test]
    fn matching_systems_track_add_and_remove() {
        let reg = TypeRegistry::new();
        let mut arch = archetype_of(&reg, &[]);
        arch.add_matching_system(3);
        arch.add_matching_system(5);
        arch.add_matching_system(3);
        assert_eq!(arch.matching_systems(), &[3, 5]);
        arch.remove_matching_system(3);
        assert_eq!(arch.matching_systems(), &[5]);
    }
}
