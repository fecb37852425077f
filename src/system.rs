//! A registered system: a boxed callback plus an opaque user-data pointer,
//! a scratch offsets vector rewritten per archetype visit, and the set of
//! archetypes currently matching it.

use smallvec::SmallVec;
use std::ptr::NonNull;

use crate::layout::Layout;
use crate::mask::Mask;
use crate::registry::TypeId;
use crate::requirement::Requirement;

/// Per-invocation context handed to a system's callback.
pub struct SystemContext<'a> {
    row_base: NonNull<u8>,
    offsets: &'a [usize],
    user_data: Option<NonNull<()>>,
}

impl<'a> SystemContext<'a> {
    /// Pointer to the `index`-th positive requirement's component within
    /// this row, where `index` is its position in the system's requirement
    /// order.
    pub fn get_component(&self, index: usize) -> NonNull<u8> {
        let offset = self.offsets[index];
        unsafe { NonNull::new_unchecked(self.row_base.as_ptr().add(offset)) }
    }

    pub fn get_user_data(&self) -> Option<NonNull<()>> {
        self.user_data
    }
}

pub type SystemCallback = Box<dyn FnMut(&SystemContext, f32)>;

/// A registered system: its predicate, its requirement order, a scratch
/// offsets vector, and the set of archetypes currently matching it.
pub struct System {
    name: Box<str>,
    must_have: Mask,
    must_not_have: Mask,
    types: SmallVec<[TypeId; 8]>,
    offsets: SmallVec<[usize; 8]>,
    callback: SystemCallback,
    user_data: Option<NonNull<()>>,
    matching_archetypes: Vec<usize>,
}

impl System {
    pub fn new(
        name: &str,
        requirement: Requirement,
        callback: SystemCallback,
        user_data: Option<NonNull<()>>,
    ) -> Self {
        System {
            name: name.into(),
            must_have: requirement.must_have,
            must_not_have: requirement.must_not_have,
            types: requirement.types,
            offsets: SmallVec::new(),
            callback,
            user_data,
            matching_archetypes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn must_have(&self) -> &Mask {
        &self.must_have
    }

    pub fn must_not_have(&self) -> &Mask {
        &self.must_not_have
    }

    pub fn matching_archetypes(&self) -> &[usize] {
        &self.matching_archetypes
    }

    pub fn add_matching_archetype(&mut self, archetype_id: usize) {
        if !self.matching_archetypes.contains(&archetype_id) {
            self.matching_archetypes.push(archetype_id);
        }
    }

    /// Fallible variant used by the matching index, so a mid-scan
    /// allocation failure can be rolled back instead of aborting the
    /// process.
    pub fn try_add_matching_archetype(&mut self, archetype_id: usize) -> Result<(), ()> {
        if self.matching_archetypes.contains(&archetype_id) {
            return Ok(());
        }
        self.matching_archetypes.try_reserve(1).map_err(|_| ())?;
        self.matching_archetypes.push(archetype_id);
        Ok(())
    }

    pub fn remove_matching_archetype(&mut self, archetype_id: usize) {
        self.matching_archetypes.retain(|&id| id != archetype_id);
    }

    /// Rebuilds the scratch offsets vector from `layout`. `layout` must
    /// belong to an archetype matching this system: every one of
    /// `self.types` is guaranteed present in such a layout.
    pub fn rebuild_offsets(&mut self, layout: &Layout) {
        self.offsets.clear();
        for &type_id in &self.types {
            let offset = layout
                .offset_of(type_id)
                .expect("matching archetype carries every must_have type");
            self.offsets.push(offset);
        }
    }

    /// Invokes the callback once for the row starting at `row_base`.
    pub fn invoke(&mut self, row_base: NonNull<u8>, dt: f32) {
        let ctx = SystemContext {
            row_base,
            offsets: &self.offsets,
            user_data: self.user_data,
        };
        (self.callback)(&ctx, dt);
    }
}
