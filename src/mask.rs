//! A fixed-width set over the space of registered component-type ids.
//! Value-like: archetypes and systems each own their mask.

use fixedbitset::FixedBitSet;
use std::hash::{Hash, Hasher};

use crate::registry::TypeId;

/// A set over component-type ids, sized to the type count at the time of
/// its owner's creation (systems fix their width at registration;
/// archetypes fix it at first creation).
#[derive(Debug, Clone, Default)]
pub struct Mask(FixedBitSet);

impl Mask {
    /// Creates an empty mask wide enough to hold `width` component ids.
    pub fn with_width(width: usize) -> Self {
        Mask(FixedBitSet::with_capacity(width))
    }

    pub fn incl(&mut self, id: TypeId) {
        let index = id.index();
        if index >= self.0.len() {
            self.0.grow(index + 1);
        }
        self.0.insert(index);
    }

    pub fn excl(&mut self, id: TypeId) {
        if id.index() < self.0.len() {
            self.0.set(id.index(), false);
        }
    }

    pub fn has(&self, id: TypeId) -> bool {
        self.0.contains(id.index())
    }

    pub fn count(&self) -> usize {
        self.0.count_ones(..)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Ascending id of the first set bit, if any.
    pub fn first(&self) -> Option<TypeId> {
        self.0.ones().next().map(|i| TypeId(i as u32))
    }

    /// Ascending id of the first set bit at or after `from`, if any.
    pub fn next(&self, from: TypeId) -> Option<TypeId> {
        self.0
            .ones()
            .find(|&i| i >= from.index())
            .map(|i| TypeId(i as u32))
    }

    /// Ascending iterator over the ids this mask contains.
    pub fn iter(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.0.ones().map(|i| TypeId(i as u32))
    }

    /// Returns `true` iff every bit set in `self` is also set in `other`
    /// (`self ⊆ other`).
    pub fn is_subset(&self, other: &Mask) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn intersects(&self, other: &Mask) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    /// Returns a freshly allocated mask containing `self ∩ other`.
    pub fn intersect(&self, other: &Mask) -> Mask {
        Mask(&self.0 & &other.0)
    }
}

impl PartialEq for Mask {
    fn eq(&self, other: &Self) -> bool {
        // `FixedBitSet` of different lengths but equal set bits must still
        // compare equal: widths diverge depending on type-registry size at
        // the time the mask's owner was created.
        self.iter().eq(other.iter())
    }
}

impl Eq for Mask {}

impl Hash for Mask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for id in self.iter() {
            id.0.hash(state);
        }
    }
}

/// `must_have ⊆ mask ∧ mask ∩ must_not_have = ∅`.
pub fn is_match(mask: &Mask, must_have: &Mask, must_not_have: &Mask) -> bool {
    must_have.is_subset(mask) && !mask.intersects(must_not_have)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> TypeId {
        TypeId(n)
    }

    #[test]
    fn insert_and_membership() {
        let mut m = Mask::with_width(4);
        m.incl(id(0));
        m.incl(id(2));
        assert!(m.has(id(0)));
        assert!(!m.has(id(1)));
        assert!(m.has(id(2)));
        assert_eq!(m.count(), 2);
    }

    #[test]
    fn iteration_is_ascending() {
        let mut m = Mask::with_width(8);
        m.incl(id(5));
        m.incl(id(1));
        m.incl(id(3));
        assert_eq!(m.iter().collect::<Vec<_>>(), vec![id(1), id(3), id(5)]);
    }

    #[test]
    fn subset_and_intersection() {
        let mut a = Mask::with_width(4);
        a.incl(id(0));
        a.incl(id(1));
        let mut b = Mask::with_width(4);
        b.incl(id(0));
        b.incl(id(1));
        b.incl(id(2));
        assert!(a.is_subset(&b));
        assert!(!b.is_subset(&a));
        assert!(a.intersects(&b));

        let i = a.intersect(&b);
        assert_eq!(i.count(), 2);
    }

    #[test]
    fn matching_predicate() {
        let mut mask = Mask::with_width(4);
        mask.incl(id(0));
        mask.incl(id(1));

        let mut must_have = Mask::with_width(4);
        must_have.incl(id(0));

        let mut must_not_have = Mask::with_width(4);
        must_not_have.incl(id(2));

        assert!(is_match(&mask, &must_have, &must_not_have));

        must_not_have.incl(id(1));
        assert!(!is_match(&mask, &must_have, &must_not_have));
    }

    #[test]
    fn equality_ignores_backing_width() {
        let mut a = Mask::with_width(2);
        a.incl(id(0));
        let mut b = Mask::with_width(16);
        b.incl(id(0));
        assert_eq!(a, b);
    }
}
