//! # Entity Handles
//!
//! Entities are opaque integer handles. What an entity *has* is recorded in
//! its signature, a 64-bit mask with one bit per component class that the
//! world has seen.

use std::fmt;

/// Opaque handle of an entity.
///
/// Ids are dense over time: every id below the allocator's high-water mark
/// is either taken or waiting on the free list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(u32);

impl EntityId {
    /// Null/invalid entity id. Never handed out by the allocator.
    pub const NULL: Self = Self(u32::MAX);

    /// Creates an entity id from its raw index.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index of this id.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Checks if this id is the null id.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("#null")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Bit position of a component class inside an [`EntitySignature`].
pub type SignatureSlot = u8;

/// Bitmask of the component classes attached to an entity.
///
/// One bit per signature slot, so a world supports at most
/// [`EntitySignature::MAX_SLOTS`] distinct component classes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EntitySignature(u64);

impl EntitySignature {
    /// Number of distinct slots a signature can hold.
    pub const MAX_SLOTS: usize = 64;

    /// The empty signature.
    pub const EMPTY: Self = Self(0);

    /// Creates a signature from its raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Checks if the slot is set.
    ///
    /// # Arguments
    ///
    /// * `slot` - The signature slot (0-63)
    #[inline]
    #[must_use]
    pub const fn contains(self, slot: SignatureSlot) -> bool {
        (self.0 & (1 << slot)) != 0
    }

    /// Checks if every slot of `other` is set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains_all(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Sets the slot.
    ///
    /// # Arguments
    ///
    /// * `slot` - The signature slot (0-63)
    #[inline]
    pub fn insert(&mut self, slot: SignatureSlot) {
        self.0 |= 1 << slot;
    }

    /// Clears the slot.
    ///
    /// # Arguments
    ///
    /// * `slot` - The signature slot (0-63)
    #[inline]
    pub fn remove(&mut self, slot: SignatureSlot) {
        self.0 &= !(1 << slot);
    }

    /// Returns `true` if no slot is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of slots set.
    #[inline]
    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates over the set slots in ascending order.
    pub fn slots(self) -> impl Iterator<Item = SignatureSlot> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let slot = bits.trailing_zeros() as SignatureSlot;
            bits &= bits - 1;
            Some(slot)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_null() {
        assert!(EntityId::NULL.is_null());
        assert!(EntityId::default().is_null());
        assert!(!EntityId::new(0).is_null());
        assert_eq!(EntityId::new(12).to_string(), "#12");
    }

    #[test]
    fn test_signature_slots() {
        let mut signature = EntitySignature::EMPTY;
        assert!(!signature.contains(5));

        signature.insert(5);
        signature.insert(63);
        assert!(signature.contains(5));
        assert!(signature.contains(63));
        assert_eq!(signature.count(), 2);
        assert_eq!(signature.slots().collect::<Vec<_>>(), vec![5, 63]);

        signature.remove(5);
        assert!(!signature.contains(5));
        assert!(signature.contains_all(EntitySignature::from_bits(1 << 63)));
    }
}
