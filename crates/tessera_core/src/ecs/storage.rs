//! # Component Storage
//!
//! Sparse-set storage for a single component class.
//!
//! ```text
//! sparse pages:  id -> dense index
//! dense ids:     [ e7 | e2 e9 e4 | e1 e5 ]
//! payloads:      [ p7 | p2 p9 p4 | p1 p5 ]
//!                  ^^   ^^^^^^^^
//!          deactivated   grouped block (relative slots 0..3)
//! ```
//!
//! - Lookup by id is O(1) through the page table
//! - Iteration walks contiguous memory
//! - Removal swaps with the last slot, so dense indices of *other*
//!   entities may change on every structural operation
//!
//! Storages are type-erased: the payload column is a `dyn Column` built from
//! the class's [`TypeDescriptor`]. Typed accessors downcast once and panic
//! on a type mismatch.
//!
//! Structural mutation is crate-internal. Inside a [`World`](super::World),
//! groups span several storages and only the world can keep them aligned.

use std::any::Any;
use std::fmt;

use super::column::{typed, typed_mut, Column};
use super::component::{ClassId, Component, TypeDescriptor};
use super::entity::EntityId;
use crate::memory::SparsePages;
use crate::sync::{StorageLock, StorageLockGuard};

/// Dense storage of one component class keyed by entity id.
///
/// Slots `[0, inactive_len)` hold deactivated components, the rest are
/// active. Groups occupy the front of the active region.
pub struct ComponentStorage {
    descriptor: TypeDescriptor,
    sparse: SparsePages,
    dense: Vec<EntityId>,
    column: Box<dyn Column>,
    /// Deactivated prefix length.
    inactive: usize,
    /// Logical capacity shared by `dense` and `column`.
    capacity: usize,
    lock: StorageLock,
}

impl ComponentStorage {
    /// Creates an empty storage for the described class. Allocates nothing.
    #[must_use]
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Self {
            descriptor,
            sparse: SparsePages::new(),
            dense: Vec::new(),
            column: descriptor.new_column(),
            inactive: 0,
            capacity: 0,
            lock: StorageLock::new(),
        }
    }

    /// Creates an empty storage for `C`.
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self::new(TypeDescriptor::of::<C>())
    }

    /// Creates an empty storage with `capacity` slots reserved up front.
    pub(crate) fn with_capacity(descriptor: TypeDescriptor, capacity: usize) -> Self {
        let mut storage = Self::new(descriptor);
        if capacity > 0 {
            storage.resize_buffers(capacity);
        }
        storage
    }

    // =========================================================================
    // Shape
    // =========================================================================

    /// Class stored here.
    #[inline]
    #[must_use]
    pub const fn class_id(&self) -> ClassId {
        self.descriptor.class_id()
    }

    /// Descriptor of the stored class.
    #[inline]
    #[must_use]
    pub const fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Number of stored components, active or not.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if nothing is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Slots reserved for both the id and payload buffers.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of deactivated components (the `[0, n)` prefix).
    #[inline]
    #[must_use]
    pub const fn inactive_len(&self) -> usize {
        self.inactive
    }

    /// Number of active components.
    #[inline]
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.dense.len() - self.inactive
    }

    /// Length of the sparse page directory.
    #[inline]
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.sparse.page_count()
    }

    /// Number of sparse pages currently allocated.
    #[must_use]
    pub fn allocated_pages(&self) -> usize {
        self.sparse.allocated_pages()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Checks if `id` has a component here.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.sparse.get(id).is_some()
    }

    /// Dense index of `id`, if present.
    #[inline]
    #[must_use]
    pub fn index_of(&self, id: EntityId) -> Option<usize> {
        self.sparse.get(id)
    }

    /// Checks if `id` is present and active.
    #[inline]
    #[must_use]
    pub fn is_active(&self, id: EntityId) -> bool {
        self.sparse.get(id).is_some_and(|index| index >= self.inactive)
    }

    /// Entity ids in dense order.
    #[inline]
    #[must_use]
    pub fn ids(&self) -> &[EntityId] {
        &self.dense
    }

    /// Entity ids of the active region, in dense order.
    #[inline]
    #[must_use]
    pub fn active_ids(&self) -> &[EntityId] {
        &self.dense[self.inactive..]
    }

    /// Payload at a dense index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or `C` is not the stored class.
    #[inline]
    #[must_use]
    pub fn get_by_index<C: Component>(&self, index: usize) -> &C {
        self.check_index(index);
        &self.as_slice::<C>()[index]
    }

    /// Mutable payload at a dense index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or `C` is not the stored class.
    #[inline]
    pub fn get_by_index_mut<C: Component>(&mut self, index: usize) -> &mut C {
        self.check_index(index);
        &mut self.as_mut_slice::<C>()[index]
    }

    /// Payload of `id`, or `None` if it has no component here.
    #[inline]
    #[must_use]
    pub fn get_by_id<C: Component>(&self, id: EntityId) -> Option<&C> {
        let index = self.sparse.get(id)?;
        Some(&self.as_slice::<C>()[index])
    }

    /// Mutable payload of `id`, or `None` if it has no component here.
    #[inline]
    pub fn get_by_id_mut<C: Component>(&mut self, id: EntityId) -> Option<&mut C> {
        let index = self.sparse.get(id)?;
        Some(&mut self.as_mut_slice::<C>()[index])
    }

    /// Payload of an id the caller already knows is present.
    ///
    /// Hot-path variant of [`Self::get_by_id`]: skips the absence check and
    /// panics instead of returning `None`.
    #[inline]
    #[must_use]
    pub fn get_by_id_unchecked<C: Component>(&self, id: EntityId) -> &C {
        let index = self.sparse.get_unchecked(id);
        &self.as_slice::<C>()[index]
    }

    /// Mutable variant of [`Self::get_by_id_unchecked`].
    #[inline]
    pub fn get_by_id_unchecked_mut<C: Component>(&mut self, id: EntityId) -> &mut C {
        let index = self.sparse.get_unchecked(id);
        &mut self.as_mut_slice::<C>()[index]
    }

    /// Untyped payload of `id`, for callers that only know the class id.
    #[must_use]
    pub fn get_raw(&self, id: EntityId) -> Option<&dyn Any> {
        let index = self.sparse.get(id)?;
        Some(self.column.get(index))
    }

    /// Untyped mutable payload of `id`.
    pub fn get_raw_mut(&mut self, id: EntityId) -> Option<&mut dyn Any> {
        let index = self.sparse.get(id)?;
        Some(self.column.get_mut(index))
    }

    /// All payloads in dense order.
    ///
    /// # Panics
    ///
    /// Panics if `C` is not the stored class.
    #[inline]
    #[must_use]
    pub fn as_slice<C: Component>(&self) -> &[C] {
        typed::<C>(self.column.as_ref()).as_slice()
    }

    /// All payloads in dense order, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `C` is not the stored class.
    #[inline]
    pub fn as_mut_slice<C: Component>(&mut self) -> &mut [C] {
        typed_mut::<C>(self.column.as_mut()).as_mut_slice()
    }

    /// Active payloads, starting past the deactivated prefix.
    #[inline]
    #[must_use]
    pub fn active_slice<C: Component>(&self) -> &[C] {
        &self.as_slice::<C>()[self.inactive..]
    }

    /// Active payloads, mutably.
    #[inline]
    pub fn active_slice_mut<C: Component>(&mut self) -> &mut [C] {
        let inactive = self.inactive;
        &mut self.as_mut_slice::<C>()[inactive..]
    }

    /// Iterates over `(id, payload)` pairs in dense order.
    pub fn iter<C: Component>(&self) -> impl Iterator<Item = (EntityId, &C)> {
        self.dense.iter().copied().zip(self.as_slice::<C>())
    }

    #[inline]
    fn check_index(&self, index: usize) {
        assert!(
            index < self.dense.len(),
            "dense index {index} out of bounds for {} (len {})",
            self.descriptor.name(),
            self.dense.len()
        );
    }

    // =========================================================================
    // Advisory lock
    // =========================================================================

    /// Takes the storage's cooperative lock (re-entrant per thread).
    ///
    /// See [`StorageLock`]: only callers that also lock are serialized.
    #[inline]
    pub fn lock(&self) {
        self.lock.lock();
    }

    /// Takes the lock if free or already owned by this thread.
    #[inline]
    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.lock.try_lock()
    }

    /// Releases one level of the lock.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not own the lock.
    #[inline]
    pub fn unlock(&self) {
        self.lock.unlock();
    }

    /// Takes the lock for the lifetime of the returned guard.
    #[inline]
    #[must_use]
    pub fn lock_guard(&self) -> StorageLockGuard<'_> {
        self.lock.guard()
    }

    /// The lock itself, for state queries.
    #[inline]
    #[must_use]
    pub const fn lock_state(&self) -> &StorageLock {
        &self.lock
    }

    // =========================================================================
    // Structural operations
    // =========================================================================

    /// Appends `id` and constructs its payload with `construct`, which must
    /// push exactly one value. Returns the dense index.
    ///
    /// # Panics
    ///
    /// Panics if `id` is null or already present.
    pub(crate) fn insert(&mut self, id: EntityId, construct: impl FnOnce(&mut dyn Column)) -> usize {
        assert!(!id.is_null(), "the null entity cannot hold components");
        assert!(
            !self.contains(id),
            "entity {id} already has a {} component",
            self.descriptor.name()
        );

        if self.dense.len() == self.capacity {
            self.resize_buffers((self.capacity * 2).max(1));
        }

        let index = self.dense.len();
        self.sparse.insert(id, index);
        self.dense.push(id);
        construct(self.column.as_mut());
        assert_eq!(
            self.column.len(),
            self.dense.len(),
            "payload construction must append exactly one value"
        );
        index
    }

    /// Appends `id` with a payload value.
    pub(crate) fn insert_value<C: Component>(&mut self, id: EntityId, value: C) -> usize {
        self.insert(id, move |column| typed_mut::<C>(column).push(value))
    }

    /// Swap-removes `id`. Returns `false` if it was absent.
    ///
    /// `grouped_len` is the length of the grouped block at the front of the
    /// active region; the caller must already have moved `id` out of it.
    pub(crate) fn remove(&mut self, id: EntityId, grouped_len: usize) -> bool {
        let Some(mut index) = self.sparse.get(id) else {
            return false;
        };

        if index < self.inactive {
            self.activate_at(index, grouped_len);
            index = self.sparse.get_unchecked(id);
        }
        debug_assert!(
            index >= self.inactive + grouped_len,
            "entity {id} is still inside a group"
        );

        let last = self.dense.len() - 1;
        self.swap_slots(index, last);
        self.sparse.remove(id);
        self.dense.pop();
        self.column.pop();

        let len = self.dense.len();
        if len == 0 {
            self.release_buffers();
        } else if len * 4 < self.capacity {
            self.resize_buffers(self.capacity / 2);
        }
        true
    }

    /// Moves `id` across the active boundary. Returns `true` if its state
    /// changed.
    ///
    /// The grouped block keeps its relative slots: deactivation rotates the
    /// block one slot right behind the grown boundary, reactivation rotates
    /// it back. The caller must have moved `id` out of every group before
    /// deactivating it.
    pub(crate) fn set_active(&mut self, id: EntityId, active: bool, grouped_len: usize) -> bool {
        let Some(index) = self.sparse.get(id) else {
            return false;
        };
        if active == (index >= self.inactive) {
            return false;
        }

        if active {
            self.activate_at(index, grouped_len);
        } else {
            self.deactivate_at(index, grouped_len);
        }
        true
    }

    fn deactivate_at(&mut self, index: usize, grouped_len: usize) {
        let block_end = self.inactive + grouped_len;
        debug_assert!(index >= block_end, "deactivating a grouped slot");

        self.swap_slots(index, block_end);
        if grouped_len > 0 {
            self.rotate_right(self.inactive, block_end + 1);
        }
        self.inactive += 1;
    }

    fn activate_at(&mut self, index: usize, grouped_len: usize) {
        let boundary = self.inactive - 1;
        self.swap_slots(index, boundary);
        self.inactive = boundary;
        if grouped_len > 0 {
            self.rotate_left(boundary, boundary + grouped_len + 1);
        }
    }

    /// Swaps two dense slots, payloads and sparse entries included.
    pub(crate) fn swap_slots(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.dense.swap(a, b);
        self.column.swap(a, b);
        self.sparse.set(self.dense[a], a);
        self.sparse.set(self.dense[b], b);
    }

    fn rotate_right(&mut self, start: usize, end: usize) {
        self.dense[start..end].rotate_right(1);
        self.column.rotate_right(start, end);
        self.reindex(start, end);
    }

    fn rotate_left(&mut self, start: usize, end: usize) {
        self.dense[start..end].rotate_left(1);
        self.column.rotate_left(start, end);
        self.reindex(start, end);
    }

    fn reindex(&mut self, start: usize, end: usize) {
        for (offset, &id) in self.dense[start..end].iter().enumerate() {
            self.sparse.set(id, start + offset);
        }
    }

    /// Replaces the contents with a deep copy of `other`.
    ///
    /// # Panics
    ///
    /// Panics if `other` stores a different class.
    pub(crate) fn copy_from(&mut self, other: &Self) {
        assert_eq!(
            self.class_id(),
            other.class_id(),
            "cannot copy a storage of another class"
        );
        self.release_buffers();
        self.sparse = other.sparse.clone();
        self.dense = Vec::with_capacity(other.capacity);
        self.dense.extend_from_slice(&other.dense);
        self.column = other.column.duplicate();
        self.inactive = other.inactive;
        self.capacity = other.capacity;
    }

    /// Payload column, for moving staged payloads out.
    pub(crate) fn column_mut(&mut self) -> &mut dyn Column {
        self.column.as_mut()
    }

    fn resize_buffers(&mut self, capacity: usize) {
        let len = self.dense.len();
        if capacity > self.capacity {
            self.dense.reserve_exact(capacity - len);
            self.column.reserve_exact(capacity - len);
        } else {
            self.dense.shrink_to(capacity);
            self.column.shrink_to(capacity);
        }
        tracing::trace!(
            class = %self.class_id(),
            from = self.capacity,
            to = capacity,
            "storage capacity changed"
        );
        self.capacity = capacity;
    }

    fn release_buffers(&mut self) {
        self.dense = Vec::new();
        self.column.clear();
        self.sparse.clear();
        self.inactive = 0;
        self.capacity = 0;
    }
}

impl Clone for ComponentStorage {
    /// Deep copy. The clone starts unlocked.
    fn clone(&self) -> Self {
        let mut copy = Self::new(self.descriptor);
        copy.copy_from(self);
        copy
    }
}

impl fmt::Debug for ComponentStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentStorage")
            .field("class", &self.descriptor.name())
            .field("len", &self.dense.len())
            .field("inactive", &self.inactive)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
