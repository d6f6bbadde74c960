//! # Type-Erased Payload Columns
//!
//! A [`Column`] is the dense payload array of one component class behind a
//! trait object. The only implementation is [`TypedColumn`], a `Vec<C>`:
//! growth, shrinking and element moves all come from `Vec`, so no payload
//! bytes are ever handled by hand.
//!
//! Every downcast from `dyn Column` back to a concrete type goes through
//! [`typed`] / [`typed_mut`], which treat a mismatch as a programming error.

use std::any::{type_name, Any};

use super::component::Component;

/// Dense, type-erased payload array of one component class.
///
/// Indices are dense slots of the owning storage. Out-of-range indices
/// panic.
pub trait Column: Send + Sync {
    /// Number of payloads.
    fn len(&self) -> usize;

    /// Returns `true` if the column holds no payload.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated payload slots.
    fn capacity(&self) -> usize;

    /// Reserves room for exactly `additional` more payloads.
    fn reserve_exact(&mut self, additional: usize);

    /// Shrinks the allocation down to at least `capacity` slots.
    fn shrink_to(&mut self, capacity: usize);

    /// Appends a default-constructed payload.
    fn push_default(&mut self);

    /// Appends a copy of `src`.
    ///
    /// # Panics
    ///
    /// Panics if `src` is not of this column's type.
    fn push_copy(&mut self, src: &dyn Any);

    /// Moves the payload at `index` of `src` onto the end of this column,
    /// leaving a default value behind in `src`.
    fn push_transfer(&mut self, src: &mut dyn Column, index: usize);

    /// Swaps two payloads.
    fn swap(&mut self, a: usize, b: usize);

    /// Rotates `[start, end)` one slot to the right: the last payload of the
    /// range moves to `start`.
    fn rotate_right(&mut self, start: usize, end: usize);

    /// Rotates `[start, end)` one slot to the left: the first payload of the
    /// range moves to `end - 1`.
    fn rotate_left(&mut self, start: usize, end: usize);

    /// Destroys the last payload.
    fn pop(&mut self);

    /// Destroys every payload and releases the allocation.
    fn clear(&mut self);

    /// Payload at `index`.
    fn get(&self, index: usize) -> &dyn Any;

    /// Mutable payload at `index`.
    fn get_mut(&mut self, index: usize) -> &mut dyn Any;

    /// Deep copy of the column, payload by payload.
    fn duplicate(&self) -> Box<dyn Column>;

    /// Upcast for downcasting to [`TypedColumn`].
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to [`TypedColumn`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// `Vec`-backed column of a concrete component type.
#[derive(Clone, Debug, Default)]
pub struct TypedColumn<C: Component> {
    data: Vec<C>,
}

impl<C: Component> TypedColumn<C> {
    /// Creates an empty column. Allocates nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Appends a payload by value.
    #[inline]
    pub fn push(&mut self, value: C) {
        self.data.push(value);
    }

    /// All payloads in dense order.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[C] {
        &self.data
    }

    /// All payloads in dense order, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [C] {
        &mut self.data
    }
}

impl<C: Component> Column for TypedColumn<C> {
    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn reserve_exact(&mut self, additional: usize) {
        self.data.reserve_exact(additional);
    }

    fn shrink_to(&mut self, capacity: usize) {
        self.data.shrink_to(capacity);
    }

    fn push_default(&mut self) {
        self.data.push(C::default());
    }

    fn push_copy(&mut self, src: &dyn Any) {
        match src.downcast_ref::<C>() {
            Some(value) => self.data.push(value.clone()),
            None => panic!("payload type mismatch: expected {}", type_name::<C>()),
        }
    }

    fn push_transfer(&mut self, src: &mut dyn Column, index: usize) {
        let value = std::mem::take(&mut typed_mut::<C>(src).data[index]);
        self.data.push(value);
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.data.swap(a, b);
    }

    fn rotate_right(&mut self, start: usize, end: usize) {
        self.data[start..end].rotate_right(1);
    }

    fn rotate_left(&mut self, start: usize, end: usize) {
        self.data[start..end].rotate_left(1);
    }

    #[inline]
    fn pop(&mut self) {
        self.data.pop();
    }

    fn clear(&mut self) {
        self.data = Vec::new();
    }

    #[inline]
    fn get(&self, index: usize) -> &dyn Any {
        &self.data[index]
    }

    #[inline]
    fn get_mut(&mut self, index: usize) -> &mut dyn Any {
        &mut self.data[index]
    }

    fn duplicate(&self) -> Box<dyn Column> {
        let mut data = Vec::with_capacity(self.data.capacity());
        data.extend(self.data.iter().cloned());
        Box::new(Self { data })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Downcasts a column to its concrete type.
///
/// # Panics
///
/// Panics if the column does not hold `C`.
#[inline]
#[must_use]
pub fn typed<C: Component>(column: &dyn Column) -> &TypedColumn<C> {
    match column.as_any().downcast_ref::<TypedColumn<C>>() {
        Some(column) => column,
        None => panic!("payload type mismatch: column does not hold {}", type_name::<C>()),
    }
}

/// Downcasts a column to its concrete type, mutably.
///
/// # Panics
///
/// Panics if the column does not hold `C`.
#[inline]
pub fn typed_mut<C: Component>(column: &mut dyn Column) -> &mut TypedColumn<C> {
    match column.as_any_mut().downcast_mut::<TypedColumn<C>>() {
        Some(column) => column,
        None => panic!("payload type mismatch: column does not hold {}", type_name::<C>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::ClassId;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Tag(u32);

    impl Component for Tag {
        const CLASS_ID: ClassId = ClassId::new(1);
    }

    #[derive(Clone, Debug, Default)]
    struct Other;

    impl Component for Other {
        const CLASS_ID: ClassId = ClassId::new(2);
    }

    fn column_of(values: &[u32]) -> TypedColumn<Tag> {
        let mut column = TypedColumn::new();
        for &value in values {
            column.push(Tag(value));
        }
        column
    }

    #[test]
    fn test_push_variants() {
        let mut column: Box<dyn Column> = Box::new(TypedColumn::<Tag>::new());
        column.push_default();
        column.push_copy(&Tag(7));
        assert_eq!(column.len(), 2);
        assert_eq!(typed::<Tag>(column.as_ref()).as_slice(), &[Tag(0), Tag(7)]);
    }

    #[test]
    fn test_transfer_leaves_default() {
        let mut staging = column_of(&[4, 5]);
        let mut live = TypedColumn::<Tag>::new();
        live.push_transfer(&mut staging, 1);
        assert_eq!(live.as_slice(), &[Tag(5)]);
        assert_eq!(staging.as_slice(), &[Tag(4), Tag(0)]);
    }

    #[test]
    fn test_rotations() {
        let mut column = column_of(&[0, 1, 2, 3, 4]);
        column.rotate_right(1, 4);
        assert_eq!(column.as_slice(), &[Tag(0), Tag(3), Tag(1), Tag(2), Tag(4)]);
        column.rotate_left(1, 4);
        assert_eq!(column.as_slice(), &[Tag(0), Tag(1), Tag(2), Tag(3), Tag(4)]);
    }

    #[test]
    fn test_duplicate_is_deep() {
        let column = column_of(&[1, 2]);
        let mut copy = column.duplicate();
        typed_mut::<Tag>(copy.as_mut()).as_mut_slice()[0] = Tag(9);
        assert_eq!(column.as_slice(), &[Tag(1), Tag(2)]);
        assert_eq!(typed::<Tag>(copy.as_ref()).as_slice(), &[Tag(9), Tag(2)]);
    }

    #[test]
    fn test_clear_releases_memory() {
        let mut column = column_of(&[1, 2, 3]);
        column.clear();
        assert_eq!(column.len(), 0);
        assert_eq!(column.capacity(), 0);
    }

    #[test]
    #[should_panic(expected = "payload type mismatch")]
    fn test_copy_mismatch_panics() {
        let mut column = TypedColumn::<Tag>::new();
        column.push_copy(&Other);
    }
}
