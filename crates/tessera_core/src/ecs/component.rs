//! # Component Types
//!
//! Components are plain data identified by a [`ClassId`]. Storages are
//! never generic over the component type: everything a storage needs to
//! know about a class is carried by its [`TypeDescriptor`], which is built
//! once by the embedding registration system and looked up by class id.

use std::collections::HashMap;
use std::fmt;

use super::column::{Column, TypedColumn};
use super::entity::EntitySignature;

/// Identifier of a component class, assigned by the registration system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClassId(u32);

impl ClassId {
    /// Class of the per-entity signature kept in the entity storage.
    /// Reserved, never handed to user components.
    pub const ENTITY: Self = Self(u32::MAX);

    /// Creates a class id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw class id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Clone`: copy-construction when a payload is added from a source
/// - `Default`: construction when no source is given
/// - `Send + Sync`: staged payloads are produced on worker threads
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Debug, Default)]
/// struct Health {
///     value: u32,
/// }
///
/// impl Component for Health {
///     const CLASS_ID: ClassId = ClassId::new(1);
/// }
/// ```
pub trait Component: Clone + Default + Send + Sync + 'static {
    /// Unique class id of this component type.
    const CLASS_ID: ClassId;
}

impl Component for EntitySignature {
    const CLASS_ID: ClassId = ClassId::ENTITY;
}

/// Everything a storage needs to know about one component class.
///
/// The column produced by [`TypeDescriptor::new_column`] implements
/// construct, destruct, copy, move and swap for the class.
#[derive(Clone, Copy, Debug)]
pub struct TypeDescriptor {
    class_id: ClassId,
    name: &'static str,
    size: usize,
    align: usize,
    new_column: fn() -> Box<dyn Column>,
}

impl TypeDescriptor {
    /// Builds the descriptor of a component type.
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self {
            class_id: C::CLASS_ID,
            name: std::any::type_name::<C>(),
            size: std::mem::size_of::<C>(),
            align: std::mem::align_of::<C>(),
            new_column: new_column::<C>,
        }
    }

    /// Class id this descriptor belongs to.
    #[inline]
    #[must_use]
    pub const fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Type name, for diagnostics.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Payload size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Payload alignment in bytes.
    #[inline]
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Creates an empty payload column for this class.
    #[must_use]
    pub fn new_column(&self) -> Box<dyn Column> {
        (self.new_column)()
    }
}

fn new_column<C: Component>() -> Box<dyn Column> {
    Box::new(TypedColumn::<C>::new())
}

/// Class id → descriptor table.
///
/// Needed by every call that names a component only by class id.
/// Typed calls derive the descriptor from the [`Component`] impl instead.
///
/// # Example
///
/// ```rust,ignore
/// let registry = TypeRegistry::new().with::<Health>().with::<Shield>();
/// let world = World::with_registry(Arc::new(registry), WorldConfig::default());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    descriptors: HashMap<ClassId, TypeDescriptor>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `C`, builder style.
    #[must_use]
    pub fn with<C: Component>(mut self) -> Self {
        self.register::<C>();
        self
    }

    /// Registers `C`.
    ///
    /// # Panics
    ///
    /// Panics if another type already uses the same class id.
    pub fn register<C: Component>(&mut self) -> &mut Self {
        self.insert(TypeDescriptor::of::<C>());
        self
    }

    /// Registers a descriptor. Re-registering the same type is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the class id is reserved or already used by another type.
    pub fn insert(&mut self, descriptor: TypeDescriptor) {
        let class_id = descriptor.class_id();
        assert!(
            class_id != ClassId::ENTITY,
            "{class_id} is reserved for entity signatures"
        );
        if let Some(existing) = self.descriptors.get(&class_id) {
            assert!(
                existing.name() == descriptor.name(),
                "{class_id} registered twice: {} and {}",
                existing.name(),
                descriptor.name()
            );
            return;
        }
        self.descriptors.insert(class_id, descriptor);
    }

    /// Looks up a descriptor.
    #[must_use]
    pub fn get(&self, class_id: ClassId) -> Option<&TypeDescriptor> {
        self.descriptors.get(&class_id)
    }

    /// Looks up a descriptor that must exist.
    ///
    /// # Panics
    ///
    /// Panics if `class_id` was never registered.
    #[must_use]
    pub fn descriptor(&self, class_id: ClassId) -> TypeDescriptor {
        match self.descriptors.get(&class_id) {
            Some(descriptor) => *descriptor,
            None => panic!("{class_id} is not registered"),
        }
    }

    /// Number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// A tuple of component types, used to declare groups.
pub trait ComponentSet {
    /// Descriptors of every member type, in tuple order.
    fn descriptors() -> Vec<TypeDescriptor>;
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn descriptors() -> Vec<TypeDescriptor> {
                vec![$(TypeDescriptor::of::<$name>()),+]
            }
        }
    };
}

impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
