//! # ECS World
//!
//! The container for every entity and component of one simulation.
//!
//! - One [`ComponentStorage`] per component class, created on first use
//! - One entity storage holding the [`EntitySignature`] of each live entity
//! - The id allocator, signature slot table, groups and listeners
//!
//! ## Immediate and pending mode
//!
//! With pending operations disabled, mutators apply at once and listeners
//! are notified inline. With them enabled, mutators only record the change
//! (see [`Deferred`]) and [`World::perform_pending`] applies everything at
//! one point.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::allocator::EntityAllocator;
use super::column::{typed_mut, Column};
use super::component::{ClassId, Component, ComponentSet, TypeDescriptor, TypeRegistry};
use super::entity::{EntityId, EntitySignature, SignatureSlot};
use super::event::{ListenerId, Listeners, WorldEvent};
use super::group::{Group, Groups, StorageMap};
use super::storage::ComponentStorage;
use crate::config::WorldConfig;
use crate::sync::{Deferred, PendingOperations};

/// The ECS World - container for all entities and components.
///
/// # Example
///
/// ```rust,ignore
/// let mut world = World::new();
///
/// let player = world.add_entity();
/// world.add_component(player, Health(100));
/// world.set_component_group::<(Position, Velocity)>();
/// ```
pub struct World {
    config: WorldConfig,
    registry: Arc<TypeRegistry>,
    allocator: Mutex<EntityAllocator>,
    /// Live entities and their signatures.
    entities: ComponentStorage,
    storages: StorageMap,
    slots: HashMap<ClassId, SignatureSlot>,
    /// Class of each assigned slot, indexed by slot.
    slot_classes: Vec<ClassId>,
    groups: Groups,
    pending: PendingOperations,
    pending_enabled: bool,
    listeners: Listeners,
}

impl World {
    /// Creates a world with the default config and an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates a world with an empty registry.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self::with_registry(Arc::new(TypeRegistry::new()), config)
    }

    /// Creates a world.
    ///
    /// `registry` describes the classes reached by class id only; typed
    /// calls work without it.
    #[must_use]
    pub fn with_registry(registry: Arc<TypeRegistry>, config: WorldConfig) -> Self {
        tracing::debug!(
            world = %config.name,
            entity_capacity = config.entity_capacity,
            pending = config.enable_pending_operations,
            "world created"
        );
        Self {
            entities: ComponentStorage::with_capacity(
                TypeDescriptor::of::<EntitySignature>(),
                config.entity_capacity,
            ),
            pending_enabled: config.enable_pending_operations,
            config,
            registry,
            allocator: Mutex::new(EntityAllocator::new()),
            storages: StorageMap::new(),
            slots: HashMap::new(),
            slot_classes: Vec::new(),
            groups: Groups::default(),
            pending: PendingOperations::default(),
            listeners: Listeners::default(),
        }
    }

    /// The config this world was created with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Descriptor table used by class-id calls.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Adds an entity and returns its id.
    ///
    /// In pending mode the id is reserved at once but the entity only
    /// becomes live at the next drain.
    pub fn add_entity(&mut self) -> EntityId {
        self.add_entity_with_hint(EntityId::NULL)
    }

    /// Adds an entity, reusing `hint` if that id is free.
    ///
    /// # Panics
    ///
    /// Panics if the chosen id is still present in any storage, or if a
    /// free `hint` lies more than [`MAX_HINT_GAP`](super::MAX_HINT_GAP) ids
    /// above the allocator's high-water mark.
    pub fn add_entity_with_hint(&mut self, hint: EntityId) -> EntityId {
        if self.pending_enabled {
            return self.deferred().add_entity_with_hint(hint);
        }
        let id = self.allocate_id(Some(hint));
        self.construct_entity(id);
        self.emit(&WorldEvent::EntityAdded(id));
        id
    }

    /// Removes an entity and every component it has.
    ///
    /// Returns `false` if it is not live (or, in pending mode, not pending).
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        if self.pending_enabled {
            return self.deferred().remove_entity(id);
        }
        if !self.has_entity(id) {
            return false;
        }
        self.emit_entity_removed(id);
        self.destroy_entity(id);
        true
    }

    /// Checks if `id` is a live entity.
    #[inline]
    #[must_use]
    pub fn has_entity(&self, id: EntityId) -> bool {
        self.entities.contains(id)
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Live entity ids, in storage order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        self.entities.ids()
    }

    /// Signature of a live entity.
    #[must_use]
    pub fn get_signature(&self, id: EntityId) -> Option<EntitySignature> {
        self.entities.get_by_id::<EntitySignature>(id).copied()
    }

    /// The storage of entity signatures.
    #[must_use]
    pub const fn entity_storage(&self) -> &ComponentStorage {
        &self.entities
    }

    /// State of the id allocator.
    #[must_use]
    pub fn allocator(&self) -> EntityAllocator {
        self.allocator.lock().clone()
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Adds a component.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not live or already has a `C`.
    pub fn add_component<C: Component>(&mut self, id: EntityId, value: C) {
        if self.pending_enabled {
            self.deferred().add_component(id, value);
            return;
        }
        self.construct_component(id, TypeDescriptor::of::<C>(), move |column| {
            typed_mut::<C>(column).push(value);
        });
        self.emit(&WorldEvent::ComponentAdded {
            entity: id,
            class: C::CLASS_ID,
        });
    }

    /// Adds a component by class id, copied from `src` or defaulted.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not live, already has the component, `src`
    /// has the wrong type, or the class has no descriptor.
    pub fn add_component_raw(&mut self, id: EntityId, class: ClassId, src: Option<&dyn Any>) {
        if self.pending_enabled {
            self.deferred().add_component_raw(id, class, src);
            return;
        }
        let descriptor = self.descriptor_of(class);
        self.construct_component(id, descriptor, |column| match src {
            Some(src) => column.push_copy(src),
            None => column.push_default(),
        });
        self.emit(&WorldEvent::ComponentAdded { entity: id, class });
    }

    /// Removes a component. Returns `false` if the entity has none.
    pub fn remove_component<C: Component>(&mut self, id: EntityId) -> bool {
        self.remove_component_raw(id, C::CLASS_ID)
    }

    /// Removes a component by class id. Returns `false` if the entity has
    /// none.
    pub fn remove_component_raw(&mut self, id: EntityId, class: ClassId) -> bool {
        if self.pending_enabled {
            return self.deferred().remove_component_raw(id, class);
        }
        if !self.has_component_raw(id, class) {
            return false;
        }
        self.emit(&WorldEvent::ComponentRemoved { entity: id, class });
        self.destroy_component(id, class)
    }

    /// Checks if the entity has a `C`, active or not.
    #[inline]
    #[must_use]
    pub fn has_component<C: Component>(&self, id: EntityId) -> bool {
        self.has_component_raw(id, C::CLASS_ID)
    }

    /// Checks if the entity has a component of `class`, active or not.
    #[must_use]
    pub fn has_component_raw(&self, id: EntityId, class: ClassId) -> bool {
        self.storages
            .get(&class)
            .is_some_and(|storage| storage.contains(id))
    }

    /// The entity's `C`, if any.
    #[must_use]
    pub fn get_component<C: Component>(&self, id: EntityId) -> Option<&C> {
        self.storages.get(&C::CLASS_ID)?.get_by_id::<C>(id)
    }

    /// The entity's `C`, mutably.
    pub fn get_component_mut<C: Component>(&mut self, id: EntityId) -> Option<&mut C> {
        self.storages.get_mut(&C::CLASS_ID)?.get_by_id_mut::<C>(id)
    }

    /// Untyped component access by class id.
    #[must_use]
    pub fn get_component_raw(&self, id: EntityId, class: ClassId) -> Option<&dyn Any> {
        self.storages.get(&class)?.get_raw(id)
    }

    /// Untyped mutable component access by class id.
    pub fn get_component_raw_mut(&mut self, id: EntityId, class: ClassId) -> Option<&mut dyn Any> {
        self.storages.get_mut(&class)?.get_raw_mut(id)
    }

    /// Storage of `class`, for bulk or locked access.
    #[must_use]
    pub fn get_component_storage(&self, class: ClassId) -> Option<&ComponentStorage> {
        self.storages.get(&class)
    }

    /// Mutable storage of `class`. Payloads may be edited in place; the
    /// layout can only change through the world.
    pub fn get_component_storage_mut(&mut self, class: ClassId) -> Option<&mut ComponentStorage> {
        self.storages.get_mut(&class)
    }

    /// Storage of `C`.
    #[must_use]
    pub fn storage<C: Component>(&self) -> Option<&ComponentStorage> {
        self.storages.get(&C::CLASS_ID)
    }

    /// Mutable storage of `C`.
    pub fn storage_mut<C: Component>(&mut self) -> Option<&mut ComponentStorage> {
        self.storages.get_mut(&C::CLASS_ID)
    }

    /// Signature slot of `class`, assigned on first use.
    ///
    /// # Panics
    ///
    /// Panics when a 65th class asks for a slot.
    pub fn get_component_id(&mut self, class: ClassId) -> SignatureSlot {
        if let Some(&slot) = self.slots.get(&class) {
            return slot;
        }
        assert!(class != ClassId::ENTITY, "{class} cannot take a signature slot");

        let next = self.slot_classes.len();
        assert!(
            next < EntitySignature::MAX_SLOTS,
            "signature slot limit reached: a world holds at most {} component classes, {class} is one too many",
            EntitySignature::MAX_SLOTS
        );
        #[allow(clippy::cast_possible_truncation)]
        let slot = next as SignatureSlot;
        self.slots.insert(class, slot);
        self.slot_classes.push(class);
        tracing::debug!(world = %self.config.name, %class, slot, "signature slot assigned");
        slot
    }

    /// Signature slot of `class`, if one was assigned.
    #[must_use]
    pub fn component_slot(&self, class: ClassId) -> Option<SignatureSlot> {
        self.slots.get(&class).copied()
    }

    /// Classes of every component the entity has.
    #[must_use]
    pub fn component_classes(&self, id: EntityId) -> Vec<ClassId> {
        self.get_signature(id)
            .map(|signature| {
                signature
                    .slots()
                    .map(|slot| self.slot_classes[usize::from(slot)])
                    .collect()
            })
            .unwrap_or_default()
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Moves the entity's `C` across the active boundary. Returns `true` if
    /// its state changed.
    pub fn set_component_active<C: Component>(&mut self, id: EntityId, active: bool) -> bool {
        self.set_component_active_raw(id, C::CLASS_ID, active)
    }

    /// Class-id variant of [`Self::set_component_active`].
    ///
    /// Deactivated components stay stored but leave every group and the
    /// active slices.
    pub fn set_component_active_raw(&mut self, id: EntityId, class: ClassId, active: bool) -> bool {
        let Some(storage) = self.storages.get(&class) else {
            return false;
        };
        if !storage.contains(id) || storage.is_active(id) == active {
            return false;
        }

        if active {
            let grouped = self.groups.grouped_len(class);
            self.storage_of(class).set_active(id, true, grouped);
            self.groups.realign(class, id, &mut self.storages);
        } else {
            self.groups.dealign(class, id, &mut self.storages);
            let grouped = self.groups.grouped_len(class);
            self.storage_of(class).set_active(id, false, grouped);
        }
        true
    }

    /// Checks if the entity has an active `C`.
    #[must_use]
    pub fn is_component_active<C: Component>(&self, id: EntityId) -> bool {
        self.is_component_active_raw(id, C::CLASS_ID)
    }

    /// Checks if the entity has an active component of `class`.
    #[must_use]
    pub fn is_component_active_raw(&self, id: EntityId, class: ClassId) -> bool {
        self.storages
            .get(&class)
            .is_some_and(|storage| storage.is_active(id))
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Declares a group over the component types of `S`.
    ///
    /// Declaring the same set twice returns the existing group.
    ///
    /// # Panics
    ///
    /// Panics on fewer than two distinct types or a partial overlap with an
    /// existing group.
    pub fn set_component_group<S: ComponentSet>(&mut self) -> &Group {
        let descriptors = S::descriptors();
        self.declare_group(descriptors)
    }

    /// Declares a group by class ids.
    ///
    /// # Panics
    ///
    /// Same as [`Self::set_component_group`], plus if a class has no
    /// descriptor.
    pub fn set_component_group_raw(&mut self, classes: &[ClassId]) -> &Group {
        let descriptors = classes.iter().map(|&class| self.descriptor_of(class)).collect();
        self.declare_group(descriptors)
    }

    fn declare_group(&mut self, descriptors: Vec<TypeDescriptor>) -> &Group {
        let classes = descriptors.iter().map(TypeDescriptor::class_id).collect();
        for descriptor in descriptors {
            self.storage_entry(descriptor);
        }
        let index = self.groups.declare(classes, &mut self.storages);
        &self.groups.as_slice()[index]
    }

    /// Every declared group.
    #[must_use]
    pub fn groups(&self) -> &[Group] {
        self.groups.as_slice()
    }

    // =========================================================================
    // Pending operations
    // =========================================================================

    /// Returns `true` if structural changes are buffered.
    #[inline]
    #[must_use]
    pub const fn pending_operations_enabled(&self) -> bool {
        self.pending_enabled
    }

    /// Switches pending mode. Disabling it drains every buffer first,
    /// including changes queued by listeners during that drain.
    pub fn set_pending_operations(&mut self, enabled: bool) {
        if !enabled {
            while !self.pending.is_empty() {
                self.perform_pending();
            }
        }
        self.pending_enabled = enabled;
    }

    /// Handle for recording structural changes through `&World`.
    ///
    /// # Panics
    ///
    /// Panics if pending operations are disabled.
    #[must_use]
    pub fn deferred(&self) -> Deferred<'_> {
        assert!(
            self.pending_enabled,
            "pending operations are disabled on world `{}`",
            self.config.name
        );
        Deferred::new(self)
    }

    /// Applies every buffered change.
    ///
    /// 1. Remove events fire while everything is still readable.
    /// 2. Component and entity removals are applied.
    /// 3. Entity and component additions are applied.
    /// 4. Add events fire.
    ///
    /// Changes queued by listeners meanwhile wait for the next call. Does
    /// nothing when the buffers are empty.
    pub fn perform_pending(&mut self) {
        let drained = self.pending.take();
        if drained.is_empty() {
            return;
        }
        let entities = drained.entities;
        let doomed: HashSet<EntityId> = entities.removes.iter().copied().collect();

        for (class, buffer) in &drained.components {
            for &id in &buffer.removes {
                if !doomed.contains(&id) && self.has_component_raw(id, *class) {
                    self.emit(&WorldEvent::ComponentRemoved { entity: id, class: *class });
                }
            }
        }
        for &id in &entities.removes {
            self.emit_entity_removed(id);
        }

        let mut removed = 0;
        for (class, buffer) in &drained.components {
            for &id in &buffer.removes {
                if !doomed.contains(&id) && self.destroy_component(id, *class) {
                    removed += 1;
                }
            }
        }
        for &id in &entities.removes {
            self.destroy_entity(id);
        }

        for &id in &entities.adds {
            self.construct_entity(id);
        }
        for &id in &entities.cancelled {
            self.allocator.get_mut().release(id);
        }
        let cancelled: HashSet<EntityId> = entities.cancelled.iter().copied().collect();

        let mut added = Vec::new();
        for (class, mut buffer) in drained.components {
            let descriptor = *buffer.staging.descriptor();
            for index in 0..buffer.staging.len() {
                let id = buffer.staging.ids()[index];
                if !self.has_entity(id) {
                    if cancelled.contains(&id) {
                        tracing::debug!(
                            world = %self.config.name,
                            entity = %id,
                            %class,
                            "staged component dropped with its cancelled entity"
                        );
                    } else {
                        tracing::warn!(
                            world = %self.config.name,
                            entity = %id,
                            %class,
                            "staged component discarded: entity is gone"
                        );
                    }
                    continue;
                }
                let staging = buffer.staging.column_mut();
                self.construct_component(id, descriptor, |column| column.push_transfer(staging, index));
                added.push((id, class));
            }
        }

        for &id in &entities.adds {
            self.emit(&WorldEvent::EntityAdded(id));
        }
        for &(id, class) in &added {
            self.emit(&WorldEvent::ComponentAdded { entity: id, class });
        }

        tracing::debug!(
            world = %self.config.name,
            entities_added = entities.adds.len(),
            entities_removed = entities.removes.len(),
            components_added = added.len(),
            components_removed = removed,
            "pending operations applied"
        );
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a listener for structural changes.
    ///
    /// Listeners only read the world. In pending mode they can queue further
    /// changes through [`World::deferred`].
    pub fn add_listener(
        &mut self,
        listener: impl Fn(&World, &WorldEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.add(Box::new(listener))
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Replaces this world's state with a deep copy of `other`'s.
    ///
    /// Both worlds are drained first. Allocator, slot table, entity storage,
    /// component storages and groups are copied. Listeners, config and
    /// pending mode stay as they were.
    pub fn copy_from(&mut self, other: &mut World) {
        self.perform_pending();
        other.perform_pending();

        self.registry = Arc::clone(&other.registry);
        *self.allocator.get_mut() = other.allocator.get_mut().clone();
        self.slots.clone_from(&other.slots);
        self.slot_classes.clone_from(&other.slot_classes);
        self.entities.copy_from(&other.entities);

        self.storages.retain(|class, _| other.storages.contains_key(class));
        for (class, source) in &other.storages {
            self.storages
                .entry(*class)
                .or_insert_with(|| ComponentStorage::new(*source.descriptor()))
                .copy_from(source);
        }
        self.groups = other.groups.clone();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    pub(crate) const fn pending(&self) -> &PendingOperations {
        &self.pending
    }

    /// Allocates an id and checks that nothing still lives under it.
    pub(crate) fn allocate_id(&self, hint: Option<EntityId>) -> EntityId {
        let id = self.allocator.lock().allocate(hint);
        assert!(!self.entities.contains(id), "entity id {id} is already in use");
        for storage in self.storages.values() {
            assert!(
                !storage.contains(id),
                "free entity id {id} still owns a {} component",
                storage.descriptor().name()
            );
        }
        id
    }

    /// Descriptor of `class`: from its storage if one exists, otherwise
    /// from the registry.
    pub(crate) fn descriptor_of(&self, class: ClassId) -> TypeDescriptor {
        match self.storages.get(&class) {
            Some(storage) => *storage.descriptor(),
            None => self.registry.descriptor(class),
        }
    }

    fn storage_entry(&mut self, descriptor: TypeDescriptor) -> &mut ComponentStorage {
        let world = &self.config.name;
        self.storages
            .entry(descriptor.class_id())
            .or_insert_with(|| {
                tracing::debug!(
                    %world,
                    class = %descriptor.class_id(),
                    name = descriptor.name(),
                    "component storage created"
                );
                ComponentStorage::new(descriptor)
            })
    }

    fn storage_of(&mut self, class: ClassId) -> &mut ComponentStorage {
        match self.storages.get_mut(&class) {
            Some(storage) => storage,
            None => panic!("{class} has no storage"),
        }
    }

    fn construct_entity(&mut self, id: EntityId) {
        self.entities.insert_value(id, EntitySignature::EMPTY);
    }

    fn destroy_entity(&mut self, id: EntityId) {
        for class in self.component_classes(id) {
            self.destroy_component(id, class);
        }
        self.entities.remove(id, 0);
        self.allocator.get_mut().release(id);
    }

    fn construct_component(
        &mut self,
        id: EntityId,
        descriptor: TypeDescriptor,
        construct: impl FnOnce(&mut dyn Column),
    ) {
        assert!(
            self.has_entity(id),
            "cannot add {} to entity {id}: entity is not live",
            descriptor.name()
        );
        let class = descriptor.class_id();
        let slot = self.get_component_id(class);

        self.storage_entry(descriptor).insert(id, construct);
        self.groups.realign(class, id, &mut self.storages);
        self.entities
            .get_by_id_unchecked_mut::<EntitySignature>(id)
            .insert(slot);
    }

    fn destroy_component(&mut self, id: EntityId, class: ClassId) -> bool {
        if !self.has_component_raw(id, class) {
            return false;
        }
        self.groups.dealign(class, id, &mut self.storages);
        let grouped = self.groups.grouped_len(class);
        self.storage_of(class).remove(id, grouped);

        if let Some(&slot) = self.slots.get(&class) {
            if let Some(signature) = self.entities.get_by_id_mut::<EntitySignature>(id) {
                signature.remove(slot);
            }
        }
        true
    }

    fn emit(&self, event: &WorldEvent) {
        self.listeners.dispatch(self, event);
    }

    fn emit_entity_removed(&self, id: EntityId) {
        for class in self.component_classes(id) {
            self.emit(&WorldEvent::ComponentRemoved { entity: id, class });
        }
        self.emit(&WorldEvent::EntityRemoved(id));
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("name", &self.config.name)
            .field("entities", &self.entities.len())
            .field("storages", &self.storages.len())
            .field("groups", &self.groups.as_slice().len())
            .field("pending_enabled", &self.pending_enabled)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Position(i32);

    impl Component for Position {
        const CLASS_ID: ClassId = ClassId::new(1);
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Velocity(i32);

    impl Component for Velocity {
        const CLASS_ID: ClassId = ClassId::new(2);
    }

    fn assert_group_parity(world: &World) {
        for group in world.groups() {
            let classes = group.class_ids();
            let first = world.get_component_storage(classes[0]).unwrap();
            let prefix = &first.active_ids()[..group.matched_count()];
            for class in classes {
                let storage = world.get_component_storage(*class).unwrap();
                assert_eq!(&storage.active_ids()[..group.matched_count()], prefix);
            }
        }
    }

    #[test]
    fn test_world_creation() {
        let world = World::new();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.entity_storage().capacity(), 1024);
        assert!(!world.pending_operations_enabled());
    }

    #[test]
    fn test_add_and_remove_entity() {
        let mut world = World::new();
        let a = world.add_entity();
        let b = world.add_entity();
        assert_ne!(a, b);
        assert!(world.has_entity(a));

        assert!(world.remove_entity(a));
        assert!(!world.remove_entity(a));
        assert!(!world.has_entity(a));
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_signature_tracks_components() {
        let mut world = World::new();
        let entity = world.add_entity();
        world.add_component(entity, Velocity(1));
        world.add_component(entity, Position(2));

        let velocity_slot = world.component_slot(Velocity::CLASS_ID).unwrap();
        let position_slot = world.get_component_id(Position::CLASS_ID);
        assert_eq!((velocity_slot, position_slot), (0, 1));

        let signature = world.get_signature(entity).unwrap();
        assert!(signature.contains(velocity_slot) && signature.contains(position_slot));

        world.remove_component::<Velocity>(entity);
        let signature = world.get_signature(entity).unwrap();
        assert!(!signature.contains(velocity_slot));
        assert_eq!(world.component_classes(entity), vec![Position::CLASS_ID]);
    }

    #[test]
    fn test_remove_entity_removes_components() {
        let mut world = World::new();
        let entity = world.add_entity();
        world.add_component(entity, Position(1));
        world.add_component(entity, Velocity(1));

        world.remove_entity(entity);
        assert!(!world.has_component::<Position>(entity));
        assert_eq!(world.storage::<Velocity>().unwrap().len(), 0);
    }

    #[test]
    fn test_raw_access() {
        let registry = TypeRegistry::new().with::<Position>().with::<Velocity>();
        let mut world = World::with_registry(Arc::new(registry), WorldConfig::default());
        let entity = world.add_entity();

        world.add_component_raw(entity, Position::CLASS_ID, Some(&Position(7)));
        world.add_component_raw(entity, Velocity::CLASS_ID, None);
        assert_eq!(world.get_component::<Position>(entity), Some(&Position(7)));
        assert_eq!(world.get_component::<Velocity>(entity), Some(&Velocity(0)));

        let raw = world.get_component_raw_mut(entity, Position::CLASS_ID).unwrap();
        raw.downcast_mut::<Position>().unwrap().0 = 8;
        assert_eq!(
            world.get_component_raw(entity, Position::CLASS_ID).unwrap().downcast_ref(),
            Some(&Position(8))
        );
        assert!(world.remove_component_raw(entity, Velocity::CLASS_ID));
    }

    #[test]
    fn test_immediate_events() {
        let mut world = World::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = world.add_listener(move |world, event| {
            let present = world.has_component::<Position>(event.entity());
            sink.lock().push((*event, present));
        });

        let entity = world.add_entity();
        world.add_component(entity, Position(1));
        world.remove_entity(entity);

        let class = Position::CLASS_ID;
        assert_eq!(
            *seen.lock(),
            vec![
                (WorldEvent::EntityAdded(entity), false),
                (WorldEvent::ComponentAdded { entity, class }, true),
                (WorldEvent::ComponentRemoved { entity, class }, true),
                (WorldEvent::EntityRemoved(entity), true),
            ]
        );

        assert!(world.remove_listener(listener));
        assert_eq!(world.listener_count(), 0);
    }

    #[test]
    fn test_deactivation_keeps_groups() {
        let mut world = World::new();
        world.set_component_group::<(Position, Velocity)>();
        let entities: Vec<_> = (0..6).map(|_| world.add_entity()).collect();
        for (i, &entity) in entities.iter().enumerate() {
            world.add_component(entity, Position(i as i32));
            if i % 2 == 0 {
                world.add_component(entity, Velocity(i as i32));
            }
        }
        assert_eq!(world.groups()[0].matched_count(), 3);

        assert!(world.set_component_active::<Position>(entities[2], false));
        assert!(!world.is_component_active::<Position>(entities[2]));
        assert_eq!(world.groups()[0].matched_count(), 2);
        assert_group_parity(&world);

        world.set_component_active::<Position>(entities[1], false);
        world.remove_component::<Velocity>(entities[0]);
        assert_group_parity(&world);

        assert!(world.set_component_active::<Position>(entities[2], true));
        assert_eq!(world.groups()[0].matched_count(), 2);
        assert_group_parity(&world);

        // Removing a deactivated component.
        assert!(world.remove_component::<Position>(entities[1]));
        assert_group_parity(&world);
        assert_eq!(world.storage::<Position>().unwrap().inactive_len(), 0);
    }

    #[test]
    fn test_copy_from() {
        let mut source = World::new();
        source.set_component_group::<(Position, Velocity)>();
        let entity = source.add_entity();
        source.add_component(entity, Position(3));
        source.add_component(entity, Velocity(4));

        let mut target = World::new();
        let stale = target.add_entity();
        target.add_entity();
        target.add_component(stale, Velocity(9));

        target.copy_from(&mut source);
        assert_eq!(target.entities(), source.entities());
        assert_eq!(target.get_component::<Position>(entity), Some(&Position(3)));
        assert_eq!(target.groups(), source.groups());
        assert_eq!(target.allocator().high_water_mark(), 1);

        target.get_component_mut::<Position>(entity).unwrap().0 = 5;
        assert_eq!(source.get_component::<Position>(entity), Some(&Position(3)));
    }

    #[test]
    fn test_disabling_pending_drains() {
        let mut world = World::with_config(WorldConfig::deferred());
        let entity = world.add_entity();
        world.set_pending_operations(false);
        assert!(world.has_entity(entity));
    }

    #[test]
    #[should_panic(expected = "entity is not live")]
    fn test_component_on_dead_entity_panics() {
        let mut world = World::new();
        world.add_component(EntityId::new(3), Position(0));
    }

    #[test]
    #[should_panic(expected = "already has")]
    fn test_double_add_panics() {
        let mut world = World::new();
        let entity = world.add_entity();
        world.add_component(entity, Position(0));
        world.add_component(entity, Position(1));
    }

    #[test]
    #[should_panic(expected = "pending operations are disabled")]
    fn test_deferred_requires_pending_mode() {
        let world = World::new();
        let _ = world.deferred();
    }
}
