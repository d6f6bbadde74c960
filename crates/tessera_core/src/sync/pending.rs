//! # Pending Operations
//!
//! While pending operations are enabled, structural changes requested
//! through `&World` are only recorded here. They reach the live storages at
//! the next [`World::perform_pending`], which the scheduler calls at a
//! point where no other thread touches the world.
//!
//! ```text
//! worker threads                      perform_pending (&mut World)
//! ──────────────                      ────────────────────────────
//! deferred.add_component(e, Health) ─┐
//! deferred.remove_component::<S>(e) ─┼─> buffers ──> 1. remove events
//! deferred.add_entity()             ─┘                2. removals
//!                                                     3. additions
//!                                                     4. add events
//! ```
//!
//! ## Buffers
//!
//! - One buffer per component class, created the first time the class is
//!   touched. It holds a staging storage with the payloads of pending adds
//!   and the list of pending removes.
//! - One buffer for entity adds, removes and cancelled adds.
//!
//! Workers only contend on the buffer of the class they touch.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use parking_lot::{Mutex, RwLock};

use crate::ecs::{
    typed_mut, ClassId, Column, Component, ComponentStorage, EntityId, TypeDescriptor, World,
};

/// Entity ids in insertion order with O(1) membership.
///
/// Removal only drops the membership; the order vector is filtered once,
/// when the queue is drained.
#[derive(Debug, Default)]
struct IdQueue {
    order: Vec<EntityId>,
    members: HashSet<EntityId>,
}

impl IdQueue {
    /// Appends `id`. Returns `false` if it is already queued.
    fn push(&mut self, id: EntityId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push(id);
        true
    }

    fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }

    /// Takes `id` out of the queue. Returns `false` if it was not queued.
    fn remove(&mut self, id: EntityId) -> bool {
        self.members.remove(&id)
    }

    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Queued ids, oldest first.
    fn into_vec(self) -> Vec<EntityId> {
        let Self { order, mut members } = self;
        order.into_iter().filter(|id| members.remove(id)).collect()
    }
}

/// Pending adds and removes of one component class.
struct ComponentBuffer {
    /// Payloads of pending adds, keyed by entity.
    staging: ComponentStorage,
    /// Entities whose live component is to be removed.
    removes: IdQueue,
}

impl ComponentBuffer {
    fn new(descriptor: TypeDescriptor) -> Self {
        Self {
            staging: ComponentStorage::new(descriptor),
            removes: IdQueue::default(),
        }
    }

    fn is_empty(&self) -> bool {
        self.staging.is_empty() && self.removes.is_empty()
    }
}

#[derive(Debug, Default)]
struct EntityBuffer {
    adds: IdQueue,
    removes: IdQueue,
    /// Pending adds cancelled by a pending remove. Their ids are released
    /// at the drain.
    cancelled: Vec<EntityId>,
}

impl EntityBuffer {
    fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty() && self.cancelled.is_empty()
    }
}

/// Entity changes taken out by one drain.
pub(crate) struct DrainedEntities {
    pub(crate) adds: Vec<EntityId>,
    pub(crate) removes: Vec<EntityId>,
    pub(crate) cancelled: Vec<EntityId>,
}

/// Changes of one component class taken out by one drain.
pub(crate) struct DrainedComponents {
    pub(crate) staging: ComponentStorage,
    pub(crate) removes: Vec<EntityId>,
}

/// Everything taken out of the buffers by one drain.
pub(crate) struct Drained {
    pub(crate) entities: DrainedEntities,
    /// Component changes sorted by class id.
    pub(crate) components: Vec<(ClassId, DrainedComponents)>,
}

impl Drained {
    pub(crate) fn is_empty(&self) -> bool {
        let DrainedEntities {
            adds,
            removes,
            cancelled,
        } = &self.entities;
        adds.is_empty()
            && removes.is_empty()
            && cancelled.is_empty()
            && self
                .components
                .iter()
                .all(|(_, buffer)| buffer.staging.is_empty() && buffer.removes.is_empty())
    }
}

/// Buffers of a world's pending operations.
#[derive(Default)]
pub(crate) struct PendingOperations {
    components: RwLock<HashMap<ClassId, Mutex<ComponentBuffer>>>,
    entities: Mutex<EntityBuffer>,
}

impl PendingOperations {
    /// Runs `f` on the buffer of the described class, creating it if needed.
    fn with_buffer<R>(&self, descriptor: TypeDescriptor, f: impl FnOnce(&mut ComponentBuffer) -> R) -> R {
        let class = descriptor.class_id();
        {
            let buffers = self.components.read();
            if let Some(buffer) = buffers.get(&class) {
                return f(&mut buffer.lock());
            }
        }

        let mut buffers = self.components.write();
        let buffer = buffers
            .entry(class)
            .or_insert_with(|| Mutex::new(ComponentBuffer::new(descriptor)));
        f(buffer.get_mut())
    }

    /// Runs `f` on the buffer of `class` if it exists.
    fn with_existing_buffer<R>(&self, class: ClassId, f: impl FnOnce(&mut ComponentBuffer) -> R) -> Option<R> {
        let buffers = self.components.read();
        let buffer = buffers.get(&class)?;
        let result = f(&mut buffer.lock());
        Some(result)
    }

    fn is_entity_added(&self, id: EntityId) -> bool {
        self.entities.lock().adds.contains(id)
    }

    /// Returns `true` if nothing is buffered.
    pub(crate) fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
            && self.components.read().values().all(|buffer| buffer.lock().is_empty())
    }

    /// Takes every buffer, leaving fresh ones behind.
    pub(crate) fn take(&mut self) -> Drained {
        let entities = std::mem::take(self.entities.get_mut());
        let mut components: Vec<_> = std::mem::take(self.components.get_mut())
            .into_iter()
            .map(|(class, buffer)| {
                let buffer = buffer.into_inner();
                let drained = DrainedComponents {
                    staging: buffer.staging,
                    removes: buffer.removes.into_vec(),
                };
                (class, drained)
            })
            .collect();
        components.sort_unstable_by_key(|(class, _)| *class);
        Drained {
            entities: DrainedEntities {
                adds: entities.adds.into_vec(),
                removes: entities.removes.into_vec(),
                cancelled: entities.cancelled,
            },
            components,
        }
    }
}

/// Handle for recording structural changes from any thread holding `&World`.
///
/// Obtained from [`World::deferred`], which asserts that pending operations
/// are enabled. Every change is applied at the next
/// [`World::perform_pending`].
///
/// # Example
///
/// ```rust,ignore
/// world.set_pending_operations(true);
/// std::thread::scope(|scope| {
///     let deferred = world.deferred();
///     scope.spawn(move || deferred.add_component(player, Health(10)));
///     scope.spawn(move || deferred.remove_component::<Shield>(player));
/// });
/// world.perform_pending();
/// ```
#[derive(Clone, Copy)]
pub struct Deferred<'w> {
    world: &'w World,
}

impl<'w> Deferred<'w> {
    pub(crate) const fn new(world: &'w World) -> Self {
        Self { world }
    }

    /// Reserves a fresh id. The entity becomes live at the next drain.
    #[must_use]
    pub fn add_entity(self) -> EntityId {
        self.add_entity_with_hint(EntityId::NULL)
    }

    /// Reserves `hint` if it is free, otherwise a fresh id.
    #[must_use]
    pub fn add_entity_with_hint(self, hint: EntityId) -> EntityId {
        let id = self.world.allocate_id(Some(hint));
        let queued = self.world.pending().entities.lock().adds.push(id);
        debug_assert!(queued, "entity {id} reserved twice");
        id
    }

    /// Schedules the removal of an entity and all its components.
    ///
    /// Removing an entity whose add is still pending cancels the add. Returns
    /// `false` if the entity is neither live nor pending, or its removal is
    /// already scheduled.
    pub fn remove_entity(self, id: EntityId) -> bool {
        let live = self.world.has_entity(id);
        let mut entities = self.world.pending().entities.lock();
        if entities.adds.remove(id) {
            entities.cancelled.push(id);
            return true;
        }
        live && entities.removes.push(id)
    }

    /// Stages a component. It is constructed in the live storage at the
    /// next drain.
    ///
    /// # Panics
    ///
    /// Panics if the entity is neither live nor pending, or already has (or
    /// is already getting) a `C` component.
    pub fn add_component<C: Component>(self, id: EntityId, value: C) {
        self.stage(id, TypeDescriptor::of::<C>(), move |column| {
            typed_mut::<C>(column).push(value);
        });
    }

    /// Stages a component by class id, copied from `src` or defaulted.
    ///
    /// # Panics
    ///
    /// Same as [`Self::add_component`], plus if `class` has no descriptor.
    pub fn add_component_raw(self, id: EntityId, class: ClassId, src: Option<&dyn Any>) {
        let descriptor = self.world.descriptor_of(class);
        self.stage(id, descriptor, |column| match src {
            Some(src) => column.push_copy(src),
            None => column.push_default(),
        });
    }

    fn stage(self, id: EntityId, descriptor: TypeDescriptor, construct: impl FnOnce(&mut dyn Column)) {
        let class = descriptor.class_id();
        let pending = self.world.pending();
        assert!(
            self.world.has_entity(id) || pending.is_entity_added(id),
            "cannot add {} to entity {id}: entity is not live",
            descriptor.name()
        );

        let live = self.world.has_component_raw(id, class);
        pending.with_buffer(descriptor, |buffer| {
            let kept = live && !buffer.removes.contains(id);
            assert!(
                !kept && !buffer.staging.contains(id),
                "entity {id} already has a {} component",
                descriptor.name()
            );
            buffer.staging.insert(id, construct);
        });
    }

    /// Schedules the removal of a component.
    ///
    /// Removing a component that is only staged cancels the staged add.
    /// Returns `false` if there is nothing to remove.
    pub fn remove_component<C: Component>(self, id: EntityId) -> bool {
        self.remove_component_raw(id, C::CLASS_ID)
    }

    /// Schedules the removal of a component by class id.
    pub fn remove_component_raw(self, id: EntityId, class: ClassId) -> bool {
        let pending = self.world.pending();
        let cancelled = pending.with_existing_buffer(class, |buffer| buffer.staging.remove(id, 0));
        if cancelled == Some(true) {
            return true;
        }

        let Some(storage) = self
            .world
            .get_component_storage(class)
            .filter(|storage| storage.contains(id))
        else {
            return false;
        };

        pending.with_buffer(*storage.descriptor(), |buffer| buffer.removes.push(id))
    }

    /// Runs `f` on the staged payload of a pending add.
    ///
    /// The payload lives in the staging storage, never in the live one, and
    /// stays there until the next drain. Returns `None` if nothing is staged.
    pub fn with_pending_component<C: Component, R>(self, id: EntityId, f: impl FnOnce(&mut C) -> R) -> Option<R> {
        self.world
            .pending()
            .with_existing_buffer(C::CLASS_ID, |buffer| buffer.staging.get_by_id_mut::<C>(id).map(f))
            .flatten()
    }

    /// Untyped variant of [`Self::with_pending_component`].
    pub fn with_pending_component_raw<R>(
        self,
        id: EntityId,
        class: ClassId,
        f: impl FnOnce(&mut dyn Any) -> R,
    ) -> Option<R> {
        self.world
            .pending()
            .with_existing_buffer(class, |buffer| buffer.staging.get_raw_mut(id).map(f))
            .flatten()
    }

    /// Checks if a component add is staged for `id`.
    #[must_use]
    pub fn is_component_pending(self, id: EntityId, class: ClassId) -> bool {
        self.world
            .pending()
            .with_existing_buffer(class, |buffer| buffer.staging.contains(id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use crate::ecs::{ClassId, Component, World, WorldEvent};
    use crate::WorldConfig;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Health(u32);

    impl Component for Health {
        const CLASS_ID: ClassId = ClassId::new(1);
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Shield(u32);

    impl Component for Shield {
        const CLASS_ID: ClassId = ClassId::new(2);
    }

    fn pending_world() -> World {
        World::with_config(WorldConfig::deferred())
    }

    #[test]
    fn test_nothing_applies_before_drain() {
        let mut world = pending_world();
        let entity = world.add_entity();
        assert!(!world.has_entity(entity));

        world.add_component(entity, Health(3));
        assert!(world.deferred().is_component_pending(entity, Health::CLASS_ID));

        world.perform_pending();
        assert!(world.has_entity(entity));
        assert_eq!(world.get_component::<Health>(entity), Some(&Health(3)));
    }

    #[test]
    fn test_staged_payload_is_editable() {
        let mut world = pending_world();
        let entity = world.add_entity();
        world.add_component(entity, Health(1));

        let seen = world
            .deferred()
            .with_pending_component::<Health, _>(entity, |health| {
                health.0 += 1;
                health.0
            });
        assert_eq!(seen, Some(2));
        assert_eq!(world.get_component::<Health>(entity), None);

        world.perform_pending();
        assert_eq!(world.get_component::<Health>(entity), Some(&Health(2)));
    }

    #[test]
    fn test_remove_cancels_staged_add() {
        let mut world = pending_world();
        let entity = world.add_entity();
        world.perform_pending();

        world.add_component(entity, Health(1));
        assert!(world.remove_component::<Health>(entity));
        assert!(!world.remove_component::<Health>(entity));

        world.perform_pending();
        assert!(!world.has_component::<Health>(entity));
    }

    #[test]
    fn test_cancelled_entity_id_released_at_drain() {
        let mut world = pending_world();
        let entity = world.add_entity();
        world.add_component(entity, Shield(1));
        assert!(world.remove_entity(entity));

        // Not reusable within the same frame.
        let other = world.add_entity();
        assert_ne!(other, entity);

        world.perform_pending();
        assert!(!world.has_entity(entity));
        assert!(world.get_component_storage(Shield::CLASS_ID).is_none());
        assert_eq!(world.add_entity(), entity);
    }

    #[test]
    fn test_drain_order() {
        let mut world = World::new();
        let entity = world.add_entity();
        world.add_component(entity, Shield(5));
        world.set_pending_operations(true);

        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        world.add_listener(move |world, event| {
            let observed = match *event {
                WorldEvent::ComponentRemoved { entity, .. } => {
                    format!("-shield:{:?}", world.get_component::<Shield>(entity))
                }
                WorldEvent::ComponentAdded { entity, .. } => {
                    format!("+health:{:?}", world.get_component::<Health>(entity))
                }
                WorldEvent::EntityAdded(_) => "+entity".to_owned(),
                WorldEvent::EntityRemoved(_) => "-entity".to_owned(),
            };
            sink.lock().push(observed);
        });

        world.add_component(entity, Health(10));
        world.remove_component::<Shield>(entity);
        assert!(log.lock().is_empty());

        world.perform_pending();
        assert_eq!(
            *log.lock(),
            vec![
                "-shield:Some(Shield(5))".to_owned(),
                "+health:Some(Health(10))".to_owned(),
            ]
        );

        // Empty drain is a no-op.
        world.perform_pending();
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_component_on_removed_entity_is_discarded() {
        let mut world = pending_world();
        let entity = world.add_entity();
        world.perform_pending();

        world.add_component(entity, Health(1));
        world.remove_entity(entity);
        world.perform_pending();

        assert!(!world.has_entity(entity));
        assert!(world.get_component_storage(Health::CLASS_ID).is_none());
    }

    #[test]
    fn test_id_queue_order_and_membership() {
        let mut queue = super::IdQueue::default();
        let ids: Vec<_> = [4, 1, 9, 2].map(crate::EntityId::new).to_vec();
        for &id in &ids {
            assert!(queue.push(id));
        }
        assert!(!queue.push(ids[1]));
        assert!(queue.contains(ids[2]));

        assert!(queue.remove(ids[2]));
        assert!(!queue.remove(ids[2]));
        assert!(!queue.contains(ids[2]));
        assert_eq!(queue.into_vec(), vec![ids[0], ids[1], ids[3]]);
    }

    #[test]
    fn test_entity_removal_is_scheduled_once() {
        let mut world = pending_world();
        let entity = world.add_entity();
        world.perform_pending();

        assert!(world.remove_entity(entity));
        assert!(!world.remove_entity(entity));
        assert!(world.has_entity(entity));

        world.perform_pending();
        assert!(!world.has_entity(entity));
        assert!(!world.remove_entity(entity));
    }

    #[test]
    fn test_many_entities_staged_in_one_frame() {
        let mut world = pending_world();
        let deferred = world.deferred();
        let ids: Vec<_> = (0..20_000)
            .map(|i| {
                let id = deferred.add_entity();
                deferred.add_component(id, Health(i));
                deferred.add_component(id, Shield(i));
                id
            })
            .collect();
        // Cancelling a handful in the middle keeps the rest in order.
        for &id in ids.iter().skip(5).step_by(1000) {
            assert!(deferred.remove_entity(id));
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&order);
        world.add_listener(move |_, event| {
            if let WorldEvent::EntityAdded(id) = *event {
                sink.lock().push(id);
            }
        });
        world.perform_pending();

        let expected: Vec<_> = ids
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 1000 != 5)
            .map(|(_, &id)| id)
            .collect();
        assert_eq!(*order.lock(), expected);
        assert_eq!(world.storage::<Shield>().unwrap().len(), expected.len());
    }

    #[test]
    #[should_panic(expected = "already has")]
    fn test_double_stage_panics() {
        let world = pending_world();
        let deferred = world.deferred();
        let entity = deferred.add_entity();
        deferred.add_component(entity, Health(1));
        deferred.add_component(entity, Health(2));
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn test_stage_on_unknown_entity_panics() {
        let world = pending_world();
        world.deferred().add_component(crate::EntityId::new(7), Health(1));
    }
}
