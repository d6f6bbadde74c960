//! # World Events
//!
//! Structural changes are reported to listeners registered on the world.
//!
//! Remove events fire while the entity or component is still readable.
//! Add events fire once construction is complete. With pending operations
//! enabled both kinds are buffered and fire during
//! [`World::perform_pending`].

use super::component::ClassId;
use super::entity::EntityId;
use super::world::World;

/// A structural change observed by listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorldEvent {
    /// An entity became live.
    EntityAdded(EntityId),
    /// An entity is about to be destroyed.
    EntityRemoved(EntityId),
    /// A component was constructed.
    ComponentAdded {
        /// Owning entity.
        entity: EntityId,
        /// Class of the component.
        class: ClassId,
    },
    /// A component is about to be destroyed.
    ComponentRemoved {
        /// Owning entity.
        entity: EntityId,
        /// Class of the component.
        class: ClassId,
    },
}

impl WorldEvent {
    /// Entity the event is about.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match *self {
            Self::EntityAdded(entity)
            | Self::EntityRemoved(entity)
            | Self::ComponentAdded { entity, .. }
            | Self::ComponentRemoved { entity, .. } => entity,
        }
    }
}

/// Handle returned by [`World::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&World, &WorldEvent) + Send + Sync>;

/// Registered listeners, in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn dispatch(&self, world: &World, event: &WorldEvent) {
        for (_, listener) in &self.entries {
            listener(world, event);
        }
    }
}
