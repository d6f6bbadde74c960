//! # Tessera Core
//!
//! Runtime data store of an entity-component engine:
//! - Sparse-set component storages with O(1) lookup and swap-removal
//! - Groups: multi-component joins kept in matching order across storages
//! - Pending operations: structural changes from worker threads applied at
//!   one synchronization point
//!
//! ## Architecture Rules
//!
//! 1. **Dense iteration** - Payloads of a class live in one contiguous array
//! 2. **No unsafe code** - Type erasure goes through `dyn Column` + `Vec<C>`
//! 3. **One drain point** - Deferred changes only land in `perform_pending`
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_core::{Component, ClassId, World};
//!
//! #[derive(Clone, Default)]
//! struct Health(u32);
//!
//! impl Component for Health {
//!     const CLASS_ID: ClassId = ClassId::new(1);
//! }
//!
//! let mut world = World::new();
//! let player = world.add_entity();
//! world.add_component(player, Health(100));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod memory;
pub mod sync;

pub use config::{ConfigError, WorldConfig};
pub use ecs::{
    ClassId, Component, ComponentSet, ComponentStorage, EntityAllocator, EntityId,
    EntitySignature, Group, GroupRelation, ListenerId, SignatureSlot, TypeDescriptor,
    TypeRegistry, World, WorldEvent,
};
pub use memory::SparsePages;
pub use sync::{Deferred, StorageLock, StorageLockGuard};
