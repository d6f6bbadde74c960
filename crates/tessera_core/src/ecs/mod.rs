//! # Entity Component System
//!
//! Sparse-set component storage with groups and deferred mutation.
//!
//! ## Design Philosophy
//!
//! - One dense storage per component class, addressed through a paged
//!   sparse table
//! - Storages are type-erased behind a per-class [`TypeDescriptor`], never
//!   generic over the component type
//! - Groups keep multi-component joins at the front of every member storage
//! - Structural changes from worker threads go through pending buffers

mod allocator;
mod column;
mod component;
mod entity;
mod event;
mod group;
mod storage;
mod world;

pub use allocator::{EntityAllocator, MAX_HINT_GAP};
pub use column::{typed, typed_mut, Column, TypedColumn};
pub use component::{ClassId, Component, ComponentSet, TypeDescriptor, TypeRegistry};
pub use entity::{EntityId, EntitySignature, SignatureSlot};
pub use event::{ListenerId, WorldEvent};
pub use group::{Group, GroupRelation};
pub use storage::ComponentStorage;
pub use world::World;
