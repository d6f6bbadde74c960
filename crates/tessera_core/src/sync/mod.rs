//! # Synchronization
//!
//! Two tools for worlds shared between threads:
//!
//! - **Pending operations**: structural changes requested through `&World`
//!   are buffered and applied at one drain point
//!   ([`World::perform_pending`](crate::World::perform_pending)).
//! - **Storage locks**: a cooperative, re-entrant lock per storage for code
//!   that holds component references across several sub-steps.
//!
//! ```text
//! Frame N:
//!   systems (parallel)   read storages, queue changes via Deferred
//!   barrier              perform_pending applies the queue
//! ```

mod lock;
mod pending;

pub use lock::{StorageLock, StorageLockGuard};
pub use pending::Deferred;
pub(crate) use pending::PendingOperations;
