//! # Cooperative Storage Lock
//!
//! A small re-entrant mutex with an explicit owner and depth.
//!
//! ## Contract
//!
//! The lock is **advisory**. It only serializes callers that also take it:
//! a long-running system holding component references across several
//! sub-steps takes it, and any other cooperating system that wants the same
//! storage waits. Code that never calls [`StorageLock::lock`] is not
//! blocked by it. It does not make concurrent structural mutation of a
//! storage safe; that is what pending operations are for.

use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: u32,
}

/// Re-entrant, per-thread, cooperative lock.
///
/// # Example
///
/// ```rust,ignore
/// let storage = world.get_component_storage(Health::CLASS_ID).unwrap();
/// storage.lock();
/// storage.lock(); // re-entrant on the same thread
/// // ... several sub-steps reading raw slices ...
/// storage.unlock();
/// storage.unlock();
/// ```
#[derive(Debug, Default)]
pub struct StorageLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl StorageLock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock, blocking while another thread owns it.
    ///
    /// Taking it again from the owning thread only increases the depth.
    pub fn lock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => self.released.wait(&mut state),
            }
        }
    }

    /// Takes the lock if it is free or already owned by this thread.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(me);
                state.depth = 1;
                true
            }
            Some(owner) if owner == me => {
                state.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Releases one level of the lock.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not own the lock.
    pub fn unlock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        assert!(
            state.owner == Some(me),
            "storage unlocked by a thread that does not own it"
        );

        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
    }

    /// Takes the lock and returns a guard that releases it on drop.
    #[must_use]
    pub fn guard(&self) -> StorageLockGuard<'_> {
        self.lock();
        StorageLockGuard { lock: self }
    }

    /// Returns `true` if some thread owns the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Returns `true` if the calling thread owns the lock.
    #[must_use]
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Re-entrancy depth of the current owner (0 when unlocked).
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.state.lock().depth
    }
}

/// Releases one level of a [`StorageLock`] when dropped.
#[derive(Debug)]
pub struct StorageLockGuard<'a> {
    lock: &'a StorageLock,
}

impl Drop for StorageLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
