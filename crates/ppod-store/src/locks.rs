//! Per-matrix write locks
//!
//! One writer per matrix identity; writers of different matrices never
//! contend. Locks are created on first use and shared through `Arc`.

use dashmap::DashMap;
use parking_lot::Mutex;
use ppod_model::EntityId;
use std::sync::Arc;

/// Shared handle to one matrix's write lock
pub type MatrixLock = Arc<Mutex<()>>;

/// Lock table keyed by matrix identity
#[derive(Debug, Default)]
pub struct MatrixLocks {
    locks: DashMap<EntityId, MatrixLock>,
}

impl MatrixLocks {
    /// Empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Lock handle for `id`, created if absent
    ///
    /// The same `Arc` is returned for every call with the same `id`.
    #[must_use]
    pub fn lock_for(&self, id: EntityId) -> MatrixLock {
        Arc::clone(self.locks.entry(id).or_default().value())
    }

    /// Drop the handle for `id` (e.g. after the matrix is deleted)
    pub fn forget(&self, id: EntityId) {
        self.locks.remove(&id);
    }

    /// Number of matrices with a lock handle
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no handle exists
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
