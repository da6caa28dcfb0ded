//! Repository contract consumed by reconciliation

use crate::error::StoreError;
use crate::locks::MatrixLock;
use ppod_model::{EntityId, MatrixGraph, VersionStamp};

/// Persistence collaborator for matrix graphs
///
/// # Invariants
/// - `store_matrix` replaces the whole graph atomically: readers see either
///   the previous graph or the new one.
/// - `next_identity` never returns the same identity twice.
pub trait MatrixRepository: Send + Sync {
    /// Load a copy of the stored graph
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if no matrix has this identity.
    fn load_matrix(&self, id: EntityId) -> Result<MatrixGraph, StoreError>;

    /// Replace the stored graph
    ///
    /// `base` is the matrix stamp the graph was derived from (`None` for a
    /// new matrix). The write is rejected if the stored stamp differs.
    ///
    /// # Errors
    /// - [`StoreError::NotPersisted`] if the matrix has no identity.
    /// - [`StoreError::Conflict`] if the stored stamp is not `base`.
    fn store_matrix(
        &self,
        graph: MatrixGraph,
        base: Option<VersionStamp>,
    ) -> Result<EntityId, StoreError>;

    /// Fresh surrogate identity
    fn next_identity(&self) -> EntityId;

    /// Write lock for a matrix identity
    fn lock_matrix(&self, id: EntityId) -> MatrixLock;

    /// Highest stamp held by any stored entity, for seeding an allocator
    fn highest_stamp(&self) -> Option<VersionStamp>;
}
