//! Store errors

use ppod_model::{EntityId, VersionStamp};

/// Persistence failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No matrix with this identity
    #[error("matrix {0} not found")]
    NotFound(EntityId),

    /// Graph to store has no matrix identity yet
    #[error("matrix has not been assigned an identity")]
    NotPersisted,

    /// Stored version moved since the graph was loaded
    #[error("matrix {id} changed concurrently: expected {expected:?}, found {found:?}")]
    Conflict {
        id: EntityId,
        expected: Option<VersionStamp>,
        found: Option<VersionStamp>,
    },
}

impl StoreError {
    /// Whether the matrix was missing
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
