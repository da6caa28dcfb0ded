//! Reconciliation errors

use ppod_model::{EntityPath, ModelError};
use ppod_store::StoreError;

/// Why a reconciliation was rejected
///
/// Whatever the variant, the stored graph is untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// Incoming graph violates a model invariant
    #[error("invalid matrix: {0}")]
    Model(#[from] ModelError),

    /// Load or commit failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Cancel flag observed before commit
    #[error("reconciliation cancelled")]
    Cancelled,

    /// Configuration could not be read
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Whether the incoming graph was rejected by validation
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Model(e) if e.is_validation())
    }

    /// Whether the target matrix does not exist
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }

    /// Entity path of a validation failure
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&EntityPath> {
        match self {
            Self::Model(e) => e.path(),
            _ => None,
        }
    }
}
