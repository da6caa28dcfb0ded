//! Error types for the matrix model
//!
//! Every validation failure carries the [`EntityPath`] of the offending
//! entity. Errors raised by a single entity (e.g. a cell) start with an empty
//! path; the graph fills it in with [`ModelError::at`] before returning.

use crate::cell::CellType;
use crate::path::EntityPath;

/// Model-level error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Cell type does not fit its state set or a state is foreign to the column's character
    #[error("invalid cell state at {path}: {reason}")]
    InvalidCellState {
        path: EntityPath,
        cell_type: CellType,
        reason: String,
    },

    /// States set on a cell that has no row position
    #[error("cell at {path} is not attached to a row")]
    CellNotAttached { path: EntityPath },

    /// OTU removal would leave a row without its OTU
    #[error("cannot remove OTU '{otu}': the matrix still has a row for it ({path})")]
    DanglingRow { path: EntityPath, otu: String },

    /// Graph shape or identity does not line up
    #[error("structural mismatch at {path}: {reason}")]
    StructuralMismatch { path: EntityPath, reason: String },

    /// OTU label or pPod id already present in the set
    #[error("duplicate OTU at {path}: {label}")]
    DuplicateOtu { path: EntityPath, label: String },

    /// Character appears twice in the column list
    #[error("duplicate character at {path}: {label}")]
    DuplicateCharacter { path: EntityPath, label: String },

    /// Local key not present in the graph
    #[error("unknown key: {key}")]
    UnknownKey { key: String },
}

impl ModelError {
    /// Structural mismatch at `path`
    #[inline]
    pub fn structural(path: EntityPath, reason: impl Into<String>) -> Self {
        Self::StructuralMismatch {
            path,
            reason: reason.into(),
        }
    }

    /// Invalid cell state with an empty path
    #[inline]
    pub fn invalid_cell_state(cell_type: CellType, reason: impl Into<String>) -> Self {
        Self::InvalidCellState {
            path: EntityPath::root(),
            cell_type,
            reason: reason.into(),
        }
    }

    /// Unknown local key
    #[inline]
    pub fn unknown_key(key: impl std::fmt::Display) -> Self {
        Self::UnknownKey {
            key: key.to_string(),
        }
    }

    /// Replace the entity path carried by this error
    #[must_use]
    pub fn at(mut self, new_path: EntityPath) -> Self {
        match &mut self {
            Self::InvalidCellState { path, .. }
            | Self::CellNotAttached { path }
            | Self::DanglingRow { path, .. }
            | Self::StructuralMismatch { path, .. }
            | Self::DuplicateOtu { path, .. }
            | Self::DuplicateCharacter { path, .. } => *path = new_path,
            Self::UnknownKey { .. } => {}
        }
        self
    }

    /// Entity path of the failure, if the error carries one
    #[must_use]
    pub fn path(&self) -> Option<&EntityPath> {
        match self {
            Self::InvalidCellState { path, .. }
            | Self::CellNotAttached { path }
            | Self::DanglingRow { path, .. }
            | Self::StructuralMismatch { path, .. }
            | Self::DuplicateOtu { path, .. }
            | Self::DuplicateCharacter { path, .. } => Some(path),
            Self::UnknownKey { .. } => None,
        }
    }

    /// Whether the error rejects client input (as opposed to misuse of keys)
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::UnknownKey { .. })
    }
}
