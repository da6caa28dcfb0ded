//! Character-state rows

use crate::id::{CellKey, OtuKey};
use crate::versioned::Versioned;
use serde::{Deserialize, Serialize};

/// The cells of one OTU across all matrix columns
///
/// # Invariants
/// - `cells.len()` equals the matrix column count.
/// - Cell `i` is attached at `(this row, i)`.
///
/// Both are maintained by [`MatrixGraph`](crate::MatrixGraph); a row on its
/// own only stores keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStateRow {
    meta: Versioned,
    otu: OtuKey,
    cells: Vec<CellKey>,
}

impl CharacterStateRow {
    pub(crate) fn new(otu: OtuKey, cells: Vec<CellKey>) -> Self {
        Self {
            meta: Versioned::new(),
            otu,
            cells,
        }
    }

    /// Versioning metadata
    #[inline]
    #[must_use]
    pub const fn meta(&self) -> &Versioned {
        &self.meta
    }

    /// Mutable versioning metadata
    #[inline]
    pub fn meta_mut(&mut self) -> &mut Versioned {
        &mut self.meta
    }

    /// The OTU this row describes
    #[inline]
    #[must_use]
    pub const fn otu(&self) -> OtuKey {
        self.otu
    }

    /// Cell keys in column order
    #[inline]
    #[must_use]
    pub fn cells(&self) -> &[CellKey] {
        &self.cells
    }

    /// Cell key at `column`
    #[inline]
    #[must_use]
    pub fn cell(&self, column: usize) -> Option<CellKey> {
        self.cells.get(column).copied()
    }

    pub(crate) fn set_cells(&mut self, cells: Vec<CellKey>) {
        self.cells = cells;
    }

    pub(crate) fn push_cell(&mut self, cell: CellKey) {
        self.cells.push(cell);
    }
}
