//! The matrix aggregate
//!
//! [`MatrixGraph`] owns one matrix together with its OTU set, characters,
//! rows and cells. Entities live in arenas keyed by typed local keys;
//! children point at parents by key (cell → row + column, row → OTU), so the
//! graph has no reference cycles and clones cheaply into a working copy.
//!
//! # Core Concepts
//!
//! - Structural operations keep rows and columns aligned in the same call:
//!   adding a column extends every row, reordering moves cells with their
//!   character, dropping a column drops its cells.
//! - Cell edits go through [`MatrixGraph::set_cell`], which validates the
//!   pairing against the column's character and flags the row and column as
//!   changed. Versions are never bumped here; reconciliation does that.
//! - [`MatrixGraph::check_invariants`] reports the first violation with the
//!   [`EntityPath`] of the offending entity.
//!
//! # Example
//!
//! ```rust,ignore
//! use ppod_model::{CellType, Character, MatrixGraph};
//!
//! let mut graph = MatrixGraph::new("primates");
//! let pan = graph.add_otu("Pan")?;
//! graph.add_character(Character::new("tail").with_state(0, "absent").with_state(1, "present"))?;
//! graph.put_row(pan)?;
//! graph.set_cell(pan, 0, CellType::Single, [0])?;
//! graph.check_invariants()?;
//! ```

use crate::cell::{CellType, CellValue, CharacterStateCell};
use crate::character::{Character, StateNumber};
use crate::error::ModelError;
use crate::fingerprint::Fingerprint;
use crate::id::{CellKey, CharacterKey, EntityId, OtuKey, PPodId, RowKey};
use crate::matrix::{CharacterStateMatrix, Column};
use crate::otu::{Otu, OtuSet};
use crate::path::EntityPath;
use crate::row::CharacterStateRow;
use crate::version::VersionStamp;
use crate::versioned::Versioned;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};

/// Kind of a persistent entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// The matrix header
    Matrix,
    /// The OTU set
    OtuSet,
    /// An OTU
    Otu,
    /// A character (column definition)
    Character,
    /// A row
    Row,
    /// A cell
    Cell,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Matrix => "matrix",
            Self::OtuSet => "otu_set",
            Self::Otu => "otu",
            Self::Character => "character",
            Self::Row => "row",
            Self::Cell => "cell",
        })
    }
}

/// A flat view of one entity, used for diffs and reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityEntry {
    /// Entity kind
    pub kind: EntityKind,
    /// Location in the graph
    pub path: EntityPath,
    /// Surrogate identity, if saved
    pub id: Option<EntityId>,
    /// Version stamp, if saved
    pub stamp: Option<VersionStamp>,
}

/// One matrix and everything it owns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixGraph {
    matrix: CharacterStateMatrix,
    otu_set: OtuSet,
    characters: IndexMap<CharacterKey, Character>,
    rows: IndexMap<RowKey, CharacterStateRow>,
    cells: IndexMap<CellKey, CharacterStateCell>,
    next_key: u32,
}

impl MatrixGraph {
    /// Empty graph; the matrix and its OTU set share `label`
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            otu_set: OtuSet::new(label.clone()),
            matrix: CharacterStateMatrix::new(label),
            ..Self::default()
        }
    }

    fn alloc(&mut self) -> u32 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Matrix header
    #[inline]
    #[must_use]
    pub const fn matrix(&self) -> &CharacterStateMatrix {
        &self.matrix
    }

    /// Mutable matrix header
    #[inline]
    pub fn matrix_mut(&mut self) -> &mut CharacterStateMatrix {
        &mut self.matrix
    }

    /// OTU set
    #[inline]
    #[must_use]
    pub const fn otu_set(&self) -> &OtuSet {
        &self.otu_set
    }

    /// Mutable OTU set
    #[inline]
    pub fn otu_set_mut(&mut self) -> &mut OtuSet {
        &mut self.otu_set
    }

    /// Look up a character
    #[inline]
    #[must_use]
    pub fn character(&self, key: CharacterKey) -> Option<&Character> {
        self.characters.get(&key)
    }

    /// Look up a character mutably
    #[inline]
    pub fn character_mut(&mut self, key: CharacterKey) -> Option<&mut Character> {
        self.characters.get_mut(&key)
    }

    /// Characters in column order
    pub fn columns(&self) -> impl Iterator<Item = (CharacterKey, &Character)> {
        self.matrix
            .characters()
            .filter_map(move |k| self.characters.get(&k).map(|c| (k, c)))
    }

    /// Number of columns
    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.matrix.column_count()
    }

    /// Look up a row
    #[inline]
    #[must_use]
    pub fn row(&self, key: RowKey) -> Option<&CharacterStateRow> {
        self.rows.get(&key)
    }

    /// Look up a row mutably
    #[inline]
    pub fn row_mut(&mut self, key: RowKey) -> Option<&mut CharacterStateRow> {
        self.rows.get_mut(&key)
    }

    /// Row of `otu`
    #[inline]
    #[must_use]
    pub fn row_for(&self, otu: OtuKey) -> Option<&CharacterStateRow> {
        self.matrix.row_for(otu).and_then(|k| self.rows.get(&k))
    }

    /// Rows in OTU-set order, as `(otu, row)` pairs
    #[must_use]
    pub fn rows_in_otu_order(&self) -> Vec<(OtuKey, RowKey)> {
        self.otu_set
            .keys()
            .filter_map(|otu| self.matrix.row_for(otu).map(|row| (otu, row)))
            .collect()
    }

    /// Look up a cell
    #[inline]
    #[must_use]
    pub fn cell(&self, key: CellKey) -> Option<&CharacterStateCell> {
        self.cells.get(&key)
    }

    /// Look up a cell mutably
    #[inline]
    pub fn cell_mut(&mut self, key: CellKey) -> Option<&mut CharacterStateCell> {
        self.cells.get_mut(&key)
    }

    /// Cell of `otu` at `column`
    #[must_use]
    pub fn cell_at(&self, otu: OtuKey, column: usize) -> Option<&CharacterStateCell> {
        self.row_for(otu)
            .and_then(|row| row.cell(column))
            .and_then(|k| self.cells.get(&k))
    }

    /// Number of cells in the arena
    #[inline]
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    fn otu_label(&self, otu: OtuKey) -> String {
        self.otu_set
            .get(otu)
            .map_or_else(|| otu.to_string(), |o| o.label().to_string())
    }

    /// Path of an OTU
    #[must_use]
    pub fn otu_path(&self, otu: OtuKey) -> EntityPath {
        EntityPath::otu(&self.otu_label(otu))
    }

    /// Path of the row of `otu`
    #[must_use]
    pub fn row_path(&self, otu: OtuKey) -> EntityPath {
        EntityPath::row(&self.otu_label(otu))
    }

    /// Path of the cell of `otu` at `column`
    #[must_use]
    pub fn cell_path(&self, otu: OtuKey, column: usize) -> EntityPath {
        EntityPath::cell(&self.otu_label(otu), column)
    }

    /// Path of a character
    #[must_use]
    pub fn character_path(&self, key: CharacterKey) -> EntityPath {
        self.characters.get(&key).map_or_else(
            || EntityPath::character(&key.to_string()),
            |c| EntityPath::character(c.label()),
        )
    }

    // ------------------------------------------------------------------
    // OTU operations
    // ------------------------------------------------------------------

    /// Add an OTU with a fresh label
    ///
    /// # Errors
    /// [`ModelError::DuplicateOtu`] if the label is taken.
    pub fn add_otu(&mut self, label: impl Into<String>) -> Result<OtuKey, ModelError> {
        self.insert_otu(Otu::new(label))
    }

    /// Add an OTU carrying a known pPod id
    ///
    /// # Errors
    /// [`ModelError::DuplicateOtu`] if the label or pPod id is taken.
    pub fn add_otu_with_ppod_id(
        &mut self,
        label: impl Into<String>,
        ppod_id: PPodId,
    ) -> Result<OtuKey, ModelError> {
        self.insert_otu(Otu::new(label).with_ppod_id(ppod_id))
    }

    /// Add a fully built OTU, keeping its metadata
    ///
    /// # Errors
    /// [`ModelError::DuplicateOtu`] if the label or pPod id is taken.
    pub fn insert_otu(&mut self, otu: Otu) -> Result<OtuKey, ModelError> {
        let key = OtuKey::new(self.alloc());
        self.otu_set.insert(key, otu)?;
        Ok(key)
    }

    /// Relabel an OTU, keeping labels unique
    ///
    /// # Errors
    /// [`ModelError::UnknownKey`] or [`ModelError::DuplicateOtu`].
    pub fn set_otu_label(
        &mut self,
        otu: OtuKey,
        label: impl Into<String>,
    ) -> Result<bool, ModelError> {
        let label = label.into();
        if let Some(other) = self.otu_set.find_by_label(&label) {
            if other != otu {
                return Err(ModelError::DuplicateOtu {
                    path: EntityPath::otu(&label),
                    label,
                });
            }
        }
        let entry = self
            .otu_set
            .get_mut(otu)
            .ok_or_else(|| ModelError::unknown_key(otu))?;
        Ok(entry.set_label(label))
    }

    /// Remove an OTU that has no row
    ///
    /// # Errors
    /// - [`ModelError::UnknownKey`] if `otu` is not a member.
    /// - [`ModelError::DanglingRow`] if the matrix still has a row for it.
    pub fn remove_otu(&mut self, otu: OtuKey) -> Result<Otu, ModelError> {
        if !self.otu_set.contains(otu) {
            return Err(ModelError::unknown_key(otu));
        }
        if self.matrix.row_for(otu).is_some() {
            return Err(ModelError::DanglingRow {
                path: self.row_path(otu),
                otu: self.otu_label(otu),
            });
        }
        self.otu_set
            .remove(otu)
            .ok_or_else(|| ModelError::unknown_key(otu))
    }

    /// Remove an OTU together with its row and cells
    ///
    /// # Errors
    /// [`ModelError::UnknownKey`] if `otu` is not a member.
    pub fn remove_otu_and_row(&mut self, otu: OtuKey) -> Result<Otu, ModelError> {
        if !self.otu_set.contains(otu) {
            return Err(ModelError::unknown_key(otu));
        }
        if self.matrix.row_for(otu).is_some() {
            self.remove_row(otu)?;
            tracing::debug!("dropped row of {}", self.otu_label(otu));
        }
        self.remove_otu(otu)
    }

    /// Reorder the OTU set
    ///
    /// # Errors
    /// [`ModelError::StructuralMismatch`] unless `order` is a permutation of
    /// the current members.
    pub fn set_otu_order(&mut self, order: &[OtuKey]) -> Result<(), ModelError> {
        self.otu_set.reorder(order)
    }

    // ------------------------------------------------------------------
    // Column operations
    // ------------------------------------------------------------------

    fn new_unassigned_cell(
        &mut self,
        row: RowKey,
        column: usize,
        character: CharacterKey,
    ) -> Result<CellKey, ModelError> {
        let key = CellKey::new(self.alloc());
        let owner = self
            .characters
            .get(&character)
            .ok_or_else(|| ModelError::unknown_key(character))?;
        let mut cell = CharacterStateCell::new();
        cell.attach_to_row(row, column);
        cell.set_unassigned(owner)?;
        self.cells.insert(key, cell);
        Ok(key)
    }

    /// Append a character as the last column
    ///
    /// Every existing row gets a new `UNASSIGNED` cell.
    ///
    /// # Errors
    /// [`ModelError::DuplicateCharacter`] if a character with the same pPod id
    /// is already present.
    pub fn add_character(&mut self, character: Character) -> Result<CharacterKey, ModelError> {
        if let Some(ppod_id) = character.ppod_id() {
            if self.characters.values().any(|c| c.ppod_id() == Some(ppod_id)) {
                return Err(ModelError::DuplicateCharacter {
                    path: EntityPath::character(character.label()),
                    label: character.label().to_string(),
                });
            }
        }
        let key = CharacterKey::new(self.alloc());
        self.characters.insert(key, character);
        let column = self.matrix.column_count();
        self.matrix.push_column(key);

        let row_keys: Vec<RowKey> = self.rows.keys().copied().collect();
        for row_key in row_keys {
            let cell = self.new_unassigned_cell(row_key, column, key)?;
            if let Some(row) = self.rows.get_mut(&row_key) {
                row.push_cell(cell);
            }
        }
        Ok(key)
    }

    /// Replace the column list
    ///
    /// Rows are resized in the same operation: cells follow their character
    /// to its new index, new columns get `UNASSIGNED` cells, and cells of
    /// dropped columns are removed along with the dropped characters.
    /// Column versions travel with their character.
    ///
    /// # Errors
    /// - [`ModelError::UnknownKey`] if a key is not a character of this graph.
    /// - [`ModelError::DuplicateCharacter`] if a key appears twice.
    pub fn set_columns(&mut self, characters: &[CharacterKey]) -> Result<(), ModelError> {
        let mut seen = HashSet::with_capacity(characters.len());
        for (i, key) in characters.iter().enumerate() {
            let character = self
                .characters
                .get(key)
                .ok_or_else(|| ModelError::unknown_key(key))?;
            if !seen.insert(*key) {
                return Err(ModelError::DuplicateCharacter {
                    path: EntityPath::column(i),
                    label: character.label().to_string(),
                });
            }
        }

        let old_columns = self.matrix.take_columns();
        let old_index: HashMap<CharacterKey, usize> = old_columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.character(), i))
            .collect();
        let mut old_by_key: HashMap<CharacterKey, Column> = old_columns
            .into_iter()
            .map(|c| (c.character(), c))
            .collect();
        let new_columns = characters
            .iter()
            .map(|k| old_by_key.remove(k).unwrap_or_else(|| Column::new(*k)))
            .collect();
        self.matrix.set_columns(new_columns);

        let row_keys: Vec<RowKey> = self.rows.keys().copied().collect();
        for row_key in row_keys {
            let old_cells = self
                .rows
                .get(&row_key)
                .map(|r| r.cells().to_vec())
                .unwrap_or_default();
            let mut new_cells = Vec::with_capacity(characters.len());
            for (i, key) in characters.iter().enumerate() {
                let kept = old_index.get(key).and_then(|&j| old_cells.get(j)).copied();
                match kept {
                    Some(cell_key) => {
                        if let Some(cell) = self.cells.get_mut(&cell_key) {
                            cell.attach_to_row(row_key, i);
                        }
                        new_cells.push(cell_key);
                    }
                    None => new_cells.push(self.new_unassigned_cell(row_key, i, *key)?),
                }
            }
            let keep: HashSet<CellKey> = new_cells.iter().copied().collect();
            for cell_key in old_cells.iter().filter(|k| !keep.contains(k)) {
                self.cells.shift_remove(cell_key);
            }
            if let Some(row) = self.rows.get_mut(&row_key) {
                row.set_cells(new_cells);
            }
        }

        self.characters.retain(|k, _| seen.contains(k));
        tracing::debug!("matrix now has {} columns", characters.len());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Row and cell operations
    // ------------------------------------------------------------------

    /// Ensure `otu` has a row, creating one of `UNASSIGNED` cells if needed
    ///
    /// An existing row is returned unchanged.
    ///
    /// # Errors
    /// [`ModelError::UnknownKey`] if `otu` is not in the OTU set.
    pub fn put_row(&mut self, otu: OtuKey) -> Result<RowKey, ModelError> {
        if !self.otu_set.contains(otu) {
            return Err(ModelError::unknown_key(otu));
        }
        if let Some(existing) = self.matrix.row_for(otu) {
            return Ok(existing);
        }
        let row_key = RowKey::new(self.alloc());
        let characters: Vec<CharacterKey> = self.matrix.characters().collect();
        let mut cells = Vec::with_capacity(characters.len());
        for (i, character) in characters.into_iter().enumerate() {
            cells.push(self.new_unassigned_cell(row_key, i, character)?);
        }
        self.rows.insert(row_key, CharacterStateRow::new(otu, cells));
        self.matrix.insert_row(otu, row_key);
        Ok(row_key)
    }

    /// Remove the row of `otu` and its cells
    ///
    /// # Errors
    /// [`ModelError::UnknownKey`] if `otu` has no row.
    pub fn remove_row(&mut self, otu: OtuKey) -> Result<CharacterStateRow, ModelError> {
        let row_key = self
            .matrix
            .remove_row(otu)
            .ok_or_else(|| ModelError::unknown_key(otu))?;
        let row = self
            .rows
            .shift_remove(&row_key)
            .ok_or_else(|| ModelError::unknown_key(row_key))?;
        for cell in row.cells() {
            self.cells.shift_remove(cell);
        }
        Ok(row)
    }

    /// Set the type and states of one cell
    ///
    /// Returns whether the cell changed. A change flags the row and the
    /// column as changed.
    ///
    /// # Errors
    /// - [`ModelError::StructuralMismatch`] if `otu` has no row or `column` is
    ///   out of range.
    /// - [`ModelError::InvalidCellState`] if the pairing is rejected.
    pub fn set_cell<I>(
        &mut self,
        otu: OtuKey,
        column: usize,
        cell_type: CellType,
        states: I,
    ) -> Result<bool, ModelError>
    where
        I: IntoIterator<Item = StateNumber>,
    {
        let path = self.cell_path(otu, column);
        let row_key = self
            .matrix
            .row_for(otu)
            .ok_or_else(|| ModelError::structural(self.row_path(otu), "OTU has no row"))?;
        let character_key = self
            .matrix
            .columns()
            .get(column)
            .map(Column::character)
            .ok_or_else(|| {
                ModelError::structural(path.clone(), format!("column {column} out of range"))
            })?;
        let cell_key = self
            .rows
            .get(&row_key)
            .and_then(|r| r.cell(column))
            .ok_or_else(|| ModelError::structural(path.clone(), "row has no cell here"))?;
        let owner = self
            .characters
            .get(&character_key)
            .ok_or_else(|| ModelError::unknown_key(character_key))?;
        let cell = self
            .cells
            .get_mut(&cell_key)
            .ok_or_else(|| ModelError::unknown_key(cell_key))?;

        let changed = cell
            .set_type_and_states(cell_type, states, owner)
            .map_err(|e| e.at(path))?;
        if changed {
            if let Some(row) = self.rows.get_mut(&row_key) {
                row.meta_mut().mark_changed();
            }
            self.matrix.mark_column_changed(column);
        }
        Ok(changed)
    }

    /// [`set_cell`](Self::set_cell) from a [`CellValue`]
    ///
    /// # Errors
    /// As [`set_cell`](Self::set_cell).
    pub fn set_cell_value(
        &mut self,
        otu: OtuKey,
        column: usize,
        value: &CellValue,
    ) -> Result<bool, ModelError> {
        self.set_cell(otu, column, value.cell_type(), value.states().iter().copied())
    }

    // ------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------

    /// Check the whole graph, rows in OTU order
    ///
    /// # Errors
    /// The first violation found.
    pub fn check_invariants(&self) -> Result<(), ModelError> {
        self.check_structure()?;
        for (otu, _) in self.rows_in_otu_order() {
            self.check_row(otu)?;
        }
        Ok(())
    }

    /// Check everything except the contents of individual rows
    ///
    /// # Errors
    /// [`ModelError::StructuralMismatch`] or
    /// [`ModelError::DuplicateCharacter`] for the first violation.
    pub fn check_structure(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::with_capacity(self.column_count());
        for (i, key) in self.matrix.characters().enumerate() {
            let character = self.characters.get(&key).ok_or_else(|| {
                ModelError::structural(EntityPath::column(i), "column has no character")
            })?;
            if !seen.insert(key) {
                return Err(ModelError::DuplicateCharacter {
                    path: EntityPath::column(i),
                    label: character.label().to_string(),
                });
            }
        }
        if let Some((key, _)) = self.characters.iter().find(|(k, _)| !seen.contains(*k)) {
            return Err(ModelError::structural(
                self.character_path(*key),
                "character is not a column",
            ));
        }

        let mut labels = HashSet::with_capacity(self.otu_set.len());
        for (_, otu) in self.otu_set.iter() {
            if !labels.insert(otu.label()) {
                return Err(ModelError::DuplicateOtu {
                    path: EntityPath::otu(otu.label()),
                    label: otu.label().to_string(),
                });
            }
        }

        let mut referenced_cells = 0usize;
        for (otu, row_key) in self.matrix.rows() {
            if !self.otu_set.contains(otu) {
                return Err(ModelError::structural(
                    self.row_path(otu),
                    "row OTU is not in the OTU set",
                ));
            }
            let row = self
                .rows
                .get(&row_key)
                .ok_or_else(|| ModelError::structural(self.row_path(otu), "row is missing"))?;
            if row.otu() != otu {
                return Err(ModelError::structural(
                    self.row_path(otu),
                    format!("row belongs to {}", row.otu()),
                ));
            }
            referenced_cells += row.cells().len();
        }
        if self.rows.len() != self.matrix.row_count() {
            return Err(ModelError::structural(
                EntityPath::matrix(),
                "row not reachable from any OTU",
            ));
        }
        if referenced_cells != self.cells.len() {
            return Err(ModelError::structural(
                EntityPath::matrix(),
                format!(
                    "{} cells in graph, {referenced_cells} referenced by rows",
                    self.cells.len()
                ),
            ));
        }
        Ok(())
    }

    /// Check one row: length, attachment and every cell's value
    ///
    /// # Errors
    /// [`ModelError::StructuralMismatch`] or [`ModelError::InvalidCellState`]
    /// for the first bad cell.
    pub fn check_row(&self, otu: OtuKey) -> Result<(), ModelError> {
        let row_key = self
            .matrix
            .row_for(otu)
            .ok_or_else(|| ModelError::structural(self.row_path(otu), "OTU has no row"))?;
        let row = self
            .rows
            .get(&row_key)
            .ok_or_else(|| ModelError::structural(self.row_path(otu), "row is missing"))?;
        if row.cells().len() != self.column_count() {
            return Err(ModelError::structural(
                self.row_path(otu),
                format!(
                    "row has {} cells, matrix has {} columns",
                    row.cells().len(),
                    self.column_count()
                ),
            ));
        }
        for (column, (cell_key, (_, owner))) in row.cells().iter().zip(self.columns()).enumerate()
        {
            let path = || self.cell_path(otu, column);
            let cell = self
                .cells
                .get(cell_key)
                .ok_or_else(|| ModelError::structural(path(), "cell is missing"))?;
            let position = cell
                .position()
                .ok_or_else(|| ModelError::CellNotAttached { path: path() })?;
            if position.row != row_key || position.column != column {
                return Err(ModelError::structural(
                    path(),
                    format!("cell is attached at {}[{}]", position.row, position.column),
                ));
            }
            if let Some(value) = cell.value() {
                crate::cell::validate_cell(value.cell_type(), value.states(), owner)
                    .map_err(|e| e.at(path()))?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Change detection
    // ------------------------------------------------------------------

    /// Fingerprint of a row's cells in column order
    #[must_use]
    pub fn row_fingerprint(&self, row: RowKey) -> Option<Fingerprint> {
        let row = self.rows.get(&row)?;
        Some(Fingerprint::of_children(row.cells().iter().map(|k| {
            self.cells
                .get(k)
                .map_or((None, None), |c| c.meta().fingerprint_key())
        })))
    }

    /// Fingerprint of the OTU set's members in order
    #[must_use]
    pub fn otu_set_fingerprint(&self) -> Fingerprint {
        Fingerprint::of_children(self.otu_set.iter().map(|(_, o)| o.meta().fingerprint_key()))
    }

    /// Fingerprint of the matrix's children
    ///
    /// Columns in order, then rows in OTU order, then the OTU set.
    #[must_use]
    pub fn matrix_fingerprint(&self) -> Fingerprint {
        let columns = self.columns().map(|(_, c)| c.meta().fingerprint_key());
        let rows = self.rows_in_otu_order().into_iter().map(|(_, r)| {
            self.rows
                .get(&r)
                .map_or((None, None), |row| row.meta().fingerprint_key())
        });
        let otu_set = std::iter::once(self.otu_set.meta().fingerprint_key());
        Fingerprint::of_children(columns.chain(rows).chain(otu_set))
    }

    // ------------------------------------------------------------------
    // Flat views
    // ------------------------------------------------------------------

    /// Every entity with its path, parents before children
    #[must_use]
    pub fn entities(&self) -> Vec<EntityEntry> {
        fn entry(kind: EntityKind, path: EntityPath, meta: &Versioned) -> EntityEntry {
            EntityEntry {
                kind,
                path,
                id: meta.id(),
                stamp: meta.stamp(),
            }
        }

        let mut out = Vec::with_capacity(
            2 + self.otu_set.len() + self.characters.len() + self.rows.len() + self.cells.len(),
        );
        out.push(entry(EntityKind::Matrix, EntityPath::matrix(), self.matrix.meta()));
        out.push(entry(EntityKind::OtuSet, EntityPath::otu_set(), self.otu_set.meta()));
        for (_, otu) in self.otu_set.iter() {
            out.push(entry(EntityKind::Otu, EntityPath::otu(otu.label()), otu.meta()));
        }
        for (_, character) in self.columns() {
            out.push(entry(
                EntityKind::Character,
                EntityPath::character(character.label()),
                character.meta(),
            ));
        }
        for (otu, row_key) in self.rows_in_otu_order() {
            let Some(row) = self.rows.get(&row_key) else {
                continue;
            };
            out.push(entry(EntityKind::Row, self.row_path(otu), row.meta()));
            for (column, cell_key) in row.cells().iter().enumerate() {
                if let Some(cell) = self.cells.get(cell_key) {
                    out.push(entry(EntityKind::Cell, self.cell_path(otu, column), cell.meta()));
                }
            }
        }
        out
    }

    /// Highest version stamp held by any entity
    #[must_use]
    pub fn highest_stamp(&self) -> Option<VersionStamp> {
        self.entities().into_iter().filter_map(|e| e.stamp).max()
    }
}
