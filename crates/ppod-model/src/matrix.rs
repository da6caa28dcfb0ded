//! The character-state matrix header
//!
//! [`CharacterStateMatrix`] holds the matrix's own attributes and its
//! structure (column order, per-column versions, OTU → row mapping). The
//! entities it points at live in the surrounding
//! [`MatrixGraph`](crate::MatrixGraph).

use crate::id::{CharacterKey, OtuKey, PPodId, RowKey};
use crate::version::VersionInfo;
use crate::versioned::Versioned;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One matrix column: its character, its version and whether a cell in it changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    character: CharacterKey,
    version: Option<VersionInfo>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    changed: bool,
}

impl Column {
    pub(crate) const fn new(character: CharacterKey) -> Self {
        Self {
            character,
            version: None,
            changed: true,
        }
    }

    /// Character of this column
    #[inline]
    #[must_use]
    pub const fn character(&self) -> CharacterKey {
        self.character
    }

    /// Column version; `None` until first saved
    #[inline]
    #[must_use]
    pub const fn version(&self) -> Option<VersionInfo> {
        self.version
    }

    /// Whether a cell in this column changed since the last save
    #[inline]
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        self.changed
    }

    /// Assign the column version and clear the changed flag
    #[inline]
    pub fn assign_version(&mut self, version: VersionInfo) {
        self.version = Some(version);
        self.changed = false;
    }
}

/// Matrix header: attributes, columns and row mapping
///
/// # Invariants
/// - Columns reference distinct characters.
/// - Column order is content: reordering changes the matrix.
/// - A column keeps its version when it moves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStateMatrix {
    meta: Versioned,
    ppod_id: Option<PPodId>,
    label: String,
    description: Option<String>,
    columns: Vec<Column>,
    rows: IndexMap<OtuKey, RowKey>,
}

impl CharacterStateMatrix {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
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

    /// Stable pPod id
    #[inline]
    #[must_use]
    pub const fn ppod_id(&self) -> Option<PPodId> {
        self.ppod_id
    }

    /// Set the pPod id
    #[inline]
    pub fn set_ppod_id(&mut self, ppod_id: PPodId) {
        self.ppod_id = Some(ppod_id);
    }

    /// Label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Description
    #[inline]
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Change the label; returns whether it changed
    pub fn set_label(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.label == label {
            return false;
        }
        self.label = label;
        self.meta.mark_changed();
        true
    }

    /// Change the description; returns whether it changed
    pub fn set_description(&mut self, description: Option<String>) -> bool {
        if self.description == description {
            return false;
        }
        self.description = description;
        self.meta.mark_changed();
        true
    }

    /// Number of columns
    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Columns in order
    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Mutable column, for version assignment
    #[inline]
    pub fn column_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.get_mut(index)
    }

    /// Character keys in column order
    #[inline]
    pub fn characters(&self) -> impl Iterator<Item = CharacterKey> + '_ {
        self.columns.iter().map(Column::character)
    }

    /// Column index of `character`
    #[inline]
    #[must_use]
    pub fn column_of(&self, character: CharacterKey) -> Option<usize> {
        self.columns.iter().position(|c| c.character == character)
    }

    /// Row of `otu`
    #[inline]
    #[must_use]
    pub fn row_for(&self, otu: OtuKey) -> Option<RowKey> {
        self.rows.get(&otu).copied()
    }

    /// OTU → row mapping
    #[inline]
    pub fn rows(&self) -> impl Iterator<Item = (OtuKey, RowKey)> + '_ {
        self.rows.iter().map(|(o, r)| (*o, *r))
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn mark_column_changed(&mut self, index: usize) {
        if let Some(column) = self.columns.get_mut(index) {
            column.changed = true;
        }
    }

    pub(crate) fn set_columns(&mut self, columns: Vec<Column>) {
        self.columns = columns;
    }

    pub(crate) fn take_columns(&mut self) -> Vec<Column> {
        std::mem::take(&mut self.columns)
    }

    pub(crate) fn push_column(&mut self, character: CharacterKey) {
        self.columns.push(Column::new(character));
    }

    pub(crate) fn insert_row(&mut self, otu: OtuKey, row: RowKey) {
        self.rows.insert(otu, row);
    }

    pub(crate) fn remove_row(&mut self, otu: OtuKey) -> Option<RowKey> {
        self.rows.shift_remove(&otu)
    }
}
