//! Character-state cells
//!
//! A cell is one entry of a matrix: the observed states of one OTU for one
//! character. Its type and its state set are always set together and
//! validated against the type table:
//!
//! | type           | states |
//! |----------------|--------|
//! | `UNASSIGNED`   | 0      |
//! | `SINGLE`       | 1      |
//! | `POLYMORPHIC`  | ≥ 2    |
//! | `UNCERTAIN`    | ≥ 2    |
//! | `INAPPLICABLE` | 0      |
//!
//! # Example
//!
//! ```rust,ignore
//! use ppod_model::{CellType, Character, validate_cell};
//!
//! let ch = Character::new("colour").with_state(0, "red").with_state(1, "blue");
//! validate_cell(CellType::Polymorphic, &[0, 1].into(), &ch)?;
//! ```

use crate::character::{Character, StateNumber};
use crate::error::ModelError;
use crate::id::RowKey;
use crate::versioned::Versioned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// Kind of observation recorded in a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellType {
    /// Not yet scored
    Unassigned,
    /// Exactly one state
    Single,
    /// Several states observed together
    Polymorphic,
    /// One of several states, unknown which
    Uncertain,
    /// Character does not apply to this OTU
    Inapplicable,
}

impl CellType {
    /// All cell types
    pub const ALL: [Self; 5] = [
        Self::Unassigned,
        Self::Single,
        Self::Polymorphic,
        Self::Uncertain,
        Self::Inapplicable,
    ];

    /// Whether `count` distinct states fit this type
    #[inline]
    #[must_use]
    pub const fn allows(self, count: usize) -> bool {
        match self {
            Self::Unassigned | Self::Inapplicable => count == 0,
            Self::Single => count == 1,
            Self::Polymorphic | Self::Uncertain => count >= 2,
        }
    }

    const fn requirement(self) -> &'static str {
        match self {
            Self::Unassigned | Self::Inapplicable => "no states",
            Self::Single => "exactly one state",
            Self::Polymorphic | Self::Uncertain => "at least two states",
        }
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unassigned => "UNASSIGNED",
            Self::Single => "SINGLE",
            Self::Polymorphic => "POLYMORPHIC",
            Self::Uncertain => "UNCERTAIN",
            Self::Inapplicable => "INAPPLICABLE",
        })
    }
}

/// Check a type/state pairing against the type table and the owning character
///
/// # Errors
/// Returns [`ModelError::InvalidCellState`] (with an empty path) if the
/// number of states does not fit `cell_type`, or if a state is not defined
/// by `owner`.
pub fn validate_cell(
    cell_type: CellType,
    states: &BTreeSet<StateNumber>,
    owner: &Character,
) -> Result<(), ModelError> {
    if !cell_type.allows(states.len()) {
        return Err(ModelError::invalid_cell_state(
            cell_type,
            format!(
                "{cell_type} requires {}, got {}",
                cell_type.requirement(),
                states.len()
            ),
        ));
    }
    if let Some(foreign) = states.iter().find(|n| !owner.has_state(**n)) {
        return Err(ModelError::invalid_cell_state(
            cell_type,
            format!("state {foreign} is not defined by character '{}'", owner.label()),
        ));
    }
    Ok(())
}

/// A cell's type and its (sorted) state numbers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellValue {
    cell_type: CellType,
    states: BTreeSet<StateNumber>,
}

impl CellValue {
    /// The `UNASSIGNED` value
    #[inline]
    #[must_use]
    pub const fn unassigned() -> Self {
        Self {
            cell_type: CellType::Unassigned,
            states: BTreeSet::new(),
        }
    }

    /// Cell type
    #[inline]
    #[must_use]
    pub const fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// State numbers in ascending order
    #[inline]
    #[must_use]
    pub const fn states(&self) -> &BTreeSet<StateNumber> {
        &self.states
    }
}

/// Where a cell sits: its row and column index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPosition {
    /// Owning row
    pub row: RowKey,
    /// Column index within the row
    pub column: usize,
}

/// One cell of a character-state matrix
///
/// # Invariants
/// - `value`, when present, satisfies [`validate_cell`] against the
///   character of its column.
/// - States can only be set while `position` is present.
/// - The dirty flag is raised only when `(type, states)` actually changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStateCell {
    meta: Versioned,
    position: Option<CellPosition>,
    value: Option<CellValue>,
}

impl Default for CharacterStateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl CharacterStateCell {
    /// Detached cell without a value
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            meta: Versioned::new(),
            position: None,
            value: None,
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

    /// Row position, if attached
    #[inline]
    #[must_use]
    pub const fn position(&self) -> Option<CellPosition> {
        self.position
    }

    /// Current value, if ever set
    #[inline]
    #[must_use]
    pub const fn value(&self) -> Option<&CellValue> {
        self.value.as_ref()
    }

    /// Current type; a cell that was never set reads as `UNASSIGNED`
    #[inline]
    #[must_use]
    pub fn cell_type(&self) -> CellType {
        self.value.as_ref().map_or(CellType::Unassigned, CellValue::cell_type)
    }

    /// Attach to `(row, column)`
    #[inline]
    pub fn attach_to_row(&mut self, row: RowKey, column: usize) {
        self.position = Some(CellPosition { row, column });
    }

    /// Remove the row position
    #[inline]
    pub fn detach(&mut self) {
        self.position = None;
    }

    /// Set type and states together
    ///
    /// Returns whether the value changed; the cell is marked as needing a
    /// new version only in that case.
    ///
    /// # Errors
    /// - [`ModelError::CellNotAttached`] if the cell has no position. This is
    ///   checked before the pairing itself.
    /// - [`ModelError::InvalidCellState`] if [`validate_cell`] rejects the
    ///   pairing.
    pub fn set_type_and_states<I>(
        &mut self,
        cell_type: CellType,
        states: I,
        owner: &Character,
    ) -> Result<bool, ModelError>
    where
        I: IntoIterator<Item = StateNumber>,
    {
        if self.position.is_none() {
            return Err(ModelError::CellNotAttached {
                path: crate::path::EntityPath::root(),
            });
        }
        let states: BTreeSet<StateNumber> = states.into_iter().collect();
        validate_cell(cell_type, &states, owner)?;

        let value = CellValue { cell_type, states };
        if self.value.as_ref() == Some(&value) {
            return Ok(false);
        }
        self.value = Some(value);
        self.meta.mark_changed();
        Ok(true)
    }

    /// Set `UNASSIGNED`
    ///
    /// # Errors
    /// See [`set_type_and_states`](Self::set_type_and_states).
    pub fn set_unassigned(&mut self, owner: &Character) -> Result<bool, ModelError> {
        self.set_type_and_states(CellType::Unassigned, [], owner)
    }

    /// Set `INAPPLICABLE`
    ///
    /// # Errors
    /// See [`set_type_and_states`](Self::set_type_and_states).
    pub fn set_inapplicable(&mut self, owner: &Character) -> Result<bool, ModelError> {
        self.set_type_and_states(CellType::Inapplicable, [], owner)
    }

    /// Set `SINGLE` with one state
    ///
    /// # Errors
    /// See [`set_type_and_states`](Self::set_type_and_states).
    pub fn set_single(
        &mut self,
        state: StateNumber,
        owner: &Character,
    ) -> Result<bool, ModelError> {
        self.set_type_and_states(CellType::Single, [state], owner)
    }

    /// Set `POLYMORPHIC`
    ///
    /// # Errors
    /// See [`set_type_and_states`](Self::set_type_and_states).
    pub fn set_polymorphic<I>(&mut self, states: I, owner: &Character) -> Result<bool, ModelError>
    where
        I: IntoIterator<Item = StateNumber>,
    {
        self.set_type_and_states(CellType::Polymorphic, states, owner)
    }

    /// Set `UNCERTAIN`
    ///
    /// # Errors
    /// See [`set_type_and_states`](Self::set_type_and_states).
    pub fn set_uncertain<I>(&mut self, states: I, owner: &Character) -> Result<bool, ModelError>
    where
        I: IntoIterator<Item = StateNumber>,
    {
        self.set_type_and_states(CellType::Uncertain, states, owner)
    }
}
