//! Characters and their states
//!
//! A [`Character`] is a matrix column definition: a label plus a set of
//! numbered [`CharacterState`]s. Cells reference states by number; the
//! character owns them.

use crate::id::PPodId;
use crate::versioned::Versioned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number identifying a state within its character
pub type StateNumber = u16;

/// One state of a character
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterState {
    state_number: StateNumber,
    label: String,
}

impl CharacterState {
    /// Create a state
    #[inline]
    #[must_use]
    pub fn new(state_number: StateNumber, label: impl Into<String>) -> Self {
        Self {
            state_number,
            label: label.into(),
        }
    }

    /// State number
    #[inline]
    #[must_use]
    pub const fn state_number(&self) -> StateNumber {
        self.state_number
    }

    /// State label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A matrix column definition
///
/// # Invariants
/// - State numbers are unique (keyed map).
/// - Content is the label plus the state map; any change to either marks
///   the character as needing a new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    meta: Versioned,
    ppod_id: Option<PPodId>,
    label: String,
    states: BTreeMap<StateNumber, CharacterState>,
}

impl Character {
    /// Create a character without states
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            meta: Versioned::new(),
            ppod_id: None,
            label: label.into(),
            states: BTreeMap::new(),
        }
    }

    /// Builder: add a state
    #[must_use]
    pub fn with_state(mut self, state_number: StateNumber, label: impl Into<String>) -> Self {
        self.put_state(CharacterState::new(state_number, label));
        self
    }

    /// Builder: set the pPod id
    #[inline]
    #[must_use]
    pub fn with_ppod_id(mut self, ppod_id: PPodId) -> Self {
        self.ppod_id = Some(ppod_id);
        self
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

    /// Set the pPod id (identity, not content: no version change)
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

    /// Insert or replace a state; returns whether content changed
    pub fn put_state(&mut self, state: CharacterState) -> bool {
        if self.states.get(&state.state_number) == Some(&state) {
            return false;
        }
        self.states.insert(state.state_number, state);
        self.meta.mark_changed();
        true
    }

    /// Remove a state; returns whether it was present
    pub fn remove_state(&mut self, state_number: StateNumber) -> bool {
        let removed = self.states.remove(&state_number).is_some();
        if removed {
            self.meta.mark_changed();
        }
        removed
    }

    /// Replace the whole state map; returns whether content changed
    pub fn replace_states<I>(&mut self, states: I) -> bool
    where
        I: IntoIterator<Item = CharacterState>,
    {
        let states: BTreeMap<_, _> = states
            .into_iter()
            .map(|s| (s.state_number, s))
            .collect();
        if self.states == states {
            return false;
        }
        self.states = states;
        self.meta.mark_changed();
        true
    }

    /// Look up a state by number
    #[inline]
    #[must_use]
    pub fn state(&self, state_number: StateNumber) -> Option<&CharacterState> {
        self.states.get(&state_number)
    }

    /// Whether this character defines `state_number`
    #[inline]
    #[must_use]
    pub fn has_state(&self, state_number: StateNumber) -> bool {
        self.states.contains_key(&state_number)
    }

    /// States in ascending number order
    #[inline]
    pub fn states(&self) -> impl Iterator<Item = &CharacterState> {
        self.states.values()
    }

    /// Number of states
    #[inline]
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Same label and states, ignoring identity and version
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.label == other.label && self.states == other.states
    }
}
