//! OTUs (taxa) and OTU sets

use crate::error::ModelError;
use crate::id::{OtuKey, PPodId};
use crate::path::EntityPath;
use crate::versioned::Versioned;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Operational taxonomic unit: one taxon of the matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Otu {
    meta: Versioned,
    ppod_id: Option<PPodId>,
    label: String,
}

impl Otu {
    /// Create an unsaved OTU
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            meta: Versioned::new(),
            ppod_id: None,
            label: label.into(),
        }
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

    /// Change the label without checking set uniqueness
    ///
    /// Returns whether it changed. Use
    /// [`MatrixGraph::set_otu_label`](crate::MatrixGraph::set_otu_label) for
    /// the checked variant.
    pub fn set_label(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.label == label {
            return false;
        }
        self.label = label;
        self.meta.mark_changed();
        true
    }
}

/// Ordered set of OTUs with unique labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtuSet {
    meta: Versioned,
    ppod_id: Option<PPodId>,
    label: String,
    description: Option<String>,
    otus: IndexMap<OtuKey, Otu>,
}

impl OtuSet {
    /// Create an empty set
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
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

    /// Number of OTUs
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.otus.len()
    }

    /// Whether the set has no OTUs
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.otus.is_empty()
    }

    /// Whether `key` is a member
    #[inline]
    #[must_use]
    pub fn contains(&self, key: OtuKey) -> bool {
        self.otus.contains_key(&key)
    }

    /// Look up an OTU
    #[inline]
    #[must_use]
    pub fn get(&self, key: OtuKey) -> Option<&Otu> {
        self.otus.get(&key)
    }

    /// Look up an OTU mutably
    #[inline]
    pub fn get_mut(&mut self, key: OtuKey) -> Option<&mut Otu> {
        self.otus.get_mut(&key)
    }

    /// OTUs in set order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (OtuKey, &Otu)> {
        self.otus.iter().map(|(k, v)| (*k, v))
    }

    /// OTU keys in set order
    #[inline]
    pub fn keys(&self) -> impl Iterator<Item = OtuKey> + '_ {
        self.otus.keys().copied()
    }

    /// Position of `key` in the set order
    #[inline]
    #[must_use]
    pub fn position(&self, key: OtuKey) -> Option<usize> {
        self.otus.get_index_of(&key)
    }

    /// Find an OTU by label
    #[must_use]
    pub fn find_by_label(&self, label: &str) -> Option<OtuKey> {
        self.iter().find(|(_, o)| o.label == label).map(|(k, _)| k)
    }

    /// Find an OTU by pPod id
    #[must_use]
    pub fn find_by_ppod_id(&self, ppod_id: PPodId) -> Option<OtuKey> {
        self.iter()
            .find(|(_, o)| o.ppod_id == Some(ppod_id))
            .map(|(k, _)| k)
    }

    pub(crate) fn insert(&mut self, key: OtuKey, otu: Otu) -> Result<(), ModelError> {
        if self.find_by_label(&otu.label).is_some() {
            return Err(ModelError::DuplicateOtu {
                path: EntityPath::otu(&otu.label),
                label: otu.label,
            });
        }
        if let Some(ppod_id) = otu.ppod_id {
            if self.find_by_ppod_id(ppod_id).is_some() {
                return Err(ModelError::DuplicateOtu {
                    path: EntityPath::otu(&otu.label),
                    label: format!("{} (pPod id {ppod_id})", otu.label),
                });
            }
        }
        self.otus.insert(key, otu);
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: OtuKey) -> Option<Otu> {
        self.otus.shift_remove(&key)
    }

    /// Reorder to `order`, which must be a permutation of the members
    pub(crate) fn reorder(&mut self, order: &[OtuKey]) -> Result<(), ModelError> {
        let mut reordered = IndexMap::with_capacity(order.len());
        for key in order {
            let otu = self
                .otus
                .get(key)
                .ok_or_else(|| ModelError::unknown_key(key))?;
            if reordered.insert(*key, otu.clone()).is_some() {
                return Err(ModelError::structural(
                    EntityPath::otu_set(),
                    format!("OTU {key} listed twice in new order"),
                ));
            }
        }
        if reordered.len() != self.otus.len() {
            return Err(ModelError::structural(
                EntityPath::otu_set(),
                format!(
                    "new order lists {} of {} OTUs",
                    reordered.len(),
                    self.otus.len()
                ),
            ));
        }
        self.otus = reordered;
        Ok(())
    }
}
