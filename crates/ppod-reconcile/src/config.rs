//! Reconciliation configuration

use crate::error::ReconcileError;
use serde::{Deserialize, Serialize};

/// How identity-less incoming entities are matched to stored ones
///
/// Applied only after surrogate identity and pPod id matching failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Same label
    #[default]
    Label,
    /// Same index among the collection (set order or column order)
    Position,
    /// Never match; always create
    None,
}

/// Reconciliation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Fallback policy for OTUs
    pub otu_matching: MatchPolicy,
    /// Fallback policy for characters
    pub character_matching: MatchPolicy,
    /// Validate rows on the rayon pool
    pub parallel_validation: bool,
    /// Give OTUs, characters, the OTU set and the matrix a pPod id on save
    pub assign_ppod_ids: bool,
}

impl ReconcileConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With OTU matching policy
    #[inline]
    #[must_use]
    pub fn with_otu_matching(mut self, policy: MatchPolicy) -> Self {
        self.otu_matching = policy;
        self
    }

    /// With character matching policy
    #[inline]
    #[must_use]
    pub fn with_character_matching(mut self, policy: MatchPolicy) -> Self {
        self.character_matching = policy;
        self
    }

    /// With one policy for both collections
    #[inline]
    #[must_use]
    pub fn with_matching(self, policy: MatchPolicy) -> Self {
        self.with_otu_matching(policy).with_character_matching(policy)
    }

    /// With or without parallel row validation
    #[inline]
    #[must_use]
    pub fn with_parallel_validation(mut self, enabled: bool) -> Self {
        self.parallel_validation = enabled;
        self
    }

    /// With or without pPod id assignment
    #[inline]
    #[must_use]
    pub fn with_assign_ppod_ids(mut self, enabled: bool) -> Self {
        self.assign_ppod_ids = enabled;
        self
    }

    /// Parse from TOML; missing keys take their defaults
    ///
    /// # Errors
    /// [`ReconcileError::Config`] if the text is not valid TOML for this type.
    pub fn from_toml_str(text: &str) -> Result<Self, ReconcileError> {
        toml::from_str(text).map_err(|e| ReconcileError::Config(e.to_string()))
    }

    /// Render as TOML
    ///
    /// # Errors
    /// [`ReconcileError::Config`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ReconcileError> {
        toml::to_string(self).map_err(|e| ReconcileError::Config(e.to_string()))
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            otu_matching: MatchPolicy::Label,
            character_matching: MatchPolicy::Label,
            parallel_validation: true,
            assign_ppod_ids: true,
        }
    }
}
