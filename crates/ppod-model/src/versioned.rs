//! Versioned entity metadata shared by every persistent model type

use crate::id::EntityId;
use crate::version::{VersionInfo, VersionStamp};
use serde::{Deserialize, Serialize};

/// Identity, version and dirty flag of a persistent entity
///
/// # Invariants
/// - `id` is assigned at most once.
/// - The version changes iff persisted content changed.
/// - `needs_new_version` is cleared whenever a version is assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned {
    id: Option<EntityId>,
    version: Option<VersionInfo>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    needs_new_version: bool,
}

impl Versioned {
    /// Fresh, never-saved metadata
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            id: None,
            version: None,
            needs_new_version: false,
        }
    }

    /// Metadata of an already persisted entity
    #[inline]
    #[must_use]
    pub const fn persisted(id: EntityId, version: VersionInfo) -> Self {
        Self {
            id: Some(id),
            version: Some(version),
            needs_new_version: false,
        }
    }

    /// Surrogate identity, if saved
    #[inline]
    #[must_use]
    pub const fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Current version, if saved
    #[inline]
    #[must_use]
    pub const fn version(&self) -> Option<VersionInfo> {
        self.version
    }

    /// Current stamp, if saved
    #[inline]
    #[must_use]
    pub fn stamp(&self) -> Option<VersionStamp> {
        self.version.map(|v| v.stamp())
    }

    /// True until the first save assigns an identity
    #[inline]
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Whether a content change is pending
    #[inline]
    #[must_use]
    pub const fn needs_new_version(&self) -> bool {
        self.needs_new_version
    }

    /// Flag a content change
    #[inline]
    pub fn mark_changed(&mut self) {
        self.needs_new_version = true;
    }

    /// Clear the dirty flag without assigning a version
    #[inline]
    pub fn clear_changed(&mut self) {
        self.needs_new_version = false;
    }

    /// Assign the identity if none is set yet
    ///
    /// Returns `false` if an identity was already present; it is kept.
    pub fn assign_id(&mut self, id: EntityId) -> bool {
        if self.id.is_some() {
            return false;
        }
        self.id = Some(id);
        true
    }

    /// Assign a new version and clear the dirty flag
    #[inline]
    pub fn assign_version(&mut self, version: VersionInfo) {
        self.version = Some(version);
        self.needs_new_version = false;
    }

    /// Identity and stamp pair, as fed to child fingerprints
    #[inline]
    #[must_use]
    pub fn fingerprint_key(&self) -> (Option<EntityId>, Option<VersionStamp>) {
        (self.id, self.stamp())
    }
}
