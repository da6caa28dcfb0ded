//! What a reconciliation did

use ppod_model::{EntityId, EntityKind, EntityPath, MatrixGraph, VersionInfo};
use serde::Serialize;
use std::collections::HashSet;

/// One entity in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityChange {
    /// Entity kind
    pub kind: EntityKind,
    /// Location (in the graph it belongs to)
    pub path: EntityPath,
    /// Surrogate identity
    pub id: EntityId,
}

/// Outcome summary of one reconciliation
///
/// Paths of created, updated and unchanged entities refer to the merged
/// graph; paths of removed entities refer to the previously stored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    matrix_id: EntityId,
    stamp: Option<VersionInfo>,
    created: Vec<EntityChange>,
    updated: Vec<EntityChange>,
    removed: Vec<EntityChange>,
    unchanged: Vec<EntityChange>,
}

impl ReconcileReport {
    /// Diff `before` and `after` a save that allocated `stamp`
    #[must_use]
    pub fn diff(
        matrix_id: EntityId,
        before: &MatrixGraph,
        after: &MatrixGraph,
        stamp: Option<VersionInfo>,
    ) -> Self {
        let previous: HashSet<EntityId> = before.entities().iter().filter_map(|e| e.id).collect();
        let save_stamp = stamp.map(|v| v.stamp());

        let mut report = Self {
            matrix_id,
            stamp,
            created: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            unchanged: Vec::new(),
        };

        let mut current = HashSet::new();
        for entry in after.entities() {
            let Some(id) = entry.id else { continue };
            current.insert(id);
            let change = EntityChange {
                kind: entry.kind,
                path: entry.path,
                id,
            };
            if !previous.contains(&id) {
                report.created.push(change);
            } else if save_stamp.is_some() && entry.stamp == save_stamp {
                report.updated.push(change);
            } else {
                report.unchanged.push(change);
            }
        }
        for entry in before.entities() {
            if let Some(id) = entry.id.filter(|id| !current.contains(id)) {
                report.removed.push(EntityChange {
                    kind: entry.kind,
                    path: entry.path,
                    id,
                });
            }
        }
        report
    }

    /// Identity of the reconciled matrix
    #[inline]
    #[must_use]
    pub const fn matrix_id(&self) -> EntityId {
        self.matrix_id
    }

    /// The save's version, if anything changed
    #[inline]
    #[must_use]
    pub const fn stamp(&self) -> Option<VersionInfo> {
        self.stamp
    }

    /// Entities saved for the first time
    #[inline]
    #[must_use]
    pub fn created(&self) -> &[EntityChange] {
        &self.created
    }

    /// Existing entities that received the save's stamp
    #[inline]
    #[must_use]
    pub fn updated(&self) -> &[EntityChange] {
        &self.updated
    }

    /// Entities no longer part of the matrix
    #[inline]
    #[must_use]
    pub fn removed(&self) -> &[EntityChange] {
        &self.removed
    }

    /// Entities that kept their stamp
    #[inline]
    #[must_use]
    pub fn unchanged(&self) -> &[EntityChange] {
        &self.unchanged
    }

    /// Whether the save changed nothing
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Count of `kind` among created entities
    #[must_use]
    pub fn created_count(&self, kind: EntityKind) -> usize {
        self.created.iter().filter(|c| c.kind == kind).count()
    }

    /// Count of `kind` among updated entities
    #[must_use]
    pub fn updated_count(&self, kind: EntityKind) -> usize {
        self.updated.iter().filter(|c| c.kind == kind).count()
    }

    /// Count of `kind` among removed entities
    #[must_use]
    pub fn removed_count(&self, kind: EntityKind) -> usize {
        self.removed.iter().filter(|c| c.kind == kind).count()
    }

    /// Whether the entity at `path` was updated
    #[must_use]
    pub fn was_updated(&self, path: &EntityPath) -> bool {
        self.updated.iter().any(|c| &c.path == path)
    }
}
