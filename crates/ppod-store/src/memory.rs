//! In-memory matrix store

use crate::error::StoreError;
use crate::locks::{MatrixLock, MatrixLocks};
use crate::repository::MatrixRepository;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ppod_model::{EntityId, MatrixGraph, VersionStamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe store keeping whole graphs in a `DashMap`
///
/// Graphs are held behind `Arc` so a commit is a single pointer swap under
/// the shard lock; loads hand out a deep copy.
#[derive(Debug, Default)]
pub struct InMemoryMatrixStore {
    graphs: DashMap<EntityId, Arc<MatrixGraph>>,
    last_identity: AtomicU64,
    locks: MatrixLocks,
}

impl InMemoryMatrixStore {
    /// Empty store; the first identity is 1
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store whose identities continue after `highest`
    #[inline]
    #[must_use]
    pub fn with_identities_after(highest: EntityId) -> Self {
        Self {
            last_identity: AtomicU64::new(highest.get()),
            ..Self::default()
        }
    }

    /// Number of stored matrices
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Whether a matrix is stored under `id`
    #[inline]
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.graphs.contains_key(&id)
    }

    /// Shared read-only view of a stored graph
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Arc<MatrixGraph>> {
        self.graphs.get(&id).map(|g| Arc::clone(g.value()))
    }

    /// Delete a matrix
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if absent.
    pub fn remove_matrix(&self, id: EntityId) -> Result<MatrixGraph, StoreError> {
        let (_, graph) = self.graphs.remove(&id).ok_or(StoreError::NotFound(id))?;
        self.locks.forget(id);
        tracing::info!("removed matrix {}", id);
        Ok(Arc::try_unwrap(graph).unwrap_or_else(|shared| MatrixGraph::clone(&shared)))
    }
}

impl MatrixRepository for InMemoryMatrixStore {
    fn load_matrix(&self, id: EntityId) -> Result<MatrixGraph, StoreError> {
        let graph = self.graphs.get(&id).ok_or(StoreError::NotFound(id))?;
        tracing::debug!("loaded matrix {} ({} cells)", id, graph.cell_count());
        Ok(MatrixGraph::clone(graph.value()))
    }

    fn store_matrix(
        &self,
        graph: MatrixGraph,
        base: Option<VersionStamp>,
    ) -> Result<EntityId, StoreError> {
        let id = graph.matrix().meta().id().ok_or(StoreError::NotPersisted)?;
        match self.graphs.entry(id) {
            Entry::Occupied(mut entry) => {
                let found = entry.get().matrix().meta().stamp();
                if found != base {
                    tracing::warn!("rejected write to matrix {}: stale base", id);
                    return Err(StoreError::Conflict {
                        id,
                        expected: base,
                        found,
                    });
                }
                entry.insert(Arc::new(graph));
            }
            Entry::Vacant(entry) => {
                if base.is_some() {
                    return Err(StoreError::Conflict {
                        id,
                        expected: base,
                        found: None,
                    });
                }
                entry.insert(Arc::new(graph));
            }
        }
        tracing::debug!("stored matrix {}", id);
        Ok(id)
    }

    fn next_identity(&self) -> EntityId {
        EntityId::new(self.last_identity.fetch_add(1, Ordering::AcqRel) + 1)
    }

    fn lock_matrix(&self, id: EntityId) -> MatrixLock {
        self.locks.lock_for(id)
    }

    fn highest_stamp(&self) -> Option<VersionStamp> {
        self.graphs
            .iter()
            .filter_map(|g| g.value().highest_stamp())
            .max()
    }
}
