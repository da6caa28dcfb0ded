//! The save-reconciliation engine
//!
//! Merges a client-submitted [`MatrixGraph`] into the stored one and assigns
//! identities and version stamps so that:
//!
//! - unchanged entities keep identity and stamp;
//! - changed entities keep identity and receive the save's stamp;
//! - incoming-only entities get a new identity and the save's stamp;
//! - stored-only entities are removed.
//!
//! # Phases
//!
//! 1. Lock the target matrix and load it.
//! 2. Validate the incoming graph and build the match plan (no mutation, no
//!    stamp).
//! 3. Merge structure into a working copy of the stored graph, checking the
//!    cancel flag between rows.
//! 4. Check the merged structure and the cancel flag a last time, then
//!    settle versions bottom-up: cells, rows, OTUs, OTU set, characters and
//!    columns, matrix. A parent changes iff its own attributes changed or
//!    the fingerprint of its children's `(identity, stamp)` list changed.
//! 5. Commit the working copy with one store call.
//!
//! At most one stamp is allocated per call, at the first change found.

use crate::config::ReconcileConfig;
use crate::error::ReconcileError;
use crate::matching::MatchPlan;
use crate::report::ReconcileReport;
use crate::validate::validate;
use ppod_model::{
    AtomicStampAllocator, CellValue, Character, CharacterKey, EntityId, MatrixGraph, ModelError,
    Otu, OtuKey, PPodId, PendingVersion, StampSource, Versioned,
};
use ppod_store::MatrixRepository;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancel flag
///
/// Cloning shares the flag. The engine checks it between rows and once more
/// before versioning starts. A reconciliation cancelled at either point
/// leaves the store and the stamp allocator untouched; one that got past the
/// last check runs to commit.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Fresh, not cancelled
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<(), ReconcileError> {
        if self.is_cancelled() {
            tracing::warn!("reconciliation cancelled before versioning");
            return Err(ReconcileError::Cancelled);
        }
        Ok(())
    }
}

/// Result of a successful reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// The merged graph as committed
    pub graph: MatrixGraph,
    /// What changed
    pub report: ReconcileReport,
}

/// Save-reconciliation engine
///
/// Safe to share across threads; reconciliations of different matrices run
/// concurrently, those of the same matrix are serialized by the
/// repository's per-matrix lock.
#[derive(Debug)]
pub struct ReconcileEngine<R, S = AtomicStampAllocator> {
    repository: Arc<R>,
    stamps: Arc<S>,
    config: ReconcileConfig,
}

impl<R, S> ReconcileEngine<R, S>
where
    R: MatrixRepository,
    S: StampSource,
{
    /// Engine with default configuration
    #[inline]
    #[must_use]
    pub fn new(repository: Arc<R>, stamps: Arc<S>) -> Self {
        Self {
            repository,
            stamps,
            config: ReconcileConfig::default(),
        }
    }

    /// With configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: ReconcileConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// The repository
    #[inline]
    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// The stamp source
    #[inline]
    #[must_use]
    pub fn stamps(&self) -> &S {
        &self.stamps
    }

    /// Reconcile `incoming` into the matrix `existing` (or a new matrix)
    ///
    /// # Errors
    /// - [`ReconcileError::Store`] with `NotFound` if `existing` is unknown.
    /// - [`ReconcileError::Model`] if the incoming graph is invalid.
    ///
    /// On error nothing is stored and no stamp has been allocated.
    pub fn reconcile(
        &self,
        incoming: &MatrixGraph,
        existing: Option<EntityId>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_with_cancel(incoming, existing, &CancellationToken::new())
    }

    /// [`reconcile`](Self::reconcile) with a cancel flag
    ///
    /// # Errors
    /// As [`reconcile`](Self::reconcile), plus [`ReconcileError::Cancelled`].
    pub fn reconcile_with_cancel(
        &self,
        incoming: &MatrixGraph,
        existing: Option<EntityId>,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match existing {
            Some(id) => {
                tracing::info!("reconciling matrix {}", id);
                let lock = self.repository.lock_matrix(id);
                let _guard = lock.lock();
                let stored = self.repository.load_matrix(id)?;
                self.run(incoming, &stored, cancel)
            }
            None => {
                tracing::info!("reconciling new matrix '{}'", incoming.matrix().label());
                self.run(incoming, &MatrixGraph::default(), cancel)
            }
        }
    }

    fn run(
        &self,
        incoming: &MatrixGraph,
        stored: &MatrixGraph,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let plan = validate(incoming, stored, &self.config).map_err(|e| {
            tracing::warn!("rejected incoming matrix: {}", e);
            e
        })?;
        cancel.check()?;

        let pending = PendingVersion::new(self.stamps.as_ref());
        let mut merge = Merge {
            incoming,
            stored,
            work: stored.clone(),
            plan,
            repository: self.repository.as_ref(),
            pending: &pending,
            config: &self.config,
        };
        let otu_map = merge.merge_otus()?;
        merge.merge_characters()?;
        merge.merge_rows(&otu_map, cancel)?;
        merge.merge_headers();
        merge.work.check_invariants()?;

        // Last cancellation point: settling allocates the stamp and identities.
        cancel.check()?;
        merge.settle_versions();
        let merged = merge.work;

        let matrix_id = merged
            .matrix()
            .meta()
            .id()
            .ok_or(ppod_store::StoreError::NotPersisted)?;
        let stamp = pending.allocated();
        let report = ReconcileReport::diff(matrix_id, stored, &merged, stamp);

        if let Some(version) = stamp {
            self.repository
                .store_matrix(merged.clone(), stored.matrix().meta().stamp())?;
            tracing::info!(
                "matrix {} saved at {}: {} created, {} updated, {} removed",
                matrix_id,
                version.stamp(),
                report.created().len(),
                report.updated().len(),
                report.removed().len()
            );
        } else {
            tracing::info!("matrix {} unchanged", matrix_id);
        }

        Ok(ReconcileOutcome {
            graph: merged,
            report,
        })
    }
}

/// Working state of pass 2
struct Merge<'a, R: ?Sized> {
    incoming: &'a MatrixGraph,
    stored: &'a MatrixGraph,
    work: MatrixGraph,
    plan: MatchPlan,
    repository: &'a R,
    pending: &'a PendingVersion<'a>,
    config: &'a ReconcileConfig,
}

impl<R: MatrixRepository + ?Sized> Merge<'_, R> {
    /// Returns incoming OTU key → working OTU key
    fn merge_otus(&mut self) -> Result<HashMap<OtuKey, OtuKey>, ModelError> {
        let incoming = self.incoming;
        for otu in self.plan.otus.unclaimed() {
            self.work.remove_otu_and_row(*otu)?;
        }

        let mut map = HashMap::with_capacity(self.plan.otus.pairs().len());
        let mut fresh = Vec::new();
        for (in_key, stored_key) in self.plan.otus.pairs() {
            let source = incoming
                .otu_set()
                .get(*in_key)
                .ok_or_else(|| ModelError::unknown_key(in_key))?;
            match stored_key {
                Some(key) => {
                    let target = self
                        .work
                        .otu_set_mut()
                        .get_mut(*key)
                        .ok_or_else(|| ModelError::unknown_key(key))?;
                    // Uniqueness is re-checked once every label is final.
                    target.set_label(source.label());
                    if let (None, Some(p)) = (target.ppod_id(), source.ppod_id()) {
                        target.set_ppod_id(p);
                        target.meta_mut().mark_changed();
                    }
                    map.insert(*in_key, *key);
                }
                None => fresh.push((*in_key, source)),
            }
        }
        for (in_key, source) in fresh {
            let mut otu = Otu::new(source.label());
            if let Some(p) = source.ppod_id() {
                otu.set_ppod_id(p);
            }
            let key = self.work.insert_otu(otu)?;
            map.insert(in_key, key);
        }

        let order: Vec<OtuKey> = incoming
            .otu_set()
            .keys()
            .filter_map(|k| map.get(&k).copied())
            .collect();
        self.work.set_otu_order(&order)?;
        tracing::debug!(
            "merged OTUs: {} matched, {} created, {} removed",
            map.len() - self.plan.otus.created(),
            self.plan.otus.created(),
            self.plan.otus.unclaimed().len()
        );
        Ok(map)
    }

    fn merge_characters(&mut self) -> Result<(), ModelError> {
        let mut columns: Vec<CharacterKey> = Vec::with_capacity(self.plan.characters.pairs().len());
        for (in_key, stored_key) in self.plan.characters.pairs() {
            let source = self
                .incoming
                .character(*in_key)
                .ok_or_else(|| ModelError::unknown_key(in_key))?;
            let key = match stored_key {
                Some(key) => {
                    let target = self
                        .work
                        .character_mut(*key)
                        .ok_or_else(|| ModelError::unknown_key(key))?;
                    target.set_label(source.label());
                    target.replace_states(source.states().cloned());
                    if let (None, Some(p)) = (target.ppod_id(), source.ppod_id()) {
                        target.set_ppod_id(p);
                        target.meta_mut().mark_changed();
                    }
                    *key
                }
                None => {
                    let mut character = Character::new(source.label());
                    character.replace_states(source.states().cloned());
                    if let Some(p) = source.ppod_id() {
                        character.set_ppod_id(p);
                    }
                    self.work.add_character(character)?
                }
            };
            columns.push(key);
        }
        self.work.set_columns(&columns)?;
        tracing::debug!(
            "merged columns: {} total, {} created, {} removed",
            columns.len(),
            self.plan.characters.created(),
            self.plan.characters.unclaimed().len()
        );
        Ok(())
    }

    fn merge_rows(
        &mut self,
        otu_map: &HashMap<OtuKey, OtuKey>,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let mut kept = HashSet::new();
        for (in_otu, in_row) in self.incoming.rows_in_otu_order() {
            cancel.check()?;
            let otu = *otu_map
                .get(&in_otu)
                .ok_or_else(|| ModelError::unknown_key(in_otu))?;
            let row = self
                .incoming
                .row(in_row)
                .ok_or_else(|| ModelError::unknown_key(in_row))?;
            self.work.put_row(otu)?;

            let mut changed = 0usize;
            for (column, cell_key) in row.cells().iter().enumerate() {
                let value = self
                    .incoming
                    .cell(*cell_key)
                    .and_then(|c| c.value().cloned())
                    .unwrap_or_else(CellValue::unassigned);
                if self.work.set_cell_value(otu, column, &value)? {
                    changed += 1;
                }
            }
            tracing::trace!("row {}: {} cells changed", self.work.row_path(otu), changed);
            kept.insert(otu);
        }

        let dropped: Vec<OtuKey> = self
            .work
            .rows_in_otu_order()
            .into_iter()
            .map(|(otu, _)| otu)
            .filter(|otu| !kept.contains(otu))
            .collect();
        for otu in dropped {
            self.work.remove_row(otu)?;
        }
        Ok(())
    }

    fn merge_headers(&mut self) {
        let (source, target) = (self.incoming.otu_set(), self.work.otu_set_mut());
        target.set_label(source.label());
        target.set_description(source.description().map(str::to_string));
        if let (None, Some(p)) = (target.ppod_id(), source.ppod_id()) {
            target.set_ppod_id(p);
            target.meta_mut().mark_changed();
        }

        let (source, target) = (self.incoming.matrix(), self.work.matrix_mut());
        target.set_label(source.label());
        target.set_description(source.description().map(str::to_string));
        if let (None, Some(p)) = (target.ppod_id(), source.ppod_id()) {
            target.set_ppod_id(p);
            target.meta_mut().mark_changed();
        }
    }

    fn new_ppod_id(&self, is_new: bool, current: Option<PPodId>) -> Option<PPodId> {
        (self.config.assign_ppod_ids && is_new && current.is_none()).then(PPodId::new)
    }

    fn settle_versions(&mut self) {
        let (repository, pending) = (self.repository, self.pending);

        // Cells, then their row.
        for (_, row_key) in self.work.rows_in_otu_order() {
            let cells = self
                .work
                .row(row_key)
                .map(|r| r.cells().to_vec())
                .unwrap_or_default();
            for cell_key in cells {
                if let Some(cell) = self.work.cell_mut(cell_key) {
                    settle(cell.meta_mut(), false, repository, pending);
                }
            }

            let children_changed =
                self.stored.row_fingerprint(row_key) != self.work.row_fingerprint(row_key);
            if let Some(row) = self.work.row_mut(row_key) {
                settle(row.meta_mut(), children_changed, repository, pending);
            }
        }

        // OTUs, then the OTU set.
        let otus: Vec<OtuKey> = self.work.otu_set().keys().collect();
        for key in otus {
            let Some(otu) = self.work.otu_set().get(key) else {
                continue;
            };
            let ppod_id = self.new_ppod_id(otu.meta().is_new(), otu.ppod_id());
            if let Some(otu) = self.work.otu_set_mut().get_mut(key) {
                if let Some(p) = ppod_id {
                    otu.set_ppod_id(p);
                }
                settle(otu.meta_mut(), false, repository, pending);
            }
        }
        let children_changed = self.stored.otu_set_fingerprint() != self.work.otu_set_fingerprint();
        let set = self.work.otu_set();
        let ppod_id = self.new_ppod_id(set.meta().is_new(), set.ppod_id());
        let set = self.work.otu_set_mut();
        if let Some(p) = ppod_id {
            set.set_ppod_id(p);
        }
        settle(set.meta_mut(), children_changed, repository, pending);

        // Characters and their columns.
        let characters: Vec<CharacterKey> = self.work.matrix().characters().collect();
        for (index, key) in characters.into_iter().enumerate() {
            let Some(character) = self.work.character(key) else {
                continue;
            };
            let ppod_id = self.new_ppod_id(character.meta().is_new(), character.ppod_id());
            let mut character_changed = false;
            if let Some(character) = self.work.character_mut(key) {
                if let Some(p) = ppod_id {
                    character.set_ppod_id(p);
                }
                character_changed = settle(character.meta_mut(), false, repository, pending);
            }
            if let Some(column) = self.work.matrix_mut().column_mut(index) {
                if character_changed || column.is_changed() || column.version().is_none() {
                    column.assign_version(pending.get());
                }
            }
        }

        // The matrix.
        let children_changed = self.stored.matrix_fingerprint() != self.work.matrix_fingerprint();
        let matrix = self.work.matrix();
        let ppod_id = self.new_ppod_id(matrix.meta().is_new(), matrix.ppod_id());
        let matrix = self.work.matrix_mut();
        if let Some(p) = ppod_id {
            matrix.set_ppod_id(p);
        }
        settle(matrix.meta_mut(), children_changed, repository, pending);
    }
}

/// Give `meta` an identity and/or the save's version as needed
///
/// Returns whether the entity received the save's version.
fn settle<R: MatrixRepository + ?Sized>(
    meta: &mut Versioned,
    children_changed: bool,
    repository: &R,
    pending: &PendingVersion<'_>,
) -> bool {
    if meta.is_new() {
        meta.assign_id(repository.next_identity());
        meta.assign_version(pending.get());
        true
    } else if children_changed || meta.needs_new_version() {
        meta.assign_version(pending.get());
        true
    } else {
        false
    }
}
