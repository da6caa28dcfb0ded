//! Pass 1: validate the incoming graph without touching anything
//!
//! Checks model invariants, incoming identities and matching before a single
//! stamp is allocated. Rows are independent, so with
//! `parallel_validation` they are checked on the rayon pool; the first
//! error in row order is the one reported.

use crate::config::ReconcileConfig;
use crate::matching::MatchPlan;
use ppod_model::{EntityPath, MatrixGraph, ModelError, OtuKey};
use rayon::prelude::*;

/// Validate `incoming` against `stored` and work out the match plan
///
/// # Errors
/// The first [`ModelError`] found.
pub fn validate(
    incoming: &MatrixGraph,
    stored: &MatrixGraph,
    config: &ReconcileConfig,
) -> Result<MatchPlan, ModelError> {
    check_header_identities(incoming, stored)?;
    incoming.check_structure()?;
    check_rows(incoming, config.parallel_validation)?;

    let plan = MatchPlan::build(incoming, stored, config)?;
    check_row_identities(incoming, stored, &plan)?;
    tracing::debug!(
        "validated incoming matrix: {} rows, {} new OTUs, {} new characters",
        incoming.matrix().row_count(),
        plan.otus.created(),
        plan.characters.created()
    );
    Ok(plan)
}

fn check_header_identities(incoming: &MatrixGraph, stored: &MatrixGraph) -> Result<(), ModelError> {
    let (mine, theirs) = (incoming.matrix(), stored.matrix());
    if let Some(id) = mine.meta().id() {
        if theirs.meta().id() != Some(id) {
            return Err(ModelError::structural(
                EntityPath::matrix(),
                format!("identity {id} is not the target matrix"),
            ));
        }
    }
    if let (Some(a), Some(b)) = (mine.ppod_id(), theirs.ppod_id()) {
        if a != b {
            return Err(ModelError::structural(
                EntityPath::matrix(),
                format!("pPod id {a} does not match stored {b}"),
            ));
        }
    }

    let (mine, theirs) = (incoming.otu_set(), stored.otu_set());
    if let Some(id) = mine.meta().id() {
        if theirs.meta().id() != Some(id) {
            return Err(ModelError::structural(
                EntityPath::otu_set(),
                format!("identity {id} is not the matrix's OTU set"),
            ));
        }
    }
    if let (Some(a), Some(b)) = (mine.ppod_id(), theirs.ppod_id()) {
        if a != b {
            return Err(ModelError::structural(
                EntityPath::otu_set(),
                format!("pPod id {a} does not match stored {b}"),
            ));
        }
    }
    Ok(())
}

fn check_rows(incoming: &MatrixGraph, parallel: bool) -> Result<(), ModelError> {
    let otus: Vec<OtuKey> = incoming
        .rows_in_otu_order()
        .into_iter()
        .map(|(otu, _)| otu)
        .collect();
    if parallel {
        let results: Vec<Result<(), ModelError>> =
            otus.par_iter().map(|otu| incoming.check_row(*otu)).collect();
        results.into_iter().collect()
    } else {
        otus.iter().try_for_each(|otu| incoming.check_row(*otu))
    }
}

// Incoming rows and cells that carry an identity must line up with the
// stored entity at the matched position.
fn check_row_identities(
    incoming: &MatrixGraph,
    stored: &MatrixGraph,
    plan: &MatchPlan,
) -> Result<(), ModelError> {
    let stored_columns: Vec<Option<usize>> = incoming
        .matrix()
        .characters()
        .map(|c| {
            plan.characters
                .stored_for(c)
                .and_then(|s| stored.matrix().column_of(s))
        })
        .collect();

    for (otu, row_key) in incoming.rows_in_otu_order() {
        let Some(row) = incoming.row(row_key) else {
            continue;
        };
        let stored_row = plan.otus.stored_for(otu).and_then(|s| stored.row_for(s));

        if let Some(id) = row.meta().id() {
            if stored_row.and_then(|r| r.meta().id()) != Some(id) {
                return Err(ModelError::structural(
                    incoming.row_path(otu),
                    format!("row identity {id} does not belong to this OTU's stored row"),
                ));
            }
        }

        for (column, cell_key) in row.cells().iter().enumerate() {
            let Some(id) = incoming.cell(*cell_key).and_then(|c| c.meta().id()) else {
                continue;
            };
            let stored_id = stored_row
                .zip(stored_columns.get(column).copied().flatten())
                .and_then(|(r, col)| r.cell(col))
                .and_then(|k| stored.cell(k))
                .and_then(|c| c.meta().id());
            if stored_id != Some(id) {
                return Err(ModelError::structural(
                    incoming.cell_path(otu, column),
                    format!("cell identity {id} does not belong to this position"),
                ));
            }
        }
    }
    Ok(())
}
