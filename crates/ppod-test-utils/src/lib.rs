//! Testing utilities for the pPod workspace
//!
//! Shared fixtures, graph snapshots and test logging.

#![allow(missing_docs)]

use anyhow::Context;
use once_cell::sync::OnceCell;
use ppod_model::{
    CellType, Character, EntityId, MatrixGraph, ModelError, VersionStamp,
};
use std::collections::BTreeMap;

/// Install a fmt subscriber honoring `RUST_LOG`, once per test binary
pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn binary_character(label: &str) -> Character {
    Character::new(label)
        .with_state(0, "absent")
        .with_state(1, "present")
}

pub fn multistate_character(label: &str, states: u16) -> Character {
    (0..states).fold(Character::new(label), |c, n| c.with_state(n, format!("state {n}")))
}

/// Three apes, three characters, one cell of every assigned type
///
/// | OTU | tail | hair | molars |
/// |---|---|---|---|
/// | Homo_sapiens | 0 | 1 | {0,1} polymorphic |
/// | Pan_troglodytes | 0 | 1 | 2 |
/// | Gorilla_gorilla | 0 | {0,1} uncertain | inapplicable |
pub fn primate_matrix() -> anyhow::Result<MatrixGraph> {
    let mut graph = MatrixGraph::new("primates");
    graph.matrix_mut().set_description(Some("fixture".to_string()));

    let homo = graph.add_otu("Homo_sapiens")?;
    let pan = graph.add_otu("Pan_troglodytes")?;
    let gorilla = graph.add_otu("Gorilla_gorilla")?;
    graph.add_character(binary_character("tail"))?;
    graph.add_character(binary_character("hair"))?;
    graph.add_character(multistate_character("molars", 3))?;
    for otu in [homo, pan, gorilla] {
        graph.put_row(otu)?;
    }

    let cells: [(_, usize, CellType, &[u16]); 9] = [
        (homo, 0, CellType::Single, &[0]),
        (homo, 1, CellType::Single, &[1]),
        (homo, 2, CellType::Polymorphic, &[0, 1]),
        (pan, 0, CellType::Single, &[0]),
        (pan, 1, CellType::Single, &[1]),
        (pan, 2, CellType::Single, &[2]),
        (gorilla, 0, CellType::Single, &[0]),
        (gorilla, 1, CellType::Uncertain, &[0, 1]),
        (gorilla, 2, CellType::Inapplicable, &[]),
    ];
    for (otu, column, cell_type, states) in cells {
        graph
            .set_cell(otu, column, cell_type, states.iter().copied())
            .with_context(|| format!("fixture cell {}", graph.cell_path(otu, column)))?;
    }
    Ok(graph)
}

/// Copy of `graph` with labels, order and values only
///
/// Identities, pPod ids and versions are dropped, as a client that only
/// knows labels would submit it.
pub fn strip_identities(graph: &MatrixGraph) -> Result<MatrixGraph, ModelError> {
    let mut out = MatrixGraph::new(graph.matrix().label());
    out.matrix_mut()
        .set_description(graph.matrix().description().map(str::to_string));
    out.otu_set_mut().set_label(graph.otu_set().label());
    out.otu_set_mut()
        .set_description(graph.otu_set().description().map(str::to_string));

    let mut otus = BTreeMap::new();
    for (key, otu) in graph.otu_set().iter() {
        otus.insert(key, out.add_otu(otu.label())?);
    }
    for (_, character) in graph.columns() {
        let mut copy = Character::new(character.label());
        copy.replace_states(character.states().cloned());
        out.add_character(copy)?;
    }
    for (otu, row_key) in graph.rows_in_otu_order() {
        let Some(&target) = otus.get(&otu) else {
            continue;
        };
        out.put_row(target)?;
        let Some(row) = graph.row(row_key) else {
            continue;
        };
        for (column, cell_key) in row.cells().iter().enumerate() {
            if let Some(value) = graph.cell(*cell_key).and_then(|c| c.value()) {
                out.set_cell_value(target, column, value)?;
            }
        }
    }
    Ok(out)
}

/// `path → (identity, stamp)` for every entity, for before/after comparisons
pub fn snapshot(graph: &MatrixGraph) -> BTreeMap<String, (Option<EntityId>, Option<VersionStamp>)> {
    graph
        .entities()
        .into_iter()
        .map(|e| (e.path.to_string(), (e.id, e.stamp)))
        .collect()
}
