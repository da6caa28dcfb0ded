//! Reconciliation Tests
//!
//! End-to-end saves through the engine and the in-memory store.

use pretty_assertions::assert_eq;
use ppod_model::{
    AtomicStampAllocator, CellType, CharacterKey, CharacterState, EntityId, EntityKind,
    EntityPath, MatrixGraph, ModelError, OtuKey, StampSource, VersionInfo, VersionStamp,
};
use ppod_reconcile::{
    CancellationToken, MatchPolicy, ReconcileConfig, ReconcileEngine, ReconcileError,
};
use ppod_store::{InMemoryMatrixStore, MatrixRepository};
use ppod_test_utils::{binary_character, init_tracing, primate_matrix, snapshot, strip_identities};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

type Engine = ReconcileEngine<InMemoryMatrixStore>;

fn setup() -> (Arc<InMemoryMatrixStore>, Engine) {
    init_tracing();
    let store = Arc::new(InMemoryMatrixStore::new());
    let engine = ReconcileEngine::new(Arc::clone(&store), Arc::new(AtomicStampAllocator::new()));
    (store, engine)
}

/// Save the primate fixture and return its identity
fn saved_primates(engine: &Engine) -> anyhow::Result<EntityId> {
    Ok(engine.reconcile(&primate_matrix()?, None)?.report.matrix_id())
}

fn otu(graph: &MatrixGraph, label: &str) -> OtuKey {
    graph.otu_set().find_by_label(label).unwrap()
}

fn column_versions(graph: &MatrixGraph) -> BTreeMap<String, Option<VersionStamp>> {
    graph
        .columns()
        .zip(graph.matrix().columns())
        .map(|((_, c), col)| (c.label().to_string(), col.version().map(|v| v.stamp())))
        .collect()
}

fn character(graph: &MatrixGraph, label: &str) -> CharacterKey {
    graph
        .columns()
        .find(|(_, c)| c.label() == label)
        .map(|(k, _)| k)
        .unwrap()
}

/// Kinds of the entities, present on both sides, whose stamp moved
///
/// Compared by identity, so relabels do not show up as remove plus create.
fn bumped_kinds(before: &MatrixGraph, after: &MatrixGraph) -> Vec<EntityKind> {
    let old: BTreeMap<EntityId, Option<VersionStamp>> = before
        .entities()
        .into_iter()
        .filter_map(|e| Some((e.id?, e.stamp)))
        .collect();
    let mut kinds: Vec<EntityKind> = after
        .entities()
        .into_iter()
        .filter(|e| e.id.and_then(|id| old.get(&id)).is_some_and(|s| *s != e.stamp))
        .map(|e| e.kind)
        .collect();
    kinds.sort();
    kinds
}

fn stamps(entries: &[(&str, u64)]) -> BTreeMap<String, Option<VersionStamp>> {
    entries
        .iter()
        .map(|(label, stamp)| ((*label).to_string(), Some(VersionStamp::new(*stamp))))
        .collect()
}

/// Allocator that trips a cancel flag from inside the allocation it serves
#[derive(Default)]
struct CancelOnStamp {
    inner: AtomicStampAllocator,
    armed: Mutex<Option<CancellationToken>>,
}

impl StampSource for CancelOnStamp {
    fn next_version_stamp(&self) -> VersionInfo {
        if let Some(token) = self.armed.lock().unwrap().take() {
            token.cancel();
        }
        self.inner.next_version_stamp()
    }

    fn last_issued(&self) -> Option<VersionStamp> {
        self.inner.last_issued()
    }
}

#[test]
fn first_save_creates_everything_with_one_stamp() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let outcome = engine.reconcile(&primate_matrix()?, None)?;
    let report = &outcome.report;

    assert_eq!(report.stamp().map(|v| v.stamp()), Some(VersionStamp::new(1)));
    assert_eq!(report.created_count(EntityKind::Matrix), 1);
    assert_eq!(report.created_count(EntityKind::OtuSet), 1);
    assert_eq!(report.created_count(EntityKind::Otu), 3);
    assert_eq!(report.created_count(EntityKind::Character), 3);
    assert_eq!(report.created_count(EntityKind::Row), 3);
    assert_eq!(report.created_count(EntityKind::Cell), 9);
    assert!(report.updated().is_empty());
    assert!(report.removed().is_empty());

    let ids: HashSet<_> = outcome.graph.entities().iter().filter_map(|e| e.id).collect();
    assert_eq!(ids.len(), 20);
    assert_eq!(store.load_matrix(report.matrix_id())?, outcome.graph);
    Ok(())
}

#[test]
fn resubmitting_the_loaded_graph_changes_nothing() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let outcome = engine.reconcile(&before, Some(id))?;

    assert!(outcome.report.is_noop());
    assert_eq!(outcome.report.stamp(), None);
    assert_eq!(outcome.report.unchanged().len(), 20);
    assert_eq!(engine.stamps().last_issued(), Some(VersionStamp::new(1)));
    assert_eq!(snapshot(&outcome.graph), snapshot(&before));
    assert_eq!(store.load_matrix(id)?, before);
    Ok(())
}

#[test]
fn one_cell_change_bumps_only_its_path() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let mut edited = before.clone();
    let pan = otu(&edited, "Pan_troglodytes");
    edited.set_cell(pan, 2, CellType::Polymorphic, [1, 2])?;
    let outcome = engine.reconcile(&edited, Some(id))?;

    let v2 = Some(VersionStamp::new(2));
    assert_eq!(outcome.report.stamp().map(|v| v.stamp()), v2);
    let changed: HashSet<String> = [
        EntityPath::matrix(),
        EntityPath::row("Pan_troglodytes"),
        EntityPath::cell("Pan_troglodytes", 2),
    ]
    .iter()
    .map(ToString::to_string)
    .collect();

    let (old, new) = (snapshot(&before), snapshot(&outcome.graph));
    assert_eq!(old.keys().collect::<Vec<_>>(), new.keys().collect::<Vec<_>>());
    for (path, (id, stamp)) in &new {
        assert_eq!(*id, old[path].0, "identity of {path}");
        if changed.contains(path) {
            assert_eq!(*stamp, v2, "stamp of {path}");
        } else {
            assert_eq!(*stamp, old[path].1, "stamp of {path}");
        }
    }

    let columns = column_versions(&outcome.graph);
    assert_eq!(columns["molars"], v2);
    assert_eq!(columns["tail"], Some(VersionStamp::new(1)));
    assert_eq!(outcome.graph.matrix().label(), "primates");
    assert!(outcome.report.was_updated(&EntityPath::cell("Pan_troglodytes", 2)));
    Ok(())
}

#[test]
fn dropped_otu_takes_its_row_and_cells() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;

    let mut edited = store.load_matrix(id)?;
    let gorilla = otu(&edited, "Gorilla_gorilla");
    edited.remove_otu_and_row(gorilla)?;
    let outcome = engine.reconcile(&edited, Some(id))?;
    let report = &outcome.report;

    assert_eq!(report.removed_count(EntityKind::Otu), 1);
    assert_eq!(report.removed_count(EntityKind::Row), 1);
    assert_eq!(report.removed_count(EntityKind::Cell), 3);
    assert_eq!(report.updated_count(EntityKind::OtuSet), 1);
    assert_eq!(report.updated_count(EntityKind::Matrix), 1);
    assert_eq!(report.updated_count(EntityKind::Row), 0);

    let stored = store.load_matrix(id)?;
    stored.check_invariants()?;
    assert_eq!(stored.otu_set().len(), 2);
    assert_eq!(stored.cell_count(), 6);
    Ok(())
}

#[test]
fn missing_row_removes_row_but_keeps_otu() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;

    let mut edited = store.load_matrix(id)?;
    let gorilla = otu(&edited, "Gorilla_gorilla");
    edited.remove_row(gorilla)?;
    let report = engine.reconcile(&edited, Some(id))?.report;

    assert_eq!(report.removed_count(EntityKind::Row), 1);
    assert_eq!(report.removed_count(EntityKind::Cell), 3);
    assert_eq!(report.removed_count(EntityKind::Otu), 0);
    assert_eq!(report.updated_count(EntityKind::OtuSet), 0);
    assert_eq!(report.updated_count(EntityKind::Matrix), 1);
    assert!(store.load_matrix(id)?.otu_set().find_by_label("Gorilla_gorilla").is_some());
    Ok(())
}

#[test]
fn column_reorder_keeps_cells_and_column_versions() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let mut edited = before.clone();
    let mut order: Vec<CharacterKey> = edited.matrix().characters().collect();
    order.reverse();
    edited.set_columns(&order)?;
    let outcome = engine.reconcile(&edited, Some(id))?;

    let cells = |g: &MatrixGraph| -> BTreeMap<_, _> {
        g.entities()
            .into_iter()
            .filter(|e| e.kind == EntityKind::Cell)
            .map(|e| (e.id, e.stamp))
            .collect()
    };
    assert_eq!(cells(&outcome.graph), cells(&before));
    assert_eq!(column_versions(&outcome.graph), column_versions(&before));

    let report = &outcome.report;
    assert_eq!(report.updated_count(EntityKind::Matrix), 1);
    assert_eq!(report.updated_count(EntityKind::Row), 3);
    assert_eq!(report.updated_count(EntityKind::Cell), 0);
    assert_eq!(report.updated_count(EntityKind::Character), 0);

    let labels: Vec<_> = outcome.graph.columns().map(|(_, c)| c.label().to_string()).collect();
    assert_eq!(labels, vec!["molars", "hair", "tail"]);
    Ok(())
}

#[test]
fn added_character_creates_unassigned_column() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;

    let mut edited = store.load_matrix(id)?;
    edited.add_character(binary_character("claws"))?;
    let outcome = engine.reconcile(&edited, Some(id))?;
    let report = &outcome.report;

    assert_eq!(report.created_count(EntityKind::Character), 1);
    assert_eq!(report.created_count(EntityKind::Cell), 3);
    assert_eq!(report.updated_count(EntityKind::Row), 3);
    assert_eq!(report.updated_count(EntityKind::Cell), 0);

    let homo = otu(&outcome.graph, "Homo_sapiens");
    assert_eq!(
        outcome.graph.cell_at(homo, 3).map(|c| c.cell_type()),
        Some(CellType::Unassigned)
    );
    Ok(())
}

#[test]
fn identity_less_resubmission_matches_by_label_and_position() -> anyhow::Result<()> {
    for policy in [MatchPolicy::Label, MatchPolicy::Position] {
        init_tracing();
        let store = Arc::new(InMemoryMatrixStore::new());
        let engine = ReconcileEngine::new(Arc::clone(&store), Arc::new(AtomicStampAllocator::new()))
            .with_config(ReconcileConfig::new().with_matching(policy));
        let id = saved_primates(&engine)?;
        let before = store.load_matrix(id)?;

        let outcome = engine.reconcile(&strip_identities(&before)?, Some(id))?;

        assert!(outcome.report.created().is_empty(), "{policy:?}");
        assert!(outcome.report.is_noop(), "{policy:?}");
        assert_eq!(snapshot(&outcome.graph), snapshot(&before));
    }
    Ok(())
}

#[test]
fn label_matching_follows_a_reordered_otu_set() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let mut incoming = strip_identities(&before)?;
    let mut order: Vec<OtuKey> = incoming.otu_set().keys().collect();
    order.reverse();
    incoming.set_otu_order(&order)?;
    let outcome = engine.reconcile(&incoming, Some(id))?;

    assert!(outcome.report.created().is_empty());
    assert_eq!(outcome.report.updated_count(EntityKind::OtuSet), 1);
    assert_eq!(outcome.report.updated_count(EntityKind::Otu), 0);
    let first = outcome.graph.otu_set().iter().next().map(|(_, o)| o.label().to_string());
    assert_eq!(first.as_deref(), Some("Gorilla_gorilla"));
    for label in ["Homo_sapiens", "Pan_troglodytes", "Gorilla_gorilla"] {
        let path = EntityPath::otu(label).to_string();
        assert_eq!(snapshot(&outcome.graph)[&path], snapshot(&before)[&path]);
    }
    Ok(())
}

#[test]
fn toml_configured_no_matching_replaces_otus() -> anyhow::Result<()> {
    init_tracing();
    let store = Arc::new(InMemoryMatrixStore::new());
    let config = ReconcileConfig::from_toml_str(r#"otu_matching = "none""#)?;
    let engine = ReconcileEngine::new(Arc::clone(&store), Arc::new(AtomicStampAllocator::new()))
        .with_config(config);
    let id = saved_primates(&engine)?;

    let incoming = strip_identities(&store.load_matrix(id)?)?;
    let report = engine.reconcile(&incoming, Some(id))?.report;

    assert_eq!(report.created_count(EntityKind::Otu), 3);
    assert_eq!(report.removed_count(EntityKind::Otu), 3);
    assert_eq!(report.created_count(EntityKind::Row), 3);
    assert_eq!(report.removed_count(EntityKind::Cell), 9);
    assert_eq!(report.created_count(EntityKind::Character), 0);
    Ok(())
}

#[test]
fn invalid_cell_leaves_store_and_allocator_untouched() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let mut edited = before.clone();
    let molars = edited.matrix().characters().nth(2).unwrap();
    edited.character_mut(molars).unwrap().remove_state(2);
    let err = engine.reconcile(&edited, Some(id)).unwrap_err();

    assert!(err.is_validation());
    assert!(matches!(err, ReconcileError::Model(ModelError::InvalidCellState { .. })));
    assert_eq!(err.path(), Some(&EntityPath::cell("Pan_troglodytes", 2)));
    assert_eq!(store.load_matrix(id)?, before);
    assert_eq!(engine.stamps().last_issued(), Some(VersionStamp::new(1)));
    Ok(())
}

#[test]
fn unknown_otu_identity_is_a_structural_mismatch() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;

    let mut incoming = strip_identities(&store.load_matrix(id)?)?;
    let homo = otu(&incoming, "Homo_sapiens");
    incoming
        .otu_set_mut()
        .get_mut(homo)
        .unwrap()
        .meta_mut()
        .assign_id(EntityId::new(9_999));
    let err = engine.reconcile(&incoming, Some(id)).unwrap_err();

    assert!(matches!(err, ReconcileError::Model(ModelError::StructuralMismatch { .. })));
    assert_eq!(err.path(), Some(&EntityPath::otu("Homo_sapiens")));
    assert_eq!(engine.stamps().last_issued(), Some(VersionStamp::new(1)));
    Ok(())
}

#[test]
fn unknown_matrix_is_not_found() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let err = engine
        .reconcile(&primate_matrix()?, Some(EntityId::new(42)))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(store.is_empty());
    Ok(())
}

#[test]
fn cancelled_save_is_not_committed() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let mut edited = before.clone();
    let homo = otu(&edited, "Homo_sapiens");
    edited.set_cell(homo, 0, CellType::Single, [1])?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine.reconcile_with_cancel(&edited, Some(id), &cancel).unwrap_err();
    assert_eq!(err, ReconcileError::Cancelled);
    assert_eq!(store.load_matrix(id)?, before);

    // The same edit goes through without the flag.
    let outcome = engine.reconcile(&edited, Some(id))?;
    assert_eq!(outcome.report.updated_count(EntityKind::Cell), 1);
    Ok(())
}

#[test]
fn report_serializes_to_json() -> anyhow::Result<()> {
    let (_, engine) = setup();
    let report = engine.reconcile(&primate_matrix()?, None)?.report;
    let json = serde_json::to_value(&report)?;
    assert_eq!(json["created"].as_array().map(Vec::len), Some(20));
    assert_eq!(json["removed"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn independent_matrices_reconcile_concurrently() -> anyhow::Result<()> {
    let (store, engine) = setup();

    let ids: Vec<EntityId> = (0..8)
        .into_par_iter()
        .map(|i| -> anyhow::Result<EntityId> {
            let mut graph = primate_matrix()?;
            graph.matrix_mut().set_label(format!("primates {i}"));
            let id = engine.reconcile(&graph, None)?.report.matrix_id();

            let mut edited = store.load_matrix(id)?;
            let homo = otu(&edited, "Homo_sapiens");
            edited.set_cell(homo, 0, CellType::Single, [1])?;
            engine.reconcile(&edited, Some(id))?;
            Ok(id)
        })
        .collect::<anyhow::Result<_>>()?;

    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 8);
    assert_eq!(store.len(), 8);
    assert_eq!(engine.stamps().last_issued(), Some(VersionStamp::new(16)));
    assert_eq!(store.highest_stamp(), Some(VersionStamp::new(16)));
    Ok(())
}

#[test]
fn saves_of_one_matrix_are_serialized() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let base = store.load_matrix(id)?;

    // Each thread edits a different OTU's tail from the same base.
    ["Homo_sapiens", "Pan_troglodytes", "Gorilla_gorilla"]
        .par_iter()
        .try_for_each(|label| -> anyhow::Result<()> {
            let mut edited = base.clone();
            let key = otu(&edited, label);
            edited.set_cell(key, 0, CellType::Single, [1])?;
            engine.reconcile(&edited, Some(id))?;
            Ok(())
        })?;

    let stored = store.load_matrix(id)?;
    stored.check_invariants()?;
    assert_eq!(engine.stamps().last_issued(), Some(VersionStamp::new(4)));
    assert_eq!(stored.matrix().meta().stamp(), Some(VersionStamp::new(4)));
    Ok(())
}

#[test]
fn character_relabel_bumps_character_column_and_matrix() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let mut edited = before.clone();
    let hair = character(&edited, "hair");
    edited.character_mut(hair).unwrap().set_label("pelage");
    let outcome = engine.reconcile(&edited, Some(id))?;

    assert_eq!(
        bumped_kinds(&before, &outcome.graph),
        vec![EntityKind::Matrix, EntityKind::Character]
    );
    assert!(outcome.report.created().is_empty());
    assert!(outcome.report.removed().is_empty());
    assert!(outcome.report.was_updated(&EntityPath::character("pelage")));
    assert_eq!(
        column_versions(&outcome.graph),
        stamps(&[("tail", 1), ("pelage", 2), ("molars", 1)])
    );
    assert_eq!(store.load_matrix(id)?, outcome.graph);
    Ok(())
}

#[test]
fn new_character_state_bumps_character_column_and_matrix() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let mut edited = before.clone();
    let hair = character(&edited, "hair");
    edited
        .character_mut(hair)
        .unwrap()
        .put_state(CharacterState::new(2, "tufted"));
    let outcome = engine.reconcile(&edited, Some(id))?;

    assert_eq!(
        bumped_kinds(&before, &outcome.graph),
        vec![EntityKind::Matrix, EntityKind::Character]
    );
    assert_eq!(
        column_versions(&outcome.graph),
        stamps(&[("tail", 1), ("hair", 2), ("molars", 1)])
    );
    let stored = store.load_matrix(id)?;
    let hair = character(&stored, "hair");
    assert_eq!(stored.character(hair).map(|c| c.state_count()), Some(3));

    // Using the new state is a cell edit on top of it.
    let mut edited = stored.clone();
    let pan = otu(&edited, "Pan_troglodytes");
    edited.set_cell(pan, 1, CellType::Single, [2])?;
    let outcome = engine.reconcile(&edited, Some(id))?;
    assert_eq!(
        bumped_kinds(&stored, &outcome.graph),
        vec![EntityKind::Matrix, EntityKind::Row, EntityKind::Cell]
    );
    Ok(())
}

#[test]
fn matrix_header_change_bumps_only_the_matrix() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let mut edited = before.clone();
    edited.matrix_mut().set_label("apes");
    let outcome = engine.reconcile(&edited, Some(id))?;
    assert_eq!(bumped_kinds(&before, &outcome.graph), vec![EntityKind::Matrix]);
    assert_eq!(
        column_versions(&outcome.graph),
        stamps(&[("tail", 1), ("hair", 1), ("molars", 1)])
    );

    let relabeled = store.load_matrix(id)?;
    let mut edited = relabeled.clone();
    edited.matrix_mut().set_description(None);
    let outcome = engine.reconcile(&edited, Some(id))?;
    assert_eq!(bumped_kinds(&relabeled, &outcome.graph), vec![EntityKind::Matrix]);
    assert_eq!(outcome.graph.matrix().label(), "apes");
    assert_eq!(outcome.graph.matrix().description(), None);
    assert_eq!(
        outcome.graph.matrix().meta().stamp(),
        Some(VersionStamp::new(3))
    );
    Ok(())
}

#[test]
fn otu_set_header_change_bumps_set_and_matrix() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let mut edited = before.clone();
    edited.otu_set_mut().set_label("hominids");
    edited
        .otu_set_mut()
        .set_description(Some("great apes".to_string()));
    let outcome = engine.reconcile(&edited, Some(id))?;

    assert_eq!(
        bumped_kinds(&before, &outcome.graph),
        vec![EntityKind::Matrix, EntityKind::OtuSet]
    );
    assert_eq!(outcome.report.updated().len(), 2);
    let stored = store.load_matrix(id)?;
    assert_eq!(stored.otu_set().label(), "hominids");
    assert_eq!(stored.otu_set().description(), Some("great apes"));
    Ok(())
}

#[test]
fn otu_relabel_keeps_row_and_cell_stamps() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;

    let mut edited = before.clone();
    let homo = otu(&edited, "Homo_sapiens");
    edited.set_otu_label(homo, "Homo_neanderthalensis")?;
    let outcome = engine.reconcile(&edited, Some(id))?;

    assert_eq!(
        bumped_kinds(&before, &outcome.graph),
        vec![EntityKind::Matrix, EntityKind::OtuSet, EntityKind::Otu]
    );
    assert!(outcome.report.created().is_empty());
    assert!(outcome.report.removed().is_empty());
    assert!(outcome.report.was_updated(&EntityPath::otu("Homo_neanderthalensis")));

    let renamed = otu(&outcome.graph, "Homo_neanderthalensis");
    assert_eq!(
        outcome.graph.row_for(renamed).and_then(|r| r.meta().stamp()),
        Some(VersionStamp::new(1))
    );
    Ok(())
}

#[test]
fn renamed_otu_keeps_identity_through_its_ppod_id() -> anyhow::Result<()> {
    let (store, engine) = setup();
    let id = saved_primates(&engine)?;
    let before = store.load_matrix(id)?;
    let stored_homo = before.otu_set().get(otu(&before, "Homo_sapiens")).unwrap();
    let ppod_id = stored_homo.ppod_id().unwrap();
    let homo_id = stored_homo.meta().id();

    // A label-only client renames the OTU but carries its pPod id.
    let mut incoming = strip_identities(&before)?;
    let homo = otu(&incoming, "Homo_sapiens");
    incoming.set_otu_label(homo, "Homo_neanderthalensis")?;
    incoming.otu_set_mut().get_mut(homo).unwrap().set_ppod_id(ppod_id);
    let outcome = engine.reconcile(&incoming, Some(id))?;

    assert_eq!(outcome.report.created_count(EntityKind::Otu), 0);
    assert_eq!(outcome.report.removed_count(EntityKind::Otu), 0);
    assert_eq!(outcome.report.created_count(EntityKind::Row), 0);
    assert_eq!(
        bumped_kinds(&before, &outcome.graph),
        vec![EntityKind::Matrix, EntityKind::OtuSet, EntityKind::Otu]
    );

    let renamed = outcome.graph.otu_set().get(otu(&outcome.graph, "Homo_neanderthalensis"));
    assert_eq!(renamed.and_then(|o| o.meta().id()), homo_id);
    assert_eq!(renamed.and_then(|o| o.ppod_id()), Some(ppod_id));
    assert_eq!(
        renamed.and_then(|o| o.meta().stamp()),
        Some(VersionStamp::new(2))
    );
    Ok(())
}

#[test]
fn cancel_during_versioning_commits_and_wastes_no_stamp() -> anyhow::Result<()> {
    init_tracing();
    let store = Arc::new(InMemoryMatrixStore::new());
    let allocator = Arc::new(CancelOnStamp::default());
    let engine = ReconcileEngine::new(Arc::clone(&store), Arc::clone(&allocator));
    let id = engine.reconcile(&primate_matrix()?, None)?.report.matrix_id();

    let mut edited = store.load_matrix(id)?;
    let homo = otu(&edited, "Homo_sapiens");
    edited.set_cell(homo, 0, CellType::Single, [1])?;

    // Past the last cancellation point the save runs to commit.
    let cancel = CancellationToken::new();
    *allocator.armed.lock().unwrap() = Some(cancel.clone());
    let outcome = engine.reconcile_with_cancel(&edited, Some(id), &cancel)?;
    assert!(cancel.is_cancelled());
    assert_eq!(outcome.report.stamp().map(|v| v.stamp()), Some(VersionStamp::new(2)));
    assert_eq!(store.load_matrix(id)?, outcome.graph);
    assert_eq!(engine.stamps().last_issued(), Some(VersionStamp::new(2)));

    // With the flag already up, the next save stops before any stamp is taken.
    let committed = store.load_matrix(id)?;
    let mut edited = committed.clone();
    let homo = otu(&edited, "Homo_sapiens");
    edited.set_cell(homo, 0, CellType::Single, [0])?;
    let err = engine.reconcile_with_cancel(&edited, Some(id), &cancel).unwrap_err();
    assert_eq!(err, ReconcileError::Cancelled);
    assert_eq!(engine.stamps().last_issued(), Some(VersionStamp::new(2)));
    assert_eq!(store.load_matrix(id)?, committed);
    Ok(())
}
