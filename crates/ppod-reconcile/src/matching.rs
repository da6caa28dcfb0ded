//! Tiered matching of incoming entities to stored ones
//!
//! Each incoming OTU or character is paired with at most one stored entity:
//!
//! 1. by surrogate identity. An identity the stored graph does not know is a
//!    structural mismatch.
//! 2. by pPod id. An unknown pPod id means a new entity that keeps its id.
//! 3. by the configured [`MatchPolicy`], over stored entities not already
//!    claimed by tiers 1 and 2.
//!
//! No stored entity is claimed twice.

use crate::config::{MatchPolicy, ReconcileConfig};
use ppod_model::{
    CharacterKey, EntityId, EntityPath, MatrixGraph, ModelError, OtuKey, PPodId,
};
use std::collections::HashMap;
use std::hash::Hash;

/// What matching looks at on one entity
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a, K> {
    pub(crate) key: K,
    pub(crate) id: Option<EntityId>,
    pub(crate) ppod_id: Option<PPodId>,
    pub(crate) label: &'a str,
}

/// Pairing of one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matches<K> {
    /// `(incoming, stored)` in incoming order; `None` means create
    pairs: Vec<(K, Option<K>)>,
    /// Stored keys no incoming entity claimed, in stored order
    unclaimed: Vec<K>,
}

impl<K: Copy + Eq + Hash> Matches<K> {
    /// Pairs in incoming order
    #[inline]
    #[must_use]
    pub fn pairs(&self) -> &[(K, Option<K>)] {
        &self.pairs
    }

    /// Stored keys that will be removed
    #[inline]
    #[must_use]
    pub fn unclaimed(&self) -> &[K] {
        &self.unclaimed
    }

    /// Stored key matched to `incoming`
    #[must_use]
    pub fn stored_for(&self, incoming: K) -> Option<K> {
        self.pairs
            .iter()
            .find(|(i, _)| *i == incoming)
            .and_then(|(_, s)| *s)
    }

    /// Number of incoming entities with no stored counterpart
    #[must_use]
    pub fn created(&self) -> usize {
        self.pairs.iter().filter(|(_, s)| s.is_none()).count()
    }
}

/// Pairing of both matched collections of a graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlan {
    /// OTU pairing
    pub otus: Matches<OtuKey>,
    /// Character pairing, incoming in column order
    pub characters: Matches<CharacterKey>,
}

impl MatchPlan {
    /// Match `incoming` against `stored`
    ///
    /// # Errors
    /// [`ModelError::StructuralMismatch`] for unknown identities, conflicting
    /// pPod ids, double claims or ambiguous label matches.
    pub fn build(
        incoming: &MatrixGraph,
        stored: &MatrixGraph,
        config: &ReconcileConfig,
    ) -> Result<Self, ModelError> {
        let otus = match_collection(
            &otu_candidates(incoming),
            &otu_candidates(stored),
            config.otu_matching,
            EntityPath::otu,
        )?;
        let characters = match_collection(
            &character_candidates(incoming),
            &character_candidates(stored),
            config.character_matching,
            EntityPath::character,
        )?;
        Ok(Self { otus, characters })
    }
}

fn otu_candidates(graph: &MatrixGraph) -> Vec<Candidate<'_, OtuKey>> {
    graph
        .otu_set()
        .iter()
        .map(|(key, otu)| Candidate {
            key,
            id: otu.meta().id(),
            ppod_id: otu.ppod_id(),
            label: otu.label(),
        })
        .collect()
}

fn character_candidates(graph: &MatrixGraph) -> Vec<Candidate<'_, CharacterKey>> {
    graph
        .columns()
        .map(|(key, c)| Candidate {
            key,
            id: c.meta().id(),
            ppod_id: c.ppod_id(),
            label: c.label(),
        })
        .collect()
}

pub(crate) fn match_collection<K>(
    incoming: &[Candidate<'_, K>],
    stored: &[Candidate<'_, K>],
    policy: MatchPolicy,
    path_of: impl Fn(&str) -> EntityPath,
) -> Result<Matches<K>, ModelError>
where
    K: Copy + Eq + Hash,
{
    let by_id: HashMap<EntityId, usize> = stored
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.id.map(|id| (id, i)))
        .collect();
    let by_ppod: HashMap<PPodId, usize> = stored
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.ppod_id.map(|p| (p, i)))
        .collect();

    let mut claimed_by: Vec<Option<usize>> = vec![None; stored.len()];
    let mut result: Vec<Option<usize>> = vec![None; incoming.len()];

    let mut claim = |slot: usize, stored_idx: usize, claimed_by: &mut [Option<usize>]| {
        if claimed_by[stored_idx].is_some() {
            return Err(ModelError::structural(
                path_of(incoming[slot].label),
                format!(
                    "matches the same stored entity as another incoming entity ('{}')",
                    stored[stored_idx].label
                ),
            ));
        }
        claimed_by[stored_idx] = Some(slot);
        result[slot] = Some(stored_idx);
        Ok(())
    };

    // Tiers 1 and 2.
    for (slot, candidate) in incoming.iter().enumerate() {
        if let Some(id) = candidate.id {
            let stored_idx = *by_id.get(&id).ok_or_else(|| {
                ModelError::structural(
                    path_of(candidate.label),
                    format!("identity {id} is not known to the stored matrix"),
                )
            })?;
            if let (Some(mine), Some(theirs)) = (candidate.ppod_id, stored[stored_idx].ppod_id) {
                if mine != theirs {
                    return Err(ModelError::structural(
                        path_of(candidate.label),
                        format!("identity {id} carries pPod id {theirs}, not {mine}"),
                    ));
                }
            }
            claim(slot, stored_idx, &mut claimed_by)?;
        } else if let Some(stored_idx) = candidate.ppod_id.and_then(|p| by_ppod.get(&p).copied()) {
            claim(slot, stored_idx, &mut claimed_by)?;
        }
    }

    // Tier 3, only for entities carrying neither id.
    for (slot, candidate) in incoming.iter().enumerate() {
        if candidate.id.is_some() || candidate.ppod_id.is_some() {
            continue;
        }
        let found = match policy {
            MatchPolicy::None => None,
            MatchPolicy::Position => stored
                .get(slot)
                .filter(|_| claimed_by[slot].is_none())
                .map(|_| slot),
            MatchPolicy::Label => {
                let mut open = (0..stored.len())
                    .filter(|&i| claimed_by[i].is_none() && stored[i].label == candidate.label);
                let first = open.next();
                if first.is_some() && open.next().is_some() {
                    return Err(ModelError::structural(
                        path_of(candidate.label),
                        "label matches more than one stored entity",
                    ));
                }
                first
            }
        };
        if let Some(stored_idx) = found {
            claim(slot, stored_idx, &mut claimed_by)?;
        }
    }

    let pairs = incoming
        .iter()
        .zip(result)
        .map(|(c, s)| (c.key, s.map(|i| stored[i].key)))
        .collect();
    let unclaimed = stored
        .iter()
        .zip(&claimed_by)
        .filter(|(_, by)| by.is_none())
        .map(|(c, _)| c.key)
        .collect();
    Ok(Matches { pairs, unclaimed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidate(key: u32, id: Option<u64>, label: &str) -> Candidate<'_, OtuKey> {
        Candidate {
            key: OtuKey::new(key),
            id: id.map(EntityId::new),
            ppod_id: None,
            label,
        }
    }

    fn stored() -> Vec<Candidate<'static, OtuKey>> {
        vec![
            candidate(10, Some(1), "Pan"),
            candidate(11, Some(2), "Homo"),
            candidate(12, Some(3), "Gorilla"),
        ]
    }

    #[test]
    fn identity_wins_over_label() {
        let incoming = vec![candidate(0, Some(2), "Pan")];
        let m = match_collection(&incoming, &stored(), MatchPolicy::Label, EntityPath::otu).unwrap();
        assert_eq!(m.pairs(), &[(OtuKey::new(0), Some(OtuKey::new(11)))]);
        assert_eq!(m.unclaimed(), &[OtuKey::new(10), OtuKey::new(12)]);
    }

    #[test]
    fn unknown_identity_is_mismatch() {
        let incoming = vec![candidate(0, Some(99), "Pan")];
        let err =
            match_collection(&incoming, &stored(), MatchPolicy::Label, EntityPath::otu).unwrap_err();
        assert!(matches!(err, ModelError::StructuralMismatch { .. }));
        assert_eq!(err.path(), Some(&EntityPath::otu("Pan")));
    }

    #[test]
    fn label_and_position_policies() {
        let incoming = vec![candidate(0, None, "Homo"), candidate(1, None, "Pan")];

        let by_label =
            match_collection(&incoming, &stored(), MatchPolicy::Label, EntityPath::otu).unwrap();
        assert_eq!(by_label.stored_for(OtuKey::new(0)), Some(OtuKey::new(11)));
        assert_eq!(by_label.stored_for(OtuKey::new(1)), Some(OtuKey::new(10)));

        let by_position =
            match_collection(&incoming, &stored(), MatchPolicy::Position, EntityPath::otu).unwrap();
        assert_eq!(by_position.stored_for(OtuKey::new(0)), Some(OtuKey::new(10)));
        assert_eq!(by_position.stored_for(OtuKey::new(1)), Some(OtuKey::new(11)));

        let none = match_collection(&incoming, &stored(), MatchPolicy::None, EntityPath::otu).unwrap();
        assert_eq!(none.created(), 2);
        assert_eq!(none.unclaimed().len(), 3);
    }

    #[test]
    fn ppod_id_matches_and_unknown_ppod_id_creates() {
        let known = PPodId::new();
        let mut stored = stored();
        stored[2].ppod_id = Some(known);
        let incoming = vec![
            Candidate {
                key: OtuKey::new(0),
                id: None,
                ppod_id: Some(known),
                label: "renamed",
            },
            Candidate {
                key: OtuKey::new(1),
                id: None,
                ppod_id: Some(PPodId::new()),
                label: "Pan",
            },
        ];
        let m = match_collection(&incoming, &stored, MatchPolicy::Label, EntityPath::otu).unwrap();
        assert_eq!(m.stored_for(OtuKey::new(0)), Some(OtuKey::new(12)));
        // Carries a pPod id, so label matching does not apply.
        assert_eq!(m.stored_for(OtuKey::new(1)), None);
    }

    #[test]
    fn double_claim_is_rejected() {
        let incoming = vec![candidate(0, Some(1), "Pan"), candidate(1, Some(1), "Pan2")];
        assert!(match_collection(&incoming, &stored(), MatchPolicy::Label, EntityPath::otu).is_err());
    }

    #[test]
    fn ambiguous_label_is_rejected() {
        let stored = vec![candidate(10, Some(1), "x"), candidate(11, Some(2), "x")];
        let incoming = vec![candidate(0, None, "x")];
        let err =
            match_collection(&incoming, &stored, MatchPolicy::Label, EntityPath::character)
                .unwrap_err();
        assert_eq!(err.path(), Some(&EntityPath::character("x")));
    }

    #[test]
    fn label_skips_entities_claimed_by_identity() {
        let stored = vec![candidate(10, Some(1), "x"), candidate(11, Some(2), "x")];
        let incoming = vec![candidate(0, Some(1), "x"), candidate(1, None, "x")];
        let m = match_collection(&incoming, &stored, MatchPolicy::Label, EntityPath::character)
            .unwrap();
        assert_eq!(m.stored_for(OtuKey::new(1)), Some(OtuKey::new(11)));
    }
}
