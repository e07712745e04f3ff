//! Trust penalties for storing parties that failed to serve fragments.
//!
//! Scores live in an external ledger. The adjuster reads them through a
//! [`TrustSource`], computes the penalised value and reports it; writing the
//! new score back is the ledger collaborator's job. A small read-through cache
//! remembers the score the ledger last reported per party so repeated
//! episodes do not re-query it. Penalised scores are not cached.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::availability::MissingFragment;
use crate::error::VaultError;

pub type PartyId = String;
pub type TrustScore = u64;

/// Share of the score a party keeps after one failure episode, in percent.
pub const RETAINED_PERCENT: u128 = 85;

/// Read access to externally maintained trust scores.
pub trait TrustSource {
    /// Current score of `party`. Any failure is reported as
    /// [`VaultError::LedgerUnavailable`].
    fn trust_score(&self, party: &str) -> Result<TrustScore, VaultError>;
}

impl<T: TrustSource + ?Sized> TrustSource for &T {
    fn trust_score(&self, party: &str) -> Result<TrustScore, VaultError> {
        (**self).trust_score(party)
    }
}

/// `floor(score * 0.85)`, never below zero.
pub fn penalize(score: TrustScore) -> TrustScore {
    (score as u128 * RETAINED_PERCENT / 100) as TrustScore
}

/// Which parties hold which fragments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    holders: BTreeMap<u32, Vec<PartyId>>,
}

impl Placement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign fragments `1..=fragment_count` to `nodes` in turn. An empty node
    /// list yields an empty placement.
    pub fn round_robin(nodes: &[PartyId], fragment_count: u32) -> Self {
        let mut placement = Self::new();
        if nodes.is_empty() {
            return placement;
        }
        for fragment_id in 1..=fragment_count {
            let node = &nodes[(fragment_id as usize - 1) % nodes.len()];
            placement.assign(fragment_id, node.clone());
        }
        placement
    }

    pub fn assign(&mut self, fragment_id: u32, party: PartyId) {
        let holders = self.holders.entry(fragment_id).or_default();
        if !holders.contains(&party) {
            holders.push(party);
        }
    }

    pub fn holders(&self, fragment_id: u32) -> &[PartyId] {
        self.holders
            .get(&fragment_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// Distinct parties implicated by a set of missing fragments.
    pub fn implicated<'a>(&'a self, missing: &[MissingFragment]) -> BTreeSet<&'a str> {
        missing
            .iter()
            .flat_map(|fragment| self.holders(fragment.fragment_id))
            .map(String::as_str)
            .collect()
    }
}

/// Computed penalty for one party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAdjustment {
    pub party: PartyId,
    pub old_score: TrustScore,
    pub new_score: TrustScore,
    pub penalty: TrustScore,
}

/// Per-party outcome of an adjustment episode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrustOutcome {
    Adjusted(TrustAdjustment),
    /// No score could be read, so no update is possible.
    Unavailable { party: PartyId, reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustReport {
    pub outcomes: Vec<TrustOutcome>,
}

impl TrustReport {
    pub fn adjusted(&self) -> impl Iterator<Item = &TrustAdjustment> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            TrustOutcome::Adjusted(adjustment) => Some(adjustment),
            TrustOutcome::Unavailable { .. } => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Applies the flat failure penalty and remembers the ledger's scores.
#[derive(Clone, Debug, Default)]
pub struct TrustAdjuster {
    cache: BTreeMap<PartyId, TrustScore>,
}

impl TrustAdjuster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score the ledger last reported for `party`, if any.
    pub fn cached(&self, party: &str) -> Option<TrustScore> {
        self.cache.get(party).copied()
    }

    /// Penalise every party holding one of the `missing` fragments, once per
    /// party regardless of how many of its fragments were unavailable.
    pub fn adjust<S>(
        &mut self,
        source: &S,
        missing: &[MissingFragment],
        placement: &Placement,
    ) -> TrustReport
    where
        S: TrustSource + ?Sized,
    {
        let parties = placement.implicated(missing);
        self.penalize_parties(source, parties)
    }

    /// Penalise an explicit list of parties; duplicates count once.
    pub fn penalize_parties<'p, S, I>(&mut self, source: &S, parties: I) -> TrustReport
    where
        S: TrustSource + ?Sized,
        I: IntoIterator<Item = &'p str>,
    {
        let unique: BTreeSet<&str> = parties.into_iter().collect();
        let mut report = TrustReport::default();
        for party in unique {
            let outcome = match self.current_score(source, party) {
                Ok(old_score) => {
                    let new_score = penalize(old_score);
                    debug!(party, old_score, new_score, "trust penalty computed");
                    TrustOutcome::Adjusted(TrustAdjustment {
                        party: party.to_string(),
                        old_score,
                        new_score,
                        penalty: old_score - new_score,
                    })
                }
                Err(err) => {
                    warn!(party, error = %err, "no trust score available");
                    TrustOutcome::Unavailable {
                        party: party.to_string(),
                        reason: err.to_string(),
                    }
                }
            };
            report.outcomes.push(outcome);
        }
        report
    }

    fn current_score<S>(&mut self, source: &S, party: &str) -> Result<TrustScore, VaultError>
    where
        S: TrustSource + ?Sized,
    {
        if let Some(score) = self.cached(party) {
            return Ok(score);
        }
        let score = source.trust_score(party)?;
        self.cache.insert(party.to_string(), score);
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentId;
    use std::cell::Cell;

    struct CountingSource {
        scores: BTreeMap<String, TrustScore>,
        reads: Cell<usize>,
    }

    impl CountingSource {
        fn new(scores: &[(&str, TrustScore)]) -> Self {
            Self {
                scores: scores.iter().map(|(p, s)| (p.to_string(), *s)).collect(),
                reads: Cell::new(0),
            }
        }
    }

    impl TrustSource for CountingSource {
        fn trust_score(&self, party: &str) -> Result<TrustScore, VaultError> {
            self.reads.set(self.reads.get() + 1);
            self.scores
                .get(party)
                .copied()
                .ok_or_else(|| VaultError::LedgerUnavailable(format!("no record for {party}")))
        }
    }

    struct Offline;

    impl TrustSource for Offline {
        fn trust_score(&self, _party: &str) -> Result<TrustScore, VaultError> {
            Err(VaultError::LedgerUnavailable("rpc unreachable".into()))
        }
    }

    fn missing(ids: &[u32]) -> Vec<MissingFragment> {
        ids.iter()
            .map(|id| MissingFragment {
                fragment_id: *id,
                fragment_hash: ContentId::of(&id.to_le_bytes()),
            })
            .collect()
    }

    #[test]
    fn penalty_is_fifteen_percent_floored() {
        assert_eq!(penalize(100), 85);
        assert_eq!(penalize(1), 0);
        assert_eq!(penalize(0), 0);
        assert_eq!(penalize(7), 5);
        assert_eq!(penalize(u64::MAX), (u64::MAX as u128 * 85 / 100) as u64);
    }

    #[test]
    fn report_carries_old_new_and_penalty() {
        let source = CountingSource::new(&[("node-a", 100), ("node-b", 1)]);
        let mut adjuster = TrustAdjuster::new();
        let report = adjuster.penalize_parties(&source, ["node-a", "node-b"]);
        let adjusted: Vec<&TrustAdjustment> = report.adjusted().collect();
        assert_eq!(
            adjusted,
            vec![
                &TrustAdjustment {
                    party: "node-a".into(),
                    old_score: 100,
                    new_score: 85,
                    penalty: 15,
                },
                &TrustAdjustment {
                    party: "node-b".into(),
                    old_score: 1,
                    new_score: 0,
                    penalty: 1,
                },
            ]
        );
    }

    #[test]
    fn one_penalty_per_party_per_episode() {
        let source = CountingSource::new(&[("node-a", 100), ("node-b", 50)]);
        let nodes = vec!["node-a".to_string(), "node-b".to_string()];
        let placement = Placement::round_robin(&nodes, 4);
        // Fragments 1 and 3 both live on node-a.
        let report = TrustAdjuster::new().adjust(&source, &missing(&[1, 3]), &placement);
        assert_eq!(report.outcomes.len(), 1);
        let only = report.adjusted().next().expect("adjusted");
        assert_eq!(only.party, "node-a");
        assert_eq!(only.new_score, 85);
    }

    #[test]
    fn cache_avoids_repeat_reads_without_compounding() {
        let source = CountingSource::new(&[("node-a", 100)]);
        let mut adjuster = TrustAdjuster::new();
        adjuster.penalize_parties(&source, ["node-a"]);
        let second = adjuster.penalize_parties(&source, ["node-a"]);
        assert_eq!(source.reads.get(), 1);
        assert_eq!(adjuster.cached("node-a"), Some(100));
        let adjustment = second.adjusted().next().expect("adjusted");
        assert_eq!((adjustment.old_score, adjustment.new_score), (100, 85));
    }

    #[test]
    fn unavailable_ledger_is_reported_not_raised() {
        let nodes = vec!["node-a".to_string()];
        let placement = Placement::round_robin(&nodes, 2);
        let mut adjuster = TrustAdjuster::new();
        let report = adjuster.adjust(&Offline, &missing(&[2]), &placement);
        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(
            &report.outcomes[0],
            TrustOutcome::Unavailable { party, .. } if party == "node-a"
        ));
        assert_eq!(adjuster.cached("node-a"), None);
    }

    #[test]
    fn empty_placement_implicates_nobody() {
        let source = CountingSource::new(&[]);
        let report = TrustAdjuster::new().adjust(&source, &missing(&[1]), &Placement::new());
        assert!(report.is_empty());
        assert_eq!(source.reads.get(), 0);
    }

    #[test]
    fn round_robin_wraps_over_nodes() {
        let nodes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let placement = Placement::round_robin(&nodes, 5);
        assert_eq!(placement.holders(1), ["a".to_string()]);
        assert_eq!(placement.holders(4), ["a".to_string()]);
        assert_eq!(placement.holders(5), ["b".to_string()]);
        assert!(placement.holders(6).is_empty());
    }
}
