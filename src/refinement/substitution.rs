//! Choosing which of two substitutable norms stays active.
//!
//! Priority order:
//! 1. keep the norm complementary with some third norm
//! 2. keep the norm that is not already a substituter
//! 3. keep the norm with the lower substitutability index
//! 4. keep the norm with the higher generalisation index
//! 5. seeded coin flip
//!
//! Each unordered pair keeps a displacement history; once it exceeds
//! `max_displacements` the relation is treated as a false positive and removed.

use std::cmp::Ordering;
use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use crate::network::{NormAttribute, NormativeNetwork};
use crate::norm::NormId;

const INDEX_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakRule {
    Complementarity,
    NotSubstituter,
    SubstitutabilityIndex,
    GeneralisationIndex,
    Random,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PairHistory {
    /// Times the lower id displaced the higher id.
    low_over_high: u32,
    /// Times the higher id displaced the lower id.
    high_over_low: u32,
}

impl PairHistory {
    pub(crate) fn record(&mut self, keeper: NormId, other: NormId) {
        if keeper < other {
            self.low_over_high += 1;
        } else {
            self.high_over_low += 1;
        }
    }

    pub(crate) fn total(&self) -> u32 {
        self.low_over_high + self.high_over_low
    }
}

/// Displacement bookkeeping that outlives a single tick.
#[derive(Debug, Clone, Default)]
pub(crate) struct SubstitutionLedger {
    displaced_by: HashMap<NormId, u32>,
    pairs: HashMap<(NormId, NormId), PairHistory>,
}

impl SubstitutionLedger {
    pub(crate) fn record(&mut self, keeper: NormId, folded: NormId) -> u32 {
        *self.displaced_by.entry(keeper).or_default() += 1;
        let key = if keeper < folded {
            (keeper, folded)
        } else {
            (folded, keeper)
        };
        let history = self.pairs.entry(key).or_default();
        history.record(keeper, folded);
        history.total()
    }

    pub(crate) fn forget_pair(&mut self, a: NormId, b: NormId) {
        let key = if a < b { (a, b) } else { (b, a) };
        self.pairs.remove(&key);
    }

    pub(crate) fn displacements(&self, id: NormId) -> u32 {
        self.displaced_by.get(&id).copied().unwrap_or(0)
    }

    /// Displacements of `id` and its ancestors, decaying by `decay` per hop.
    pub(crate) fn substitutability_index(
        &self,
        network: &NormativeNetwork,
        id: NormId,
        decay: f64,
    ) -> f64 {
        let own = self.displacements(id) as f64;
        network
            .ancestors_with_distance(id)
            .into_iter()
            .fold(own, |acc, (ancestor, dist)| {
                acc + self.displacements(ancestor) as f64 * decay.powi(dist as i32)
            })
    }
}

/// Levels of `id` and its ancestors, decaying by `decay` per hop.
pub(crate) fn generalisation_index(network: &NormativeNetwork, id: NormId, decay: f64) -> f64 {
    let own = network.generalisation_level(id) as f64;
    network
        .ancestors_with_distance(id)
        .into_iter()
        .fold(own, |acc, (ancestor, dist)| {
            acc + network.generalisation_level(ancestor) as f64 * decay.powi(dist as i32)
        })
}

fn complementary_elsewhere(network: &NormativeNetwork, id: NormId, other: NormId) -> bool {
    network.has_attribute(id, NormAttribute::Complementary)
        && network.complements(id).iter().any(|&c| c != other)
}

/// Returns `(keep, fold, rule)`.
pub(crate) fn choose_keeper(
    network: &NormativeNetwork,
    ledger: &SubstitutionLedger,
    a: NormId,
    b: NormId,
    decay: f64,
    rng: &mut StdRng,
) -> (NormId, NormId, TieBreakRule) {
    let comp_a = complementary_elsewhere(network, a, b);
    let comp_b = complementary_elsewhere(network, b, a);
    if comp_a != comp_b {
        return if comp_a {
            (a, b, TieBreakRule::Complementarity)
        } else {
            (b, a, TieBreakRule::Complementarity)
        };
    }

    let sub_a = network.has_attribute(a, NormAttribute::Substituter);
    let sub_b = network.has_attribute(b, NormAttribute::Substituter);
    if sub_a != sub_b {
        return if sub_a {
            (b, a, TieBreakRule::NotSubstituter)
        } else {
            (a, b, TieBreakRule::NotSubstituter)
        };
    }

    let idx_a = ledger.substitutability_index(network, a, decay);
    let idx_b = ledger.substitutability_index(network, b, decay);
    if (idx_a - idx_b).abs() > INDEX_TOLERANCE {
        return match idx_a.partial_cmp(&idx_b).unwrap_or(Ordering::Equal) {
            Ordering::Less => (a, b, TieBreakRule::SubstitutabilityIndex),
            _ => (b, a, TieBreakRule::SubstitutabilityIndex),
        };
    }

    let gen_a = generalisation_index(network, a, decay);
    let gen_b = generalisation_index(network, b, decay);
    if (gen_a - gen_b).abs() > INDEX_TOLERANCE {
        return if gen_a > gen_b {
            (a, b, TieBreakRule::GeneralisationIndex)
        } else {
            (b, a, TieBreakRule::GeneralisationIndex)
        };
    }

    if rng.gen_bool(0.5) {
        (a, b, TieBreakRule::Random)
    } else {
        (b, a, TieBreakRule::Random)
    }
}
