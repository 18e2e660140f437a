//! Refinement: the topology-changing half of a synthesis cycle.
//!
//! - [`specialise_down`] splits a failing norm (and every active ancestor
//!   covering it) back into its children.
//! - [`RefinementEngine::generalise_up`] merges a well-performing norm with a
//!   peer in the normative system into a broader parent.
//! - [`RefinementEngine::resolve_substitution`] folds one of two
//!   substitutable leaves, see [`substitution`].

pub mod substitution;

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{GeneralisationMode, StrategyPolicy, SubstitutionConfig, SynthesisConfig};
use crate::lifecycle;
use crate::network::{NodeState, NormAttribute, NormativeNetwork};
use crate::norm::{Norm, NormId, Precondition};
use crate::oracle::{DomainTaxonomy, NormMatcher};

use substitution::{choose_keeper, SubstitutionLedger};
pub use substitution::TieBreakRule;

/// Parent covering `a` and `b`, if they differ in at most `step` bindings.
///
/// Both norms must share modality and action and bind the same predicates.
/// Each differing binding is lifted to the least common ancestor of the two
/// terms; identical norms are not generalisable.
pub fn generalisable_norms(
    a: &Norm,
    b: &Norm,
    step: usize,
    taxonomy: &dyn DomainTaxonomy,
) -> Option<Norm> {
    if !a.same_effect(b) || a.precondition().len() != b.precondition().len() {
        return None;
    }
    let mut merged = Precondition::new();
    let mut differences = 0usize;
    for (predicate, term_a) in a.precondition() {
        let term_b = b.precondition().get(predicate)?;
        if term_a == term_b {
            merged.insert(predicate.clone(), term_a.clone());
            continue;
        }
        differences += 1;
        if differences > step {
            return None;
        }
        let common = taxonomy.least_common_ancestor(predicate, term_a, term_b)?;
        merged.insert(predicate.clone(), common);
    }
    if differences == 0 {
        return None;
    }
    Some(a.with_precondition(merged))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MergeRejection {
    NotGeneralisable,
    /// A precondition involved in the merge is invalid in the domain.
    Inconsistent,
    /// The parent would cover norms that are currently not represented.
    Infeasible { covers: Vec<NormId> },
    AlreadyRepresented,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub parent: NormId,
    pub merged: [NormId; 2],
    /// Whether the parent norm was new to the network.
    pub created: bool,
    /// Children the parent covers after linking.
    pub children: Vec<NormId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitOutcome {
    pub norm: NormId,
    pub reason: NodeState,
    /// Every node deactivated by the split, ancestors first.
    pub deactivated: Vec<NormId>,
    pub activated: Vec<NormId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstitutionOutcome {
    pub kept: NormId,
    pub folded: NormId,
    pub rule: TieBreakRule,
    /// Displacements recorded for this pair so far.
    pub displacements: u32,
    /// The pair exceeded the displacement limit and lost its relation.
    pub relation_dropped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefinementReport {
    pub splits: Vec<SplitOutcome>,
    pub merges: Vec<MergeOutcome>,
    pub substitutions: Vec<SubstitutionOutcome>,
}

impl RefinementReport {
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty() && self.merges.is_empty() && self.substitutions.is_empty()
    }
}

/// Nodes reachable from `id` through parents, each after all of its own
/// ancestors, `id` last.
fn ancestors_first(network: &NormativeNetwork, id: NormId) -> Vec<NormId> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(id, false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node) {
            continue;
        }
        stack.push((node, true));
        for parent in network.parents(node) {
            if !visited.contains(&parent) {
                stack.push((parent, false));
            }
        }
    }
    order
}

/// Split `id` and every represented ancestor, top of the chain first.
///
/// `id` is deactivated with `reason`, ancestors as Specialised. Each split
/// activates the children not otherwise represented (Discarded ones stay
/// down). A leaf simply goes into `reason`.
pub fn specialise_down(network: &mut NormativeNetwork, id: NormId, reason: NodeState) -> SplitOutcome {
    let mut outcome = SplitOutcome {
        norm: id,
        reason,
        deactivated: Vec::new(),
        activated: Vec::new(),
    };
    for node in ancestors_first(network, id) {
        if network.state(node) != Some(NodeState::Active) {
            continue;
        }
        let why = if node == id { reason } else { NodeState::Specialised };
        let activated = lifecycle::specialise(network, node, why);
        outcome.deactivated.push(node);
        outcome.activated.retain(|n| *n != node);
        outcome.activated.extend(activated);
    }
    outcome.activated.retain(|&n| network.state(n) == Some(NodeState::Active));
    if !outcome.deactivated.is_empty() {
        info!(
            norm = %id,
            reason = ?reason,
            deactivated = ?outcome.deactivated,
            activated = ?outcome.activated,
            "specialised"
        );
    }
    outcome
}

fn is_under_performing(network: &NormativeNetwork, id: NormId) -> bool {
    network.has_attribute(id, NormAttribute::Ineffective)
        || network.has_attribute(id, NormAttribute::Unnecessary)
}

/// Check the merge gates for `a` and `b` and, if they pass, commit the merge.
pub fn try_merge(
    network: &mut NormativeNetwork,
    matcher: &dyn NormMatcher,
    taxonomy: &dyn DomainTaxonomy,
    a: NormId,
    b: NormId,
    step: usize,
) -> Result<MergeOutcome, MergeRejection> {
    let (Some(norm_a), Some(norm_b)) = (network.norm(a), network.norm(b)) else {
        return Err(MergeRejection::NotGeneralisable);
    };
    let parent =
        generalisable_norms(norm_a, norm_b, step, taxonomy).ok_or(MergeRejection::NotGeneralisable)?;

    if ![norm_a, norm_b, &parent]
        .iter()
        .all(|n| taxonomy.is_consistent(n.precondition()))
    {
        return Err(MergeRejection::Inconsistent);
    }

    let existing = network.id_of(&parent);
    let covers: Vec<NormId> = network
        .not_represented_norms()
        .into_iter()
        .filter(|&id| Some(id) != existing)
        .filter(|&id| network.norm(id).is_some_and(|n| matcher.satisfies(n, &parent)))
        .collect();
    if !covers.is_empty() {
        return Err(MergeRejection::Infeasible { covers });
    }

    if existing.is_some_and(|id| network.is_represented(id)) {
        return Err(MergeRejection::AlreadyRepresented);
    }
    let covered_by_active = network.active_norms().into_iter().any(|id| {
        Some(id) != existing && network.norm(id).is_some_and(|n| matcher.satisfies(&parent, n))
    });
    if covered_by_active {
        return Err(MergeRejection::AlreadyRepresented);
    }

    let pid = lifecycle::add(network, parent);
    if !network.is_represented(pid) {
        network.reset_utility(pid);
        lifecycle::activate(network, pid);
    }
    for child in [a, b] {
        lifecycle::generalise(network, child, pid);
    }
    lifecycle::link(network, matcher, pid);
    lifecycle::retire_covered(network, pid);
    let outcome = MergeOutcome {
        parent: pid,
        merged: [a, b],
        created: existing.is_none(),
        children: network.children(pid),
    };
    info!(parent = %pid, a = %a, b = %b, created = outcome.created, "generalised");
    Ok(outcome)
}

#[derive(Debug, Clone)]
pub struct RefinementEngine {
    policy: StrategyPolicy,
    substitution: SubstitutionConfig,
    ledger: SubstitutionLedger,
    rng: StdRng,
}

impl RefinementEngine {
    pub fn new(policy: StrategyPolicy, substitution: SubstitutionConfig, rng_seed: u64) -> Self {
        Self {
            policy,
            substitution,
            ledger: SubstitutionLedger::default(),
            rng: StdRng::seed_from_u64(rng_seed),
        }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(
            config.policy.clone(),
            config.substitution.clone(),
            config.rng_seed,
        )
    }

    pub fn policy(&self) -> &StrategyPolicy {
        &self.policy
    }

    /// One refinement pass over the norms revised this cycle.
    ///
    /// Failing norms are split first so merges never build on them;
    /// substitution runs last, over pairs both still Active.
    pub fn refine(
        &mut self,
        network: &mut NormativeNetwork,
        matcher: &dyn NormMatcher,
        taxonomy: &dyn DomainTaxonomy,
        revised: &[NormId],
    ) -> RefinementReport {
        let mut report = RefinementReport::default();

        for &id in revised {
            if is_under_performing(network, id) && network.is_represented(id) {
                let split = specialise_down(network, id, NodeState::Discarded);
                if !split.deactivated.is_empty() {
                    report.splits.push(split);
                }
            }
        }

        for &id in revised {
            if network.has_attribute(id, NormAttribute::Generalisable)
                && network.state(id) == Some(NodeState::Active)
            {
                report
                    .merges
                    .extend(self.generalise_up(network, matcher, taxonomy, id));
            }
        }

        if self.policy.detect_relations {
            let mut pairs = Vec::new();
            for id in network.active_norms() {
                if !network.has_attribute(id, NormAttribute::Substitutable) {
                    continue;
                }
                pairs.extend(
                    network
                        .substitutes(id)
                        .into_iter()
                        .filter(|&other| id < other)
                        .map(|other| (id, other)),
                );
            }
            for (a, b) in pairs {
                if let Some(outcome) = self.resolve_substitution(network, a, b) {
                    report.substitutions.push(outcome);
                }
            }
        }
        report
    }

    /// Merge `id` with peers from the normative system.
    ///
    /// Shallow mode stops once `id` has been folded into a parent; deep
    /// mode keeps merging each new parent in turn.
    pub fn generalise_up(
        &self,
        network: &mut NormativeNetwork,
        matcher: &dyn NormMatcher,
        taxonomy: &dyn DomainTaxonomy,
        id: NormId,
    ) -> Vec<MergeOutcome> {
        let mut merges = Vec::new();
        let mut visited = HashSet::new();
        let mut worklist = vec![id];
        while let Some(current) = worklist.pop() {
            if !visited.insert(current) {
                continue;
            }
            let peers: Vec<NormId> = network
                .normative_system()
                .iter()
                .copied()
                .filter(|&peer| peer != current)
                .collect();
            for peer in peers {
                if network.state(current) != Some(NodeState::Active) {
                    break;
                }
                if !network.is_enforced(peer) || is_under_performing(network, peer) {
                    continue;
                }
                match try_merge(
                    network,
                    matcher,
                    taxonomy,
                    current,
                    peer,
                    self.policy.generalisation_step,
                ) {
                    Ok(outcome) => {
                        if self.policy.generalisation_mode == GeneralisationMode::Deep {
                            worklist.push(outcome.parent);
                        }
                        merges.push(outcome);
                    }
                    Err(MergeRejection::NotGeneralisable) => {}
                    Err(rejection) => {
                        debug!(a = %current, b = %peer, ?rejection, "merge rejected");
                    }
                }
            }
        }
        merges
    }

    /// Fold one of two Active substitutable norms.
    pub fn resolve_substitution(
        &mut self,
        network: &mut NormativeNetwork,
        a: NormId,
        b: NormId,
    ) -> Option<SubstitutionOutcome> {
        let both_active = network.state(a) == Some(NodeState::Active)
            && network.state(b) == Some(NodeState::Active);
        if !both_active || !network.are_substitutable(a, b) {
            return None;
        }
        let (kept, folded, rule) = choose_keeper(
            network,
            &self.ledger,
            a,
            b,
            self.substitution.index_decay,
            &mut self.rng,
        );

        specialise_down(network, folded, NodeState::Substituted);
        network.remove_attribute(folded, NormAttribute::Substituter);
        network.add_attribute(kept, NormAttribute::Substituter);

        let displacements = self.ledger.record(kept, folded);
        let relation_dropped = displacements > self.substitution.max_displacements;
        if relation_dropped {
            warn!(
                a = %a,
                b = %b,
                displacements,
                "substitution keeps cycling; relation removed"
            );
            network.remove_substitutability(a, b);
            self.ledger.forget_pair(a, b);
            for id in [a, b] {
                if network.substitutes(id).is_empty() {
                    network.remove_attribute(id, NormAttribute::Substitutable);
                }
            }
        }
        info!(kept = %kept, folded = %folded, ?rule, "substituted");
        Some(SubstitutionOutcome {
            kept,
            folded,
            rule,
            displacements,
            relation_dropped,
        })
    }
}
