//! Atomic, idempotent mutations shared by classification, refinement and the
//! conflict-driven generator. Every state change in the crate goes through
//! one of these so the network's invariants hold after each call.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::network::{NodeState, NormativeNetwork};
use crate::norm::{Norm, NormId};
use crate::oracle::NormMatcher;

/// Insert `norm` (no-op if present) and return its id.
pub fn add(network: &mut NormativeNetwork, norm: Norm) -> NormId {
    network.add(norm)
}

/// Make `id` Active unless it is already represented.
///
/// Reactivating a Discarded norm clears its utility so evidence from an
/// earlier activation epoch does not leak into the new one.
pub fn activate(network: &mut NormativeNetwork, id: NormId) -> bool {
    let Some(state) = network.state(id) else {
        return false;
    };
    if network.is_represented(id) {
        return false;
    }
    if state == NodeState::Discarded {
        network.reset_utility(id);
    }
    debug!(norm = %id, from = ?state, "activate");
    network.set_state(id, NodeState::Active)
}

/// Move an Active norm into the deactivated state `reason`.
pub fn deactivate(network: &mut NormativeNetwork, id: NormId, reason: NodeState) -> bool {
    if !reason.is_deactivated() || network.state(id) != Some(NodeState::Active) {
        return false;
    }
    debug!(norm = %id, reason = ?reason, "deactivate");
    network.set_state(id, reason)
}

/// Add `child -> parent` and retire the child if it is now covered.
pub fn generalise(network: &mut NormativeNetwork, child: NormId, parent: NormId) -> bool {
    if child == parent || network.is_ancestor(child, parent) {
        debug!(child = %child, parent = %parent, "generalisation edge skipped: cycle risk");
        return false;
    }
    let linked = network.add_generalisation(child, parent) || network.parents(child).contains(&parent);
    if linked && network.is_represented_by_ancestor(child) {
        deactivate(network, child, NodeState::Generalised);
    }
    linked
}

/// Retire `id` with `reason` and activate each child not otherwise represented.
///
/// Discarded children stay discarded.
pub fn specialise(network: &mut NormativeNetwork, id: NormId, reason: NodeState) -> Vec<NormId> {
    deactivate(network, id, reason);
    let mut activated = Vec::new();
    for child in network.children(id) {
        if network.state(child) == Some(NodeState::Discarded) {
            continue;
        }
        if activate(network, child) {
            activated.push(child);
        }
    }
    activated
}

/// Deactivate every Active descendant of `id` that an ancestor now covers.
pub fn retire_covered(network: &mut NormativeNetwork, id: NormId) -> Vec<NormId> {
    let mut retired = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = network.children(id);
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        if network.is_represented_by_ancestor(node)
            && deactivate(network, node, NodeState::Generalised)
        {
            retired.push(node);
        }
        stack.extend(network.children(node));
    }
    retired
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkOutcome {
    /// Existing norms that became parents of the linked norm.
    pub parents: Vec<NormId>,
    /// Existing norms that became children of the linked norm.
    pub children: Vec<NormId>,
}

/// Wire `id` into the generalisation forest.
///
/// Searches downward from the top boundary for the most specific norms
/// covering `id` (its parents) and the most general norms `id` covers (its
/// children). Subtrees whose root does not cover `id` are pruned: nothing
/// more specific than a non-covering norm can cover it.
pub fn link(network: &mut NormativeNetwork, matcher: &dyn NormMatcher, id: NormId) -> LinkOutcome {
    let Some(norm) = network.norm(id).cloned() else {
        return LinkOutcome::default();
    };

    let mut covering = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = network.top_boundary();
    while let Some(node) = stack.pop() {
        if node == id || !seen.insert(node) {
            continue;
        }
        let Some(candidate) = network.norm(node) else {
            continue;
        };
        if matcher.satisfies(&norm, candidate) {
            covering.push(node);
            stack.extend(network.children(node));
        }
    }
    let covering_set: HashSet<NormId> = covering.iter().copied().collect();
    let mut parents: Vec<NormId> = covering
        .into_iter()
        .filter(|&node| {
            !network
                .children(node)
                .iter()
                .any(|c| covering_set.contains(c))
        })
        .collect();
    parents.sort();

    let covered: HashSet<NormId> = network
        .ids()
        .filter(|&node| node != id && !covering_set.contains(&node))
        .filter(|&node| {
            network
                .norm(node)
                .is_some_and(|candidate| matcher.satisfies(candidate, &norm))
        })
        .collect();
    let mut children: Vec<NormId> = covered
        .iter()
        .copied()
        .filter(|&node| !network.parents(node).iter().any(|p| covered.contains(p)))
        .collect();
    children.sort();

    let mut outcome = LinkOutcome::default();
    for parent in parents {
        if generalise(network, id, parent) {
            outcome.parents.push(parent);
        }
    }
    for child in children {
        if generalise(network, child, id) {
            outcome.children.push(child);
        }
    }
    if !outcome.parents.is_empty() || !outcome.children.is_empty() {
        debug!(norm = %id, parents = ?outcome.parents, children = ?outcome.children, "linked");
    }
    outcome
}
