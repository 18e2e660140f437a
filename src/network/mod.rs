//! The normative network: every norm ever synthesised, its lifecycle state,
//! typed relations, utility and attribute tags.
//!
//! Storage layout:
//! - an arena of nodes indexed by [`NormId`] plus an injective `Norm -> NormId` index
//! - adjacency keyed by `(source, EdgeKind)` with ordered neighbour sets
//! - a reverse index of generalisation edges (parent -> children)
//!
//! Generalisation edges point child -> parent and must stay acyclic; the
//! network refuses an insertion that would close a cycle. Substitutability
//! and complementarity are symmetric and mutually exclusive per pair.

pub mod omega;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::norm::{Dimension, Goal, Norm, NormId};
use crate::utility::{RangeSettings, Utility};

pub use omega::{omega_from_spec, ActiveOmega, OmegaFunction, OmegaSpec, RepresentedOmega};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Directed, child -> parent.
    Generalisation,
    /// Symmetric.
    Substitutability,
    /// Symmetric.
    Complementarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub source: NormId,
    pub target: NormId,
    pub kind: EdgeKind,
}

/// Lifecycle state of a node. Deactivated states record why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Created,
    Active,
    Generalised,
    Specialised,
    Substituted,
    Discarded,
}

impl NodeState {
    pub fn is_deactivated(self) -> bool {
        matches!(
            self,
            NodeState::Generalised
                | NodeState::Specialised
                | NodeState::Substituted
                | NodeState::Discarded
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormAttribute {
    Effective,
    Ineffective,
    Necessary,
    Unnecessary,
    Generalisable,
    Substitutable,
    Substituter,
    Exclusive,
    Complementary,
}

impl NormAttribute {
    /// Attribute that cannot be held together with this one.
    pub fn dual(self) -> Option<NormAttribute> {
        match self {
            NormAttribute::Effective => Some(NormAttribute::Ineffective),
            NormAttribute::Ineffective => Some(NormAttribute::Effective),
            NormAttribute::Necessary => Some(NormAttribute::Unnecessary),
            NormAttribute::Unnecessary => Some(NormAttribute::Necessary),
            _ => None,
        }
    }

    pub fn well_performing(dim: Dimension) -> NormAttribute {
        match dim {
            Dimension::Effectiveness => NormAttribute::Effective,
            Dimension::Necessity => NormAttribute::Necessary,
        }
    }

    pub fn under_performing(dim: Dimension) -> NormAttribute {
        match dim {
            Dimension::Effectiveness => NormAttribute::Ineffective,
            Dimension::Necessity => NormAttribute::Unnecessary,
        }
    }
}

/// Norms that entered / left the normative system since [`NormativeNetwork::begin_tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormativeSystemDelta {
    pub added: Vec<NormId>,
    pub removed: Vec<NormId>,
}

impl NormativeSystemDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Point-in-time counts, cheap enough to attach to every tick report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub nodes: usize,
    pub active: usize,
    pub represented: usize,
    pub normative_system: usize,
    pub discarded: usize,
    pub max_level: u32,
}

#[derive(Debug, Clone)]
struct NodeEntry {
    norm: Norm,
    state: NodeState,
    utility: Utility,
    attributes: BTreeSet<NormAttribute>,
    level: u32,
}

type PairKey = (NormId, NormId);

fn pair_key(a: NormId, b: NormId) -> PairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone)]
pub struct NormativeNetwork {
    goals: Vec<Goal>,
    range_settings: RangeSettings,
    nodes: Vec<NodeEntry>,
    index: HashMap<Norm, NormId>,
    edges: HashMap<(NormId, EdgeKind), BTreeSet<NormId>>,
    children: HashMap<NormId, BTreeSet<NormId>>,
    joint: HashMap<PairKey, Utility>,
    omega: Arc<dyn OmegaFunction>,
    normative_system: BTreeSet<NormId>,
    tick_baseline: BTreeSet<NormId>,
}

impl NormativeNetwork {
    pub fn new(goals: Vec<Goal>, range_settings: RangeSettings) -> Self {
        Self::with_omega(goals, range_settings, Arc::new(ActiveOmega))
    }

    pub fn with_omega(
        goals: Vec<Goal>,
        range_settings: RangeSettings,
        omega: Arc<dyn OmegaFunction>,
    ) -> Self {
        Self {
            goals,
            range_settings,
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: HashMap::new(),
            children: HashMap::new(),
            joint: HashMap::new(),
            omega,
            normative_system: BTreeSet::new(),
            tick_baseline: BTreeSet::new(),
        }
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn omega(&self) -> &dyn OmegaFunction {
        self.omega.as_ref()
    }

    // -- Nodes ----------------------------------------------------------------

    /// Insert `norm` if absent. Returns its id either way.
    ///
    /// # Panics
    ///
    /// Ids are `u32`: panics if the network already holds `u32::MAX` norms,
    /// the same way `Vec::push` panics past its capacity.
    pub fn add(&mut self, norm: Norm) -> NormId {
        if let Some(&id) = self.index.get(&norm) {
            return id;
        }
        let Ok(raw) = u32::try_from(self.nodes.len()) else {
            panic!("normative network is full: {} norms", self.nodes.len());
        };
        let id = NormId(raw);
        self.index.insert(norm.clone(), id);
        self.nodes.push(NodeEntry {
            norm,
            state: NodeState::Created,
            utility: Utility::new(&self.goals, self.range_settings),
            attributes: BTreeSet::new(),
            level: 1,
        });
        id
    }

    pub fn contains(&self, norm: &Norm) -> bool {
        self.index.contains_key(norm)
    }

    pub fn id_of(&self, norm: &Norm) -> Option<NormId> {
        self.index.get(norm).copied()
    }

    pub fn norm(&self, id: NormId) -> Option<&Norm> {
        self.nodes.get(id.index()).map(|n| &n.norm)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NormId> + '_ {
        // `add` keeps every index within u32.
        (0..self.nodes.len()).map(|i| NormId(i as u32))
    }

    fn entry(&self, id: NormId) -> Option<&NodeEntry> {
        self.nodes.get(id.index())
    }

    fn entry_mut(&mut self, id: NormId) -> Option<&mut NodeEntry> {
        self.nodes.get_mut(id.index())
    }

    // -- State ----------------------------------------------------------------

    pub fn state(&self, id: NormId) -> Option<NodeState> {
        self.entry(id).map(|n| n.state)
    }

    /// Set the state and recompute the normative system. Unknown ids are ignored.
    pub fn set_state(&mut self, id: NormId, state: NodeState) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        entry.state = state;
        self.recompute_normative_system();
        true
    }

    pub fn active_norms(&self) -> Vec<NormId> {
        self.ids()
            .filter(|&id| self.state(id) == Some(NodeState::Active))
            .collect()
    }

    // -- Generalisation -------------------------------------------------------

    /// Insert a child -> parent edge and raise levels above it.
    ///
    /// Refuses self-loops and edges that would make `child` its own ancestor.
    pub fn add_generalisation(&mut self, child: NormId, parent: NormId) -> bool {
        if child == parent || self.entry(child).is_none() || self.entry(parent).is_none() {
            return false;
        }
        if self.is_ancestor(child, parent) {
            return false;
        }
        let inserted = self
            .edges
            .entry((child, EdgeKind::Generalisation))
            .or_default()
            .insert(parent);
        if !inserted {
            return false;
        }
        self.children.entry(parent).or_default().insert(child);
        self.raise_levels_from(child);
        self.recompute_normative_system();
        true
    }

    pub fn remove_generalisation(&mut self, child: NormId, parent: NormId) -> bool {
        let removed = self
            .edges
            .get_mut(&(child, EdgeKind::Generalisation))
            .is_some_and(|set| set.remove(&parent));
        if removed {
            if let Some(set) = self.children.get_mut(&parent) {
                set.remove(&child);
            }
            self.recompute_normative_system();
        }
        removed
    }

    fn raise_levels_from(&mut self, start: NormId) {
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let floor = self.generalisation_level(node) + 1;
            for parent in self.parents(node) {
                let Some(entry) = self.entry_mut(parent) else {
                    continue;
                };
                if entry.level < floor {
                    entry.level = floor;
                    queue.push_back(parent);
                }
            }
        }
    }

    pub fn parents(&self, id: NormId) -> Vec<NormId> {
        self.neighbours(id, EdgeKind::Generalisation)
    }

    pub fn children(&self, id: NormId) -> Vec<NormId> {
        self.children
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_leaf(&self, id: NormId) -> bool {
        self.children.get(&id).map_or(true, BTreeSet::is_empty)
    }

    pub fn generalisation_level(&self, id: NormId) -> u32 {
        self.entry(id).map(|n| n.level).unwrap_or(0)
    }

    /// Every ancestor of `id` with its shortest distance (parents are at 1).
    pub fn ancestors_with_distance(&self, id: NormId) -> Vec<(NormId, u32)> {
        let mut seen = HashSet::from([id]);
        let mut out = Vec::new();
        let mut queue = VecDeque::from([(id, 0u32)]);
        while let Some((node, dist)) = queue.pop_front() {
            for parent in self.parents(node) {
                if seen.insert(parent) {
                    out.push((parent, dist + 1));
                    queue.push_back((parent, dist + 1));
                }
            }
        }
        out
    }

    /// Whether `ancestor` is reachable from `id` through any chain of parents.
    pub fn is_ancestor(&self, ancestor: NormId, id: NormId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = self.parents(id);
        while let Some(node) = stack.pop() {
            if node == ancestor {
                return true;
            }
            if seen.insert(node) {
                stack.extend(self.parents(node));
            }
        }
        false
    }

    /// Active itself, or through any ancestor.
    pub fn is_represented(&self, id: NormId) -> bool {
        if self.state(id) == Some(NodeState::Active) {
            return true;
        }
        let mut seen = HashSet::new();
        let mut stack = self.parents(id);
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            if self.state(node) == Some(NodeState::Active) {
                return true;
            }
            stack.extend(self.parents(node));
        }
        false
    }

    /// Represented through an Active ancestor, ignoring `id`'s own state.
    pub fn is_represented_by_ancestor(&self, id: NormId) -> bool {
        self.ancestors_with_distance(id)
            .into_iter()
            .any(|(a, _)| self.state(a) == Some(NodeState::Active))
    }

    /// Roots of the generalisation forest.
    pub fn top_boundary(&self) -> Vec<NormId> {
        self.ids().filter(|&id| self.parents(id).is_empty()).collect()
    }

    pub fn represented_norms(&self) -> Vec<NormId> {
        self.ids().filter(|&id| self.is_represented(id)).collect()
    }

    pub fn not_represented_norms(&self) -> Vec<NormId> {
        self.ids().filter(|&id| !self.is_represented(id)).collect()
    }

    // -- Symmetric relations --------------------------------------------------

    fn neighbours(&self, id: NormId, kind: EdgeKind) -> Vec<NormId> {
        self.edges
            .get(&(id, kind))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn has_edge(&self, a: NormId, b: NormId, kind: EdgeKind) -> bool {
        self.edges
            .get(&(a, kind))
            .is_some_and(|set| set.contains(&b))
    }

    fn insert_symmetric(&mut self, a: NormId, b: NormId, kind: EdgeKind) -> bool {
        if a == b || self.entry(a).is_none() || self.entry(b).is_none() {
            return false;
        }
        let other = match kind {
            EdgeKind::Substitutability => EdgeKind::Complementarity,
            EdgeKind::Complementarity => EdgeKind::Substitutability,
            EdgeKind::Generalisation => return false,
        };
        self.remove_symmetric(a, b, other);
        let fresh = self.edges.entry((a, kind)).or_default().insert(b);
        self.edges.entry((b, kind)).or_default().insert(a);
        fresh
    }

    fn remove_symmetric(&mut self, a: NormId, b: NormId, kind: EdgeKind) -> bool {
        let mut removed = false;
        if let Some(set) = self.edges.get_mut(&(a, kind)) {
            removed |= set.remove(&b);
        }
        if let Some(set) = self.edges.get_mut(&(b, kind)) {
            removed |= set.remove(&a);
        }
        removed
    }

    /// Relate `a` and `b` as substitutable, dropping any complementarity between them.
    pub fn add_substitutability(&mut self, a: NormId, b: NormId) -> bool {
        self.insert_symmetric(a, b, EdgeKind::Substitutability)
    }

    /// Relate `a` and `b` as complementary, dropping any substitutability between them.
    pub fn add_complementarity(&mut self, a: NormId, b: NormId) -> bool {
        self.insert_symmetric(a, b, EdgeKind::Complementarity)
    }

    pub fn remove_substitutability(&mut self, a: NormId, b: NormId) -> bool {
        self.remove_symmetric(a, b, EdgeKind::Substitutability)
    }

    pub fn remove_complementarity(&mut self, a: NormId, b: NormId) -> bool {
        self.remove_symmetric(a, b, EdgeKind::Complementarity)
    }

    pub fn are_substitutable(&self, a: NormId, b: NormId) -> bool {
        self.has_edge(a, b, EdgeKind::Substitutability)
    }

    pub fn are_complementary(&self, a: NormId, b: NormId) -> bool {
        self.has_edge(a, b, EdgeKind::Complementarity)
    }

    pub fn substitutes(&self, id: NormId) -> Vec<NormId> {
        self.neighbours(id, EdgeKind::Substitutability)
    }

    pub fn complements(&self, id: NormId) -> Vec<NormId> {
        self.neighbours(id, EdgeKind::Complementarity)
    }

    /// Every stored edge, symmetric relations reported once per direction.
    pub fn edges(&self) -> Vec<NetworkEdge> {
        let mut out: Vec<NetworkEdge> = self
            .edges
            .iter()
            .flat_map(|(&(source, kind), targets)| {
                targets.iter().map(move |&target| NetworkEdge {
                    source,
                    target,
                    kind,
                })
            })
            .collect();
        out.sort_by_key(|e| (e.kind, e.source, e.target));
        out
    }

    // -- Utility --------------------------------------------------------------

    pub fn utility(&self, id: NormId) -> Option<&Utility> {
        self.entry(id).map(|n| &n.utility)
    }

    pub fn set_score(&mut self, id: NormId, dim: Dimension, goal: &Goal, score: f64) {
        if let Some(entry) = self.entry_mut(id) {
            entry.utility.add_score(dim, goal, score);
        }
    }

    pub fn reset_utility(&mut self, id: NormId) {
        if let Some(entry) = self.entry_mut(id) {
            entry.utility.reset();
        }
    }

    /// Record a score observed while `a` and `b` applied together.
    pub fn set_joint_score(&mut self, a: NormId, b: NormId, dim: Dimension, goal: &Goal, score: f64) {
        if a == b || self.entry(a).is_none() || self.entry(b).is_none() {
            return;
        }
        let (goals, settings) = (&self.goals, self.range_settings);
        self.joint
            .entry(pair_key(a, b))
            .or_insert_with(|| Utility::new(goals, settings))
            .add_score(dim, goal, score);
    }

    pub fn joint_utility(&self, a: NormId, b: NormId) -> Option<&Utility> {
        self.joint.get(&pair_key(a, b))
    }

    // -- Attributes -----------------------------------------------------------

    pub fn attributes(&self, id: NormId) -> Option<&BTreeSet<NormAttribute>> {
        self.entry(id).map(|n| &n.attributes)
    }

    pub fn has_attribute(&self, id: NormId, attribute: NormAttribute) -> bool {
        self.entry(id)
            .is_some_and(|n| n.attributes.contains(&attribute))
    }

    /// Assign `attribute`, retracting its dual.
    pub fn add_attribute(&mut self, id: NormId, attribute: NormAttribute) {
        if let Some(entry) = self.entry_mut(id) {
            if let Some(dual) = attribute.dual() {
                entry.attributes.remove(&dual);
            }
            entry.attributes.insert(attribute);
        }
    }

    pub fn remove_attribute(&mut self, id: NormId, attribute: NormAttribute) -> bool {
        self.entry_mut(id)
            .is_some_and(|n| n.attributes.remove(&attribute))
    }

    pub fn clear_attributes(&mut self, id: NormId, attributes: &[NormAttribute]) {
        if let Some(entry) = self.entry_mut(id) {
            for attribute in attributes {
                entry.attributes.remove(attribute);
            }
        }
    }

    // -- Normative system -----------------------------------------------------

    pub fn normative_system(&self) -> &BTreeSet<NormId> {
        &self.normative_system
    }

    pub fn normative_system_norms(&self) -> Vec<Norm> {
        self.normative_system
            .iter()
            .filter_map(|&id| self.norm(id).cloned())
            .collect()
    }

    pub fn is_enforced(&self, id: NormId) -> bool {
        self.normative_system.contains(&id)
    }

    fn recompute_normative_system(&mut self) {
        let omega = Arc::clone(&self.omega);
        let system: BTreeSet<NormId> = self
            .ids()
            .filter(|&id| omega.is_enforced(self, id))
            .collect();
        self.normative_system = system;
    }

    /// Start a new tick: deltas are measured against the current system.
    pub fn begin_tick(&mut self) {
        self.tick_baseline = self.normative_system.clone();
    }

    pub fn normative_system_delta(&self) -> NormativeSystemDelta {
        NormativeSystemDelta {
            added: self
                .normative_system
                .difference(&self.tick_baseline)
                .copied()
                .collect(),
            removed: self
                .tick_baseline
                .difference(&self.normative_system)
                .copied()
                .collect(),
        }
    }

    pub fn has_normative_system_changed(&self) -> bool {
        self.normative_system != self.tick_baseline
    }

    pub fn summary(&self) -> NetworkSummary {
        NetworkSummary {
            nodes: self.len(),
            active: self.active_norms().len(),
            represented: self.represented_norms().len(),
            normative_system: self.normative_system.len(),
            discarded: self
                .nodes
                .iter()
                .filter(|n| n.state == NodeState::Discarded)
                .count(),
            max_level: self.nodes.iter().map(|n| n.level).max().unwrap_or(0),
        }
    }
}
