//! Classification: derive attribute tags from utility each cycle.
//!
//! Leaves get Effective/Ineffective and Necessary/Unnecessary per dimension.
//! Active norms (leaf or not) may additionally become Generalisable. With
//! relation detection enabled, pairs of Active leaves are compared and
//! related as substitutable or complementary; leaves with neither relation
//! are tagged Exclusive.
//!
//! A range with fewer than `min_samples` values never contributes; a norm
//! without enough evidence stays unclassified until a later cycle.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{BoundaryTable, SynthesisConfig};
use crate::network::{EdgeKind, NodeState, NormAttribute, NormativeNetwork};
use crate::norm::{Dimension, NormId};
use crate::oracle::NormMatcher;

const PERFORMANCE_TAGS: [NormAttribute; 5] = [
    NormAttribute::Effective,
    NormAttribute::Ineffective,
    NormAttribute::Necessary,
    NormAttribute::Unnecessary,
    NormAttribute::Generalisable,
];

const RELATION_TAGS: [NormAttribute; 3] = [
    NormAttribute::Substitutable,
    NormAttribute::Complementary,
    NormAttribute::Exclusive,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationChange {
    pub a: NormId,
    pub b: NormId,
    pub kind: EdgeKind,
    /// The pair flapped too often and the relation was removed.
    pub demoted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationReport {
    pub classified: Vec<NormId>,
    /// Revised norms without enough samples in any range.
    pub insufficient: Vec<NormId>,
    pub generalisable: Vec<NormId>,
    pub failing: Vec<NormId>,
    pub relations: Vec<RelationChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Unknown,
    Unrelated,
    Related(EdgeKind),
}

#[derive(Debug, Clone, Copy, Default)]
struct RelationHistory {
    last: Option<EdgeKind>,
    flips: u32,
}

fn pair_key(a: NormId, b: NormId) -> (NormId, NormId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationEngine {
    boundaries: BoundaryTable,
    min_samples: usize,
    detect_relations: bool,
    max_relation_flips: u32,
    histories: HashMap<(NormId, NormId), RelationHistory>,
    demoted: HashSet<(NormId, NormId)>,
}

impl ClassificationEngine {
    pub fn new(
        boundaries: BoundaryTable,
        min_samples: usize,
        detect_relations: bool,
        max_relation_flips: u32,
    ) -> Self {
        Self {
            boundaries,
            min_samples: min_samples.max(1),
            detect_relations,
            max_relation_flips,
            histories: HashMap::new(),
            demoted: HashSet::new(),
        }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(
            config.boundaries.clone(),
            config.policy.min_samples,
            config.policy.detect_relations,
            config.substitution.max_displacements,
        )
    }

    pub fn boundaries(&self) -> &BoundaryTable {
        &self.boundaries
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Never relate `a` and `b` again.
    pub fn demote(&mut self, a: NormId, b: NormId) {
        self.demoted.insert(pair_key(a, b));
    }

    pub fn is_demoted(&self, a: NormId, b: NormId) -> bool {
        self.demoted.contains(&pair_key(a, b))
    }

    pub fn classify(
        &mut self,
        network: &mut NormativeNetwork,
        matcher: &dyn NormMatcher,
        revised: &[NormId],
    ) -> ClassificationReport {
        let mut report = ClassificationReport::default();
        let unique: BTreeSet<NormId> = revised.iter().copied().collect();
        for &id in &unique {
            if !self.classify_norm(network, id) {
                report.insufficient.push(id);
                continue;
            }
            report.classified.push(id);
            if network.has_attribute(id, NormAttribute::Generalisable) {
                report.generalisable.push(id);
            }
            if network.has_attribute(id, NormAttribute::Ineffective)
                || network.has_attribute(id, NormAttribute::Unnecessary)
            {
                report.failing.push(id);
            }
        }
        if self.detect_relations {
            report.relations = self.detect(network, matcher, &unique);
        }
        report
    }

    /// Recompute the performance tags of one norm. Returns whether any
    /// range had enough samples to draw a conclusion.
    pub fn classify_norm(&self, network: &mut NormativeNetwork, id: NormId) -> bool {
        let Some(utility) = network.utility(id) else {
            return false;
        };
        let leaf = network.is_leaf(id);
        let active = network.state(id) == Some(NodeState::Active);
        let evidenced = utility
            .iter()
            .any(|(_, _, range)| range.num_punctual_values() >= self.min_samples);

        let mut tags = Vec::new();
        if leaf {
            for dim in Dimension::ALL {
                let mut under = false;
                let mut well = false;
                for (_, goal, range) in utility.iter().filter(|(d, _, _)| *d == dim) {
                    if range.num_punctual_values() < self.min_samples {
                        continue;
                    }
                    let boundary = self.boundaries.get(dim, goal);
                    let average = range.current_average();
                    if average <= (boundary.specialisation - boundary.epsilon).max(0.0) {
                        under = true;
                    } else if average >= boundary.specialisation + boundary.epsilon {
                        well = true;
                    }
                }
                if under {
                    tags.push(NormAttribute::under_performing(dim));
                } else if well {
                    tags.push(NormAttribute::well_performing(dim));
                }
            }
        }

        let generalisable = active
            && utility.iter().next().is_some()
            && utility.iter().all(|(dim, goal, range)| {
                range.num_punctual_values() >= self.min_samples
                    && range.current_top_boundary()
                        >= self.boundaries.generalisation_boundary(dim, goal)
            });
        if generalisable {
            tags.push(NormAttribute::Generalisable);
        }

        network.clear_attributes(id, &PERFORMANCE_TAGS);
        if !evidenced {
            debug!(norm = %id, "insufficient evidence to classify");
            return false;
        }
        for tag in tags {
            network.add_attribute(id, tag);
        }
        true
    }

    fn judge(
        &self,
        network: &NormativeNetwork,
        matcher: &dyn NormMatcher,
        a: NormId,
        b: NormId,
    ) -> Verdict {
        let (Some(norm_a), Some(norm_b)) = (network.norm(a), network.norm(b)) else {
            return Verdict::Unknown;
        };
        if !norm_a.same_effect(norm_b) || !matcher.overlaps(norm_a, norm_b) {
            return Verdict::Unrelated;
        }
        let (Some(util_a), Some(util_b)) = (network.utility(a), network.utility(b)) else {
            return Verdict::Unknown;
        };

        let mut evidenced = 0usize;
        let mut all_overlap = true;
        for (dim, goal, range_a) in util_a.iter() {
            let Some(range_b) = util_b.range(dim, goal) else {
                continue;
            };
            if range_a.num_punctual_values() < self.min_samples
                || range_b.num_punctual_values() < self.min_samples
            {
                continue;
            }
            evidenced += 1;
            all_overlap &= range_a.overlaps(range_b);
        }
        if evidenced == 0 {
            return Verdict::Unknown;
        }

        if let Some(joint) = network.joint_utility(a, b) {
            let mut joint_evidence = 0usize;
            let mut beats_both = true;
            for (dim, goal, joint_range) in joint.iter() {
                if joint_range.num_punctual_values() < self.min_samples {
                    continue;
                }
                let (Some(range_a), Some(range_b)) = (util_a.range(dim, goal), util_b.range(dim, goal))
                else {
                    continue;
                };
                if range_a.num_punctual_values() < self.min_samples
                    || range_b.num_punctual_values() < self.min_samples
                {
                    continue;
                }
                joint_evidence += 1;
                let best = range_a.current_average().max(range_b.current_average());
                let epsilon = self.boundaries.boundary_epsilon(dim, goal);
                beats_both &= joint_range.current_average() >= best + epsilon;
            }
            if joint_evidence > 0 && beats_both {
                return Verdict::Related(EdgeKind::Complementarity);
            }
        }

        if all_overlap {
            Verdict::Related(EdgeKind::Substitutability)
        } else {
            Verdict::Unrelated
        }
    }

    fn detect(
        &mut self,
        network: &mut NormativeNetwork,
        matcher: &dyn NormMatcher,
        focus: &BTreeSet<NormId>,
    ) -> Vec<RelationChange> {
        let leaves: Vec<NormId> = network
            .active_norms()
            .into_iter()
            .filter(|&id| network.is_leaf(id))
            .collect();
        let mut seen = HashSet::new();
        let mut changes = Vec::new();

        for &a in leaves.iter().filter(|id| focus.contains(id)) {
            for &b in &leaves {
                let key = pair_key(a, b);
                if a == b || !seen.insert(key) || self.demoted.contains(&key) {
                    continue;
                }
                match self.judge(network, matcher, key.0, key.1) {
                    Verdict::Unknown => {}
                    Verdict::Unrelated => {
                        network.remove_substitutability(key.0, key.1);
                        network.remove_complementarity(key.0, key.1);
                    }
                    Verdict::Related(kind) => {
                        if let Some(change) = self.relate(network, key, kind) {
                            changes.push(change);
                        }
                    }
                }
            }
        }

        for &id in &leaves {
            network.clear_attributes(id, &RELATION_TAGS);
            let substitutable = !network.substitutes(id).is_empty();
            let complementary = !network.complements(id).is_empty();
            if substitutable {
                network.add_attribute(id, NormAttribute::Substitutable);
            }
            if complementary {
                network.add_attribute(id, NormAttribute::Complementary);
            }
            if !substitutable && !complementary {
                network.add_attribute(id, NormAttribute::Exclusive);
            }
        }
        changes
    }

    fn relate(
        &mut self,
        network: &mut NormativeNetwork,
        key: (NormId, NormId),
        kind: EdgeKind,
    ) -> Option<RelationChange> {
        let (a, b) = key;
        let history = self.histories.entry(key).or_default();
        if history.last.is_some_and(|last| last != kind) {
            history.flips += 1;
        }
        history.last = Some(kind);

        if history.flips > self.max_relation_flips {
            warn!(a = %a, b = %b, flips = history.flips, "relation keeps flapping; demoted");
            network.remove_substitutability(a, b);
            network.remove_complementarity(a, b);
            self.demoted.insert(key);
            return Some(RelationChange {
                a,
                b,
                kind,
                demoted: true,
            });
        }

        let added = match kind {
            EdgeKind::Substitutability => network.add_substitutability(a, b),
            EdgeKind::Complementarity => network.add_complementarity(a, b),
            EdgeKind::Generalisation => false,
        };
        if !added {
            return None;
        }
        debug!(a = %a, b = %b, kind = ?kind, "relation detected");
        Some(RelationChange {
            a,
            b,
            kind,
            demoted: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Boundary;
    use crate::norm::{Goal, Modality, Norm};
    use crate::oracle::{TaxonomyMatcher, TermTaxonomy};
    use crate::utility::RangeSettings;

    fn goal() -> Goal {
        Goal::from("safety")
    }

    fn network() -> NormativeNetwork {
        NormativeNetwork::new(vec![goal()], RangeSettings::default())
    }

    fn matcher() -> TaxonomyMatcher<TermTaxonomy> {
        TaxonomyMatcher::new(
            TermTaxonomy::new()
                .with_term("color", "red", "any-color")
                .with_term("color", "blue", "any-color")
                .with_term("pos", "left", "any-pos"),
        )
    }

    fn engine(detect: bool) -> ClassificationEngine {
        let table = BoundaryTable::uniform(Boundary {
            specialisation: 0.5,
            generalisation: 0.7,
            epsilon: 0.05,
        });
        ClassificationEngine::new(table, 5, detect, 2)
    }

    fn score(net: &mut NormativeNetwork, id: NormId, dim: Dimension, value: f64, n: usize) {
        for _ in 0..n {
            net.set_score(id, dim, &goal(), value);
        }
    }

    #[test]
    fn too_few_samples_leave_norm_unclassified() {
        let mut net = network();
        let id = net.add(Norm::new([("color", "red")], Modality::Prohibition, "enter"));
        net.set_state(id, NodeState::Active);
        score(&mut net, id, Dimension::Effectiveness, 0.0, 4);

        let report = engine(false).classify(&mut net, &matcher(), &[id]);
        assert_eq!(report.insufficient, vec![id]);
        assert!(net.attributes(id).unwrap().is_empty());
    }

    #[test]
    fn default_score_is_not_evidence() {
        let settings = RangeSettings {
            default_score: Some(0.0),
            ..RangeSettings::default()
        };
        let mut net = NormativeNetwork::new(vec![goal()], settings);
        let id = net.add(Norm::new([("color", "red")], Modality::Prohibition, "enter"));
        net.set_state(id, NodeState::Active);
        let mut engine = ClassificationEngine::new(BoundaryTable::default(), 1, false, 2);

        let report = engine.classify(&mut net, &matcher(), &[id]);
        assert_eq!(report.insufficient, vec![id]);
        assert!(report.failing.is_empty());
        assert!(!net.has_attribute(id, NormAttribute::Ineffective));

        // One real observation is enough at min_samples = 1; the prior
        // still pulls the average down.
        score(&mut net, id, Dimension::Effectiveness, 1.0, 1);
        let report = engine.classify(&mut net, &matcher(), &[id]);
        assert_eq!(report.classified, vec![id]);
        assert!(net.has_attribute(id, NormAttribute::Effective));
    }

    #[test]
    fn axes_are_classified_independently() {
        let mut net = network();
        let id = net.add(Norm::new([("color", "red")], Modality::Prohibition, "enter"));
        net.set_state(id, NodeState::Active);
        score(&mut net, id, Dimension::Effectiveness, 0.1, 10);
        score(&mut net, id, Dimension::Necessity, 0.9, 10);

        let report = engine(false).classify(&mut net, &matcher(), &[id]);
        assert_eq!(report.failing, vec![id]);
        assert!(net.has_attribute(id, NormAttribute::Ineffective));
        assert!(net.has_attribute(id, NormAttribute::Necessary));
        assert!(!net.has_attribute(id, NormAttribute::Generalisable));

        // Recovered effectiveness flips the axis without touching necessity.
        score(&mut net, id, Dimension::Effectiveness, 1.0, 50);
        engine(false).classify(&mut net, &matcher(), &[id]);
        assert!(net.has_attribute(id, NormAttribute::Effective));
        assert!(!net.has_attribute(id, NormAttribute::Ineffective));
        assert!(net.has_attribute(id, NormAttribute::Necessary));
        assert!(net.has_attribute(id, NormAttribute::Generalisable));
    }

    #[test]
    fn general_norms_only_get_generalisable() {
        let mut net = network();
        let child = net.add(Norm::new([("color", "red")], Modality::Prohibition, "enter"));
        let parent = net.add(Norm::new([("color", "any-color")], Modality::Prohibition, "enter"));
        net.add_generalisation(child, parent);
        net.set_state(parent, NodeState::Active);
        score(&mut net, parent, Dimension::Effectiveness, 1.0, 10);
        score(&mut net, parent, Dimension::Necessity, 1.0, 10);

        engine(false).classify(&mut net, &matcher(), &[parent]);
        let attrs = net.attributes(parent).unwrap();
        assert!(attrs.contains(&NormAttribute::Generalisable));
        assert!(!attrs.contains(&NormAttribute::Effective));
    }

    #[test]
    fn overlapping_equivalent_leaves_become_substitutable() {
        let mut net = network();
        let a = net.add(Norm::new([("color", "red")], Modality::Prohibition, "enter"));
        let b = net.add(Norm::new([("pos", "left")], Modality::Prohibition, "enter"));
        let c = net.add(Norm::new([("color", "blue")], Modality::Prohibition, "enter"));
        for id in [a, b, c] {
            net.set_state(id, NodeState::Active);
            score(&mut net, id, Dimension::Effectiveness, 0.8, 10);
        }

        let report = engine(true).classify(&mut net, &matcher(), &[a, b, c]);
        assert!(net.are_substitutable(a, b));
        assert!(net.are_substitutable(b, c));
        // red and blue never apply together.
        assert!(!net.are_substitutable(a, c));
        assert_eq!(report.relations.len(), 2);
        assert!(net.has_attribute(a, NormAttribute::Substitutable));
    }

    #[test]
    fn joint_gain_makes_pair_complementary_and_flapping_demotes() {
        let mut net = network();
        let a = net.add(Norm::new([("color", "red")], Modality::Prohibition, "enter"));
        let b = net.add(Norm::new([("pos", "left")], Modality::Prohibition, "enter"));
        for id in [a, b] {
            net.set_state(id, NodeState::Active);
            score(&mut net, id, Dimension::Effectiveness, 0.6, 10);
        }
        for _ in 0..10 {
            net.set_joint_score(a, b, Dimension::Effectiveness, &goal(), 1.0);
        }
        let mut engine = engine(true);
        engine.classify(&mut net, &matcher(), &[a]);
        assert!(net.are_complementary(a, b));
        assert!(!net.are_substitutable(a, b));

        // Alternate the joint evidence so the verdict keeps flipping.
        let mut demoted = false;
        for round in 0..6 {
            let value = if round % 2 == 0 { 0.6 } else { 1.0 };
            for _ in 0..50 {
                net.set_joint_score(a, b, Dimension::Effectiveness, &goal(), value);
            }
            let report = engine.classify(&mut net, &matcher(), &[a]);
            demoted |= report.relations.iter().any(|r| r.demoted);
        }
        assert!(demoted);
        assert!(engine.is_demoted(a, b));
        assert!(!net.are_substitutable(a, b) && !net.are_complementary(a, b));
        assert!(net.has_attribute(a, NormAttribute::Exclusive));
    }
}
