//! Per-tick driver: conflicts in, refined normative system out.
//!
//! One [`NormSynthesizer::step`] runs a full cycle to completion:
//! 1. generate candidate norms for conflicts, insert, link and activate them
//! 2. score the evaluation outcomes reported by the environment
//! 3. classify the revised norms
//! 4. refine (split failing norms, merge generalisable ones, resolve substitutions)
//! 5. diff the normative system against the start of the tick and update convergence

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classification::{ClassificationEngine, ClassificationReport};
use crate::config::{ConfigError, SynthesisConfig};
use crate::lifecycle;
use crate::network::{
    omega_from_spec, NetworkSummary, NodeState, NormativeNetwork, NormativeSystemDelta,
};
use crate::norm::{Dimension, Goal, Norm, NormId};
use crate::oracle::{Conflict, DomainTaxonomy, NormGenerator, NormMatcher, Situation};
use crate::refinement::{RefinementEngine, RefinementReport};

/// What happened when one agent met one enforced norm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormOutcome {
    pub norm: Norm,
    pub goal: Goal,
    /// Groups outcomes observed together (one agent, one tick).
    pub context: u64,
    pub situation: Situation,
    pub complied: bool,
    /// A conflict for `goal` followed.
    pub conflict: bool,
}

/// Effectiveness on compliance, Necessity on infringement.
fn outcome_score(complied: bool, conflict: bool) -> (Dimension, f64) {
    if complied {
        (Dimension::Effectiveness, if conflict { 0.0 } else { 1.0 })
    } else {
        (Dimension::Necessity, if conflict { 1.0 } else { 0.0 })
    }
}

impl NormOutcome {
    pub fn score(&self) -> (Dimension, f64) {
        outcome_score(self.complied, self.conflict)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickInput {
    pub conflicts: Vec<Conflict>,
    pub outcomes: Vec<NormOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub conflicts: usize,
    /// Conflicts no enforced norm regulated when they happened.
    pub unregulated: usize,
    pub generated: Vec<NormId>,
    pub revised: Vec<NormId>,
    pub classification: ClassificationReport,
    pub refinement: RefinementReport,
    pub delta: NormativeSystemDelta,
    pub summary: NetworkSummary,
    pub quiet_ticks: usize,
    pub converged: bool,
}

/// Converged once `required` consecutive ticks pass with no change to the
/// normative system and no unregulated conflict.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    required: usize,
    quiet: usize,
    converged_at: Option<u64>,
}

impl ConvergenceTracker {
    pub fn new(required: usize) -> Self {
        Self {
            required: required.max(1),
            quiet: 0,
            converged_at: None,
        }
    }

    pub fn observe(&mut self, tick: u64, changed: bool, unregulated: usize) -> bool {
        if changed || unregulated > 0 {
            self.quiet = 0;
            self.converged_at = None;
            return false;
        }
        self.quiet += 1;
        if self.quiet >= self.required && self.converged_at.is_none() {
            self.converged_at = Some(tick);
        }
        self.is_converged()
    }

    pub fn quiet_ticks(&self) -> usize {
        self.quiet
    }

    pub fn is_converged(&self) -> bool {
        self.quiet >= self.required
    }

    /// Tick at which the current quiet streak reached the threshold.
    pub fn converged_at(&self) -> Option<u64> {
        self.converged_at
    }
}

pub struct NormSynthesizer {
    config: SynthesisConfig,
    network: NormativeNetwork,
    classifier: ClassificationEngine,
    refiner: RefinementEngine,
    convergence: ConvergenceTracker,
    matcher: Arc<dyn NormMatcher>,
    taxonomy: Arc<dyn DomainTaxonomy>,
    generator: Arc<dyn NormGenerator>,
    tick: u64,
}

impl NormSynthesizer {
    pub fn new(
        config: SynthesisConfig,
        matcher: Arc<dyn NormMatcher>,
        taxonomy: Arc<dyn DomainTaxonomy>,
        generator: Arc<dyn NormGenerator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let network = NormativeNetwork::with_omega(
            config.goals.clone(),
            config.range_settings(),
            omega_from_spec(config.omega),
        );
        Ok(Self {
            classifier: ClassificationEngine::from_config(&config),
            refiner: RefinementEngine::from_config(&config),
            convergence: ConvergenceTracker::new(config.convergence_ticks),
            network,
            config,
            matcher,
            taxonomy,
            generator,
            tick: 0,
        })
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn network(&self) -> &NormativeNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut NormativeNetwork {
        &mut self.network
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn convergence(&self) -> &ConvergenceTracker {
        &self.convergence
    }

    pub fn is_converged(&self) -> bool {
        self.convergence.is_converged()
    }

    pub fn normative_system(&self) -> Vec<Norm> {
        self.network.normative_system_norms()
    }

    /// Enforced norms that apply in `situation`.
    pub fn applicable_norms(&self, situation: &Situation) -> Vec<Norm> {
        self.matcher
            .norms_applicable(&self.network.normative_system_norms(), situation)
    }

    fn is_regulated(&self, conflict: &Conflict) -> bool {
        self.network.normative_system_norms().iter().any(|norm| {
            norm.action() == conflict.action && self.matcher.applies_to(norm, &conflict.situation)
        })
    }

    fn handle_conflicts(&mut self, conflicts: &[Conflict]) -> (usize, Vec<NormId>) {
        let mut unregulated = 0usize;
        let mut generated = Vec::new();
        for conflict in conflicts {
            let regulated = self.is_regulated(conflict);
            if !regulated {
                unregulated += 1;
            }
            if regulated && !self.config.policy.reactive_to_conflicts {
                continue;
            }
            let candidates =
                self.generator
                    .generate(conflict, self.taxonomy.as_ref(), &conflict.goal);
            for norm in candidates {
                let fresh = !self.network.contains(&norm);
                let id = lifecycle::add(&mut self.network, norm);
                if fresh {
                    lifecycle::link(&mut self.network, self.matcher.as_ref(), id);
                    generated.push(id);
                }
                // Discarded norms only come back through a merge.
                if self.network.state(id) != Some(NodeState::Discarded)
                    && lifecycle::activate(&mut self.network, id)
                {
                    lifecycle::retire_covered(&mut self.network, id);
                }
            }
        }
        (unregulated, generated)
    }

    /// Represented descendants of `id` that also apply in `situation`.
    fn applicable_descendants(&self, id: NormId, situation: &Situation) -> Vec<NormId> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut queue = VecDeque::from(self.network.children(id));
        while let Some(node) = queue.pop_front() {
            if !seen.insert(node) {
                continue;
            }
            let applies = self
                .network
                .norm(node)
                .is_some_and(|n| self.matcher.applies_to(n, situation));
            if !applies || !self.network.is_represented(node) {
                continue;
            }
            out.push(node);
            queue.extend(self.network.children(node));
        }
        out
    }

    fn score_outcomes(&mut self, outcomes: &[NormOutcome]) -> Vec<NormId> {
        let mut revised = BTreeSet::new();
        let mut by_context: BTreeMap<(u64, &Goal, bool), Vec<NormId>> = BTreeMap::new();
        for outcome in outcomes {
            let Some(id) = self.network.id_of(&outcome.norm) else {
                debug!(norm = %outcome.norm, "outcome for unknown norm ignored");
                continue;
            };
            let (dim, score) = outcome.score();
            let mut targets = vec![id];
            targets.extend(self.applicable_descendants(id, &outcome.situation));
            for target in targets {
                self.network.set_score(target, dim, &outcome.goal, score);
                revised.insert(target);
            }
            by_context
                .entry((outcome.context, &outcome.goal, outcome.complied))
                .or_default()
                .push(id);
        }

        let conflicted: BTreeSet<(u64, &Goal)> = outcomes
            .iter()
            .filter(|o| o.conflict)
            .map(|o| (o.context, &o.goal))
            .collect();
        for ((context, goal, complied), ids) in by_context {
            let (dim, score) = outcome_score(complied, conflicted.contains(&(context, goal)));
            for (i, &a) in ids.iter().enumerate() {
                for &b in &ids[i + 1..] {
                    self.network.set_joint_score(a, b, dim, goal, score);
                }
            }
        }
        revised.into_iter().collect()
    }

    /// Run one synthesis cycle.
    pub fn step(&mut self, input: TickInput) -> TickReport {
        self.tick += 1;
        self.network.begin_tick();

        let (unregulated, generated) = self.handle_conflicts(&input.conflicts);
        let revised = self.score_outcomes(&input.outcomes);

        let classification =
            self.classifier
                .classify(&mut self.network, self.matcher.as_ref(), &revised);
        let refinement = self.refiner.refine(
            &mut self.network,
            self.matcher.as_ref(),
            self.taxonomy.as_ref(),
            &revised,
        );
        for outcome in refinement.substitutions.iter().filter(|s| s.relation_dropped) {
            self.classifier.demote(outcome.kept, outcome.folded);
        }

        let delta = self.network.normative_system_delta();
        let converged = self
            .convergence
            .observe(self.tick, !delta.is_empty(), unregulated);
        if !delta.is_empty() {
            info!(
                tick = self.tick,
                added = delta.added.len(),
                removed = delta.removed.len(),
                "normative system changed"
            );
        }

        TickReport {
            tick: self.tick,
            conflicts: input.conflicts.len(),
            unregulated,
            generated,
            revised,
            classification,
            refinement,
            delta,
            summary: self.network.summary(),
            quiet_ticks: self.convergence.quiet_ticks(),
            converged,
        }
    }
}
