//! Collaborators the network consumes but does not own.
//!
//! - [`DomainTaxonomy`]: term hierarchy per predicate plus a consistency check.
//! - [`NormMatcher`]: precondition subsumption and applicability.
//! - [`ConflictDetector`] / [`NormGenerator`]: the environment side of a tick.
//!
//! [`TermTaxonomy`] and [`TaxonomyMatcher`] are a small reference
//! implementation good enough for tests, the simulation and most toy domains.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::norm::{Goal, Norm, Precondition};

/// Ground facts describing the state an agent acted in.
pub type Situation = BTreeMap<String, String>;

/// An undesirable situation detected for a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: u64,
    pub goal: Goal,
    pub situation: Situation,
    /// Action whose execution led to the conflict.
    pub action: String,
}

pub trait DomainTaxonomy {
    /// Immediate parent of `term` under `predicate`, if any.
    fn parent_term(&self, predicate: &str, term: &str) -> Option<String>;

    /// Whether every binding names a term the domain knows about.
    fn is_consistent(&self, precondition: &Precondition) -> bool;

    /// `general` equals `specific` or is one of its ancestors.
    fn subsumes_term(&self, predicate: &str, general: &str, specific: &str) -> bool {
        let mut current = Some(specific.to_string());
        let mut guard = 0usize;
        while let Some(term) = current {
            if term == general {
                return true;
            }
            guard += 1;
            if guard > 1024 {
                return false;
            }
            current = self.parent_term(predicate, &term);
        }
        false
    }

    /// Most specific term subsuming both `a` and `b`.
    fn least_common_ancestor(&self, predicate: &str, a: &str, b: &str) -> Option<String> {
        let mut chain = HashSet::new();
        let mut current = Some(a.to_string());
        while let Some(term) = current {
            if !chain.insert(term.clone()) {
                break;
            }
            current = self.parent_term(predicate, &term);
        }
        let mut seen = HashSet::new();
        let mut current = Some(b.to_string());
        while let Some(term) = current {
            if chain.contains(&term) {
                return Some(term);
            }
            if !seen.insert(term.clone()) {
                break;
            }
            current = self.parent_term(predicate, &term);
        }
        None
    }
}

impl<T: DomainTaxonomy + ?Sized> DomainTaxonomy for Arc<T> {
    fn parent_term(&self, predicate: &str, term: &str) -> Option<String> {
        (**self).parent_term(predicate, term)
    }

    fn is_consistent(&self, precondition: &Precondition) -> bool {
        (**self).is_consistent(precondition)
    }
}

pub trait NormMatcher {
    /// `specific`'s precondition satisfies `general`'s: whenever `specific`
    /// applies, `general` applies too. Both must regulate the same behaviour.
    fn satisfies(&self, specific: &Norm, general: &Norm) -> bool;

    /// Whether `norm` applies in `situation`.
    fn applies_to(&self, norm: &Norm, situation: &Situation) -> bool;

    /// Some situation can make both norms apply at once.
    fn overlaps(&self, a: &Norm, b: &Norm) -> bool {
        self.satisfies(a, b) || self.satisfies(b, a)
    }

    fn norms_applicable(&self, norms: &[Norm], situation: &Situation) -> Vec<Norm> {
        norms
            .iter()
            .filter(|n| self.applies_to(n, situation))
            .cloned()
            .collect()
    }
}

/// Produces the conflicts a transition caused for a goal.
pub trait ConflictDetector {
    type Transition;

    fn conflicts(&self, goal: &Goal, transition: &Self::Transition) -> Vec<Conflict>;
}

/// Case-based generation of candidate norms for a conflict.
pub trait NormGenerator {
    fn generate(&self, conflict: &Conflict, taxonomy: &dyn DomainTaxonomy, goal: &Goal)
        -> Vec<Norm>;
}

// ------------------------------------------------------------------
// Reference taxonomy
// ------------------------------------------------------------------

/// Per-predicate term tree, e.g. `color: red -> any-color`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermTaxonomy {
    parents: HashMap<String, HashMap<String, String>>,
    terms: HashMap<String, HashSet<String>>,
}

impl TermTaxonomy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `term` as a child of `parent` (which is registered if new).
    pub fn with_term(mut self, predicate: &str, term: &str, parent: &str) -> Self {
        self.add_term(predicate, term, parent);
        self
    }

    pub fn add_term(&mut self, predicate: &str, term: &str, parent: &str) {
        let known = self.terms.entry(predicate.to_string()).or_default();
        known.insert(term.to_string());
        known.insert(parent.to_string());
        self.parents
            .entry(predicate.to_string())
            .or_default()
            .insert(term.to_string(), parent.to_string());
    }

    pub fn knows(&self, predicate: &str, term: &str) -> bool {
        self.terms
            .get(predicate)
            .is_some_and(|terms| terms.contains(term))
    }

    /// Terms with no children under `predicate`, sorted.
    pub fn leaf_terms(&self, predicate: &str) -> Vec<String> {
        let Some(terms) = self.terms.get(predicate) else {
            return Vec::new();
        };
        let parents: HashSet<&String> = self
            .parents
            .get(predicate)
            .map(|m| m.values().collect())
            .unwrap_or_default();
        let mut leaves: Vec<String> = terms
            .iter()
            .filter(|t| !parents.contains(t))
            .cloned()
            .collect();
        leaves.sort();
        leaves
    }
}

impl DomainTaxonomy for TermTaxonomy {
    fn parent_term(&self, predicate: &str, term: &str) -> Option<String> {
        self.parents.get(predicate)?.get(term).cloned()
    }

    fn is_consistent(&self, precondition: &Precondition) -> bool {
        precondition
            .iter()
            .all(|(predicate, term)| self.knows(predicate, term))
    }
}

/// Subsumption matcher driven by a [`DomainTaxonomy`].
#[derive(Debug, Clone)]
pub struct TaxonomyMatcher<T> {
    taxonomy: T,
}

impl<T: DomainTaxonomy> TaxonomyMatcher<T> {
    pub fn new(taxonomy: T) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &T {
        &self.taxonomy
    }
}

impl<T: DomainTaxonomy> NormMatcher for TaxonomyMatcher<T> {
    fn satisfies(&self, specific: &Norm, general: &Norm) -> bool {
        if !specific.same_effect(general) {
            return false;
        }
        general.precondition().iter().all(|(predicate, general_term)| {
            specific
                .precondition()
                .get(predicate)
                .is_some_and(|term| self.taxonomy.subsumes_term(predicate, general_term, term))
        })
    }

    fn applies_to(&self, norm: &Norm, situation: &Situation) -> bool {
        norm.precondition().iter().all(|(predicate, term)| {
            situation
                .get(predicate)
                .is_some_and(|fact| self.taxonomy.subsumes_term(predicate, term, fact))
        })
    }

    fn overlaps(&self, a: &Norm, b: &Norm) -> bool {
        if !a.same_effect(b) {
            return false;
        }
        a.precondition().iter().all(|(predicate, term_a)| {
            match b.precondition().get(predicate) {
                Some(term_b) => {
                    self.taxonomy.subsumes_term(predicate, term_a, term_b)
                        || self.taxonomy.subsumes_term(predicate, term_b, term_a)
                }
                None => true,
            }
        })
    }
}
