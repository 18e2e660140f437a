#![forbid(unsafe_code)]

//! # normative-network
//!
//! Incremental synthesis of a minimal normative system for a population of
//! agents.
//!
//! Every norm ever proposed lives in a [`NormativeNetwork`]: a DAG of
//! generalisation edges plus symmetric substitutability and complementarity
//! relations, with a lifecycle state, a sliding-window scorecard and a set of
//! derived attribute tags per node. Each tick the [`NormSynthesizer`] turns
//! conflicts into candidate norms, scores what happened when agents met the
//! enforced ones, classifies them and lets the [`RefinementEngine`] merge
//! well-performing norms into broader parents, split failing ones back into
//! their children and fold redundant pairs.
//!
//! Conflict detection, precondition matching and norm generation are
//! collaborators behind the traits in [`oracle`]; a small term taxonomy and
//! the junction world in [`simulation`] cover tests and the CLI demo.

pub mod classification;
pub mod config;
pub mod lifecycle;
pub mod network;
pub mod norm;
pub mod oracle;
pub mod performance;
pub mod refinement;
pub mod simulation;
pub mod synthesis;
pub mod trace;
pub mod utility;

pub use classification::{ClassificationEngine, ClassificationReport, RelationChange};
pub use config::{
    load_config_from_path, Boundary, BoundaryTable, ConfigError, GeneralisationMode,
    StrategyPolicy, SubstitutionConfig, SynthesisConfig,
};
pub use network::{
    EdgeKind, NetworkEdge, NetworkSummary, NodeState, NormAttribute, NormativeNetwork,
    NormativeSystemDelta, OmegaFunction, OmegaSpec,
};
pub use norm::{Dimension, Goal, Modality, NetworkNode, Norm, NormId, Precondition};
pub use oracle::{
    Conflict, ConflictDetector, DomainTaxonomy, NormGenerator, NormMatcher, Situation,
    TaxonomyMatcher, TermTaxonomy,
};
pub use performance::PerformanceRange;
pub use refinement::{
    generalisable_norms, specialise_down, try_merge, MergeOutcome, MergeRejection,
    RefinementEngine, RefinementReport, SplitOutcome, SubstitutionOutcome, TieBreakRule,
};
pub use synthesis::{ConvergenceTracker, NormOutcome, NormSynthesizer, TickInput, TickReport};
pub use trace::{JsonlTraceSink, TickTrace, TraceError, TraceSink, TraceWorker};
pub use utility::{RangeSettings, Utility};
