//! Omega functions: projections of network state onto the enforced rule set.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{NodeState, NormativeNetwork};
use crate::norm::NormId;

/// Decides which norms make up the normative system.
pub trait OmegaFunction: fmt::Debug + Send + Sync {
    fn is_enforced(&self, network: &NormativeNetwork, id: NormId) -> bool;

    fn describe(&self) -> &'static str;
}

/// A norm is enforced iff it is Active.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveOmega;

impl OmegaFunction for ActiveOmega {
    fn is_enforced(&self, network: &NormativeNetwork, id: NormId) -> bool {
        network.state(id) == Some(NodeState::Active)
    }

    fn describe(&self) -> &'static str {
        "active"
    }
}

/// A norm is enforced iff it is represented (Active itself or via an ancestor).
#[derive(Debug, Clone, Copy, Default)]
pub struct RepresentedOmega;

impl OmegaFunction for RepresentedOmega {
    fn is_enforced(&self, network: &NormativeNetwork, id: NormId) -> bool {
        network.is_represented(id)
    }

    fn describe(&self) -> &'static str {
        "represented"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmegaSpec {
    #[default]
    Active,
    Represented,
}

pub fn omega_from_spec(spec: OmegaSpec) -> Arc<dyn OmegaFunction> {
    match spec {
        OmegaSpec::Active => Arc::new(ActiveOmega),
        OmegaSpec::Represented => Arc::new(RepresentedOmega),
    }
}
