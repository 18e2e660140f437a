//! Norm identity and the small value types shared by every other module.
//!
//! A [`Norm`] is identified by its content alone: precondition, modality and
//! target action. Numeric [`NormId`]s are handed out by the network on first
//! insertion and are only a lookup key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Predicate → term bindings. Ordered so that equal preconditions hash and
/// print identically regardless of insertion order.
pub type Precondition = BTreeMap<String, String>;

/// Arena index of a node inside a [`crate::network::NormativeNetwork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormId(pub u32);

impl NormId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Obligation,
    Prohibition,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Obligation => write!(f, "OBL"),
            Modality::Prohibition => write!(f, "PRH"),
        }
    }
}

/// Evaluation axis for a norm's utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Does compliance avoid conflicts?
    Effectiveness,
    /// Does infringement cause conflicts?
    Necessity,
}

impl Dimension {
    pub const ALL: [Dimension; 2] = [Dimension::Effectiveness, Dimension::Necessity];
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Effectiveness => write!(f, "effectiveness"),
            Dimension::Necessity => write!(f, "necessity"),
        }
    }
}

/// A system-level objective norms are scored against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Goal(pub String);

impl Goal {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Goal {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability shared by everything the network can hold.
pub trait NetworkNode {
    fn description(&self) -> String;
}

/// A candidate behavioural rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Norm {
    precondition: Precondition,
    modality: Modality,
    action: String,
}

impl Norm {
    pub fn new<K, V>(
        precondition: impl IntoIterator<Item = (K, V)>,
        modality: Modality,
        action: impl Into<String>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            precondition: precondition
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            modality,
            action: action.into(),
        }
    }

    pub fn from_precondition(
        precondition: Precondition,
        modality: Modality,
        action: impl Into<String>,
    ) -> Self {
        Self {
            precondition,
            modality,
            action: action.into(),
        }
    }

    pub fn precondition(&self) -> &Precondition {
        &self.precondition
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Same modality and action: the norms regulate the same behaviour.
    pub fn same_effect(&self, other: &Norm) -> bool {
        self.modality == other.modality && self.action == other.action
    }

    /// Copy of this norm with a different precondition.
    pub fn with_precondition(&self, precondition: Precondition) -> Norm {
        Norm {
            precondition,
            modality: self.modality,
            action: self.action.clone(),
        }
    }
}

impl NetworkNode for Norm {
    fn description(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Norm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IF ")?;
        if self.precondition.is_empty() {
            write!(f, "true")?;
        }
        for (idx, (predicate, term)) in self.precondition.iter().enumerate() {
            if idx > 0 {
                write!(f, " & ")?;
            }
            write!(f, "{predicate}({term})")?;
        }
        write!(f, " THEN {}({})", self.modality, self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_binding_order() {
        let a = Norm::new([("color", "red"), ("pos", "left")], Modality::Prohibition, "enter");
        let b = Norm::new([("pos", "left"), ("color", "red")], Modality::Prohibition, "enter");
        assert_eq!(a, b);
        assert_eq!(a.description(), "IF color(red) & pos(left) THEN PRH(enter)");
    }

    #[test]
    fn modality_is_part_of_identity() {
        let a = Norm::new([("color", "red")], Modality::Prohibition, "enter");
        let b = Norm::new([("color", "red")], Modality::Obligation, "enter");
        assert_ne!(a, b);
        assert!(!a.same_effect(&b));
    }
}
