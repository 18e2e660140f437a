//! Synthesis configuration, strategy presets and JSON loading.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::OmegaSpec;
use crate::norm::{Dimension, Goal};
use crate::utility::RangeSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
    #[error("unknown strategy preset '{name}' (expected one of: {})", StrategyPolicy::preset_names().join(", "))]
    UnknownPreset { name: String },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

// ------------------------------------------------------------------
// Boundaries
// ------------------------------------------------------------------

/// Thresholds for one (dimension, goal) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    /// Averages at or below `specialisation - epsilon` mark a norm under-performing.
    pub specialisation: f64,
    /// Top boundaries at or above this make an Active norm generalisable.
    pub generalisation: f64,
    pub epsilon: f64,
}

impl Default for Boundary {
    fn default() -> Self {
        Self {
            specialisation: 0.3,
            generalisation: 0.7,
            epsilon: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryOverride {
    pub dimension: Dimension,
    pub goal: Goal,
    #[serde(flatten)]
    pub boundary: Boundary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryTable {
    pub default: Boundary,
    pub overrides: Vec<BoundaryOverride>,
}

impl BoundaryTable {
    pub fn uniform(boundary: Boundary) -> Self {
        Self {
            default: boundary,
            overrides: Vec::new(),
        }
    }

    pub fn with_override(mut self, dimension: Dimension, goal: Goal, boundary: Boundary) -> Self {
        self.overrides.retain(|o| !(o.dimension == dimension && o.goal == goal));
        self.overrides.push(BoundaryOverride {
            dimension,
            goal,
            boundary,
        });
        self
    }

    pub fn get(&self, dimension: Dimension, goal: &Goal) -> Boundary {
        self.overrides
            .iter()
            .find(|o| o.dimension == dimension && &o.goal == goal)
            .map(|o| o.boundary)
            .unwrap_or(self.default)
    }

    pub fn specialisation_boundary(&self, dimension: Dimension, goal: &Goal) -> f64 {
        self.get(dimension, goal).specialisation
    }

    pub fn generalisation_boundary(&self, dimension: Dimension, goal: &Goal) -> f64 {
        self.get(dimension, goal).generalisation
    }

    pub fn boundary_epsilon(&self, dimension: Dimension, goal: &Goal) -> f64 {
        self.get(dimension, goal).epsilon
    }

    fn all(&self) -> impl Iterator<Item = &Boundary> {
        std::iter::once(&self.default).chain(self.overrides.iter().map(|o| &o.boundary))
    }
}

// ------------------------------------------------------------------
// Strategy policy
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneralisationMode {
    /// Merge the revised norm with its peers once.
    Shallow,
    /// Keep merging freshly created parents until nothing new appears.
    Deep,
}

/// The knobs that distinguish one synthesis strategy from another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyPolicy {
    pub generalisation_mode: GeneralisationMode,
    /// Maximum number of differing bindings two norms may have and still merge.
    pub generalisation_step: usize,
    /// Generate norms for every conflict, not only unregulated ones.
    pub reactive_to_conflicts: bool,
    /// Samples a range needs before it is classified.
    pub min_samples: usize,
    /// Detect substitutability / complementarity between leaves.
    pub detect_relations: bool,
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self::iron()
    }
}

impl StrategyPolicy {
    pub fn iron() -> Self {
        Self {
            generalisation_mode: GeneralisationMode::Shallow,
            generalisation_step: 1,
            reactive_to_conflicts: true,
            min_samples: 10,
            detect_relations: false,
        }
    }

    pub fn simon() -> Self {
        Self {
            generalisation_step: 2,
            reactive_to_conflicts: false,
            ..Self::iron()
        }
    }

    pub fn simon_plus() -> Self {
        Self {
            generalisation_mode: GeneralisationMode::Deep,
            ..Self::simon()
        }
    }

    pub fn lion() -> Self {
        Self {
            detect_relations: true,
            ..Self::simon_plus()
        }
    }

    pub fn preset_names() -> &'static [&'static str] {
        &["iron", "lion", "simon", "simon_plus"]
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "iron" => Some(Self::iron()),
            "simon" => Some(Self::simon()),
            "simon_plus" | "simon+" => Some(Self::simon_plus()),
            "lion" => Some(Self::lion()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstitutionConfig {
    /// Displacements within one pair beyond which the relation is dropped.
    pub max_displacements: u32,
    /// Geometric decay applied per ancestor hop in substitution indices.
    pub index_decay: f64,
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self {
            max_displacements: 5,
            index_decay: 0.5,
        }
    }
}

// ------------------------------------------------------------------
// Top-level config
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub goals: Vec<Goal>,
    pub performance_range_size: usize,
    pub range_spread: f64,
    pub default_score: Option<f64>,
    pub boundaries: BoundaryTable,
    /// Named preset applied over `policy` when loading.
    pub preset: Option<String>,
    pub policy: StrategyPolicy,
    pub substitution: SubstitutionConfig,
    /// Consecutive quiet ticks required to report convergence.
    pub convergence_ticks: usize,
    pub omega: OmegaSpec,
    pub rng_seed: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            goals: vec![Goal::from("default")],
            performance_range_size: 50,
            range_spread: 0.1,
            default_score: None,
            boundaries: BoundaryTable::default(),
            preset: None,
            policy: StrategyPolicy::default(),
            substitution: SubstitutionConfig::default(),
            convergence_ticks: 10,
            omega: OmegaSpec::default(),
            rng_seed: 1337,
        }
    }
}

impl SynthesisConfig {
    pub fn range_settings(&self) -> RangeSettings {
        RangeSettings {
            capacity: self.performance_range_size,
            spread: self.range_spread,
            default_score: self.default_score,
        }
    }

    /// Replace `policy` with the named preset, if one is set.
    pub fn apply_preset(&mut self) -> Result<(), ConfigError> {
        if let Some(name) = self.preset.as_deref() {
            self.policy = StrategyPolicy::preset(name).ok_or_else(|| ConfigError::UnknownPreset {
                name: name.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.goals.is_empty() {
            return Err(ConfigError::invalid("goals", "at least one goal is required"));
        }
        if self.goals.iter().any(|g| g.as_str().trim().is_empty()) {
            return Err(ConfigError::invalid("goals", "goal names must be non-empty"));
        }
        if self.performance_range_size == 0 {
            return Err(ConfigError::invalid("performance_range_size", "must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.range_spread) {
            return Err(ConfigError::invalid("range_spread", "must be in [0,1]"));
        }
        if let Some(score) = self.default_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(ConfigError::invalid("default_score", "must be in [0,1]"));
            }
        }
        for b in self.boundaries.all() {
            if !(0.0..=1.0).contains(&b.specialisation) || !(0.0..=1.0).contains(&b.generalisation) {
                return Err(ConfigError::invalid("boundaries", "thresholds must be in [0,1]"));
            }
            if b.epsilon < 0.0 {
                return Err(ConfigError::invalid("boundaries", "epsilon must be >= 0"));
            }
            if b.generalisation < b.specialisation {
                return Err(ConfigError::invalid(
                    "boundaries",
                    "generalisation threshold must not be below specialisation",
                ));
            }
        }
        if self.policy.generalisation_step == 0 {
            return Err(ConfigError::invalid("policy.generalisation_step", "must be >= 1"));
        }
        if self.policy.min_samples == 0 {
            return Err(ConfigError::invalid("policy.min_samples", "must be >= 1"));
        }
        if self.substitution.max_displacements == 0 {
            return Err(ConfigError::invalid("substitution.max_displacements", "must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.substitution.index_decay) {
            return Err(ConfigError::invalid("substitution.index_decay", "must be in [0,1]"));
        }
        if self.convergence_ticks == 0 {
            return Err(ConfigError::invalid("convergence_ticks", "must be >= 1"));
        }
        Ok(())
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: SynthesisConfig = serde_json::from_str(raw)?;
        config.apply_preset()?;
        config.validate()?;
        Ok(config)
    }
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<SynthesisConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    SynthesisConfig::from_json_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SynthesisConfig::default().validate().unwrap();
    }

    #[test]
    fn overrides_take_precedence() {
        let goal = Goal::from("safety");
        let table = BoundaryTable::default().with_override(
            Dimension::Necessity,
            goal.clone(),
            Boundary {
                specialisation: 0.5,
                generalisation: 0.9,
                epsilon: 0.01,
            },
        );
        assert_eq!(table.specialisation_boundary(Dimension::Necessity, &goal), 0.5);
        assert_eq!(table.boundary_epsilon(Dimension::Necessity, &goal), 0.01);
        assert_eq!(table.specialisation_boundary(Dimension::Effectiveness, &goal), 0.3);
    }

    #[test]
    fn preset_replaces_policy_on_load() {
        let config = SynthesisConfig::from_json_str(r#"{"preset": "lion", "goals": ["safety"]}"#)
            .unwrap();
        assert_eq!(config.policy, StrategyPolicy::lion());
        assert_eq!(config.goals, vec![Goal::from("safety")]);
    }

    #[test]
    fn rejects_unknown_preset_and_bad_values() {
        let err = SynthesisConfig::from_json_str(r#"{"preset": "wolf"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPreset { .. }));

        let err = SynthesisConfig::from_json_str(r#"{"range_spread": 2.0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "range_spread", .. }));

        let err = SynthesisConfig::from_json_str(
            r#"{"boundaries": {"default": {"specialisation": 0.8, "generalisation": 0.5, "epsilon": 0.0}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "boundaries", .. }));
    }
}
