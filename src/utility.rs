//! A node's scorecard: one [`PerformanceRange`] per (dimension × goal).

use std::collections::BTreeMap;

use crate::norm::{Dimension, Goal};
use crate::performance::PerformanceRange;

/// Shape shared by every range the network creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSettings {
    pub capacity: usize,
    pub spread: f64,
    /// Prior for every fresh (or freshly reset) range. Never counts as a sample.
    pub default_score: Option<f64>,
}

impl Default for RangeSettings {
    fn default() -> Self {
        Self {
            capacity: 50,
            spread: 0.1,
            default_score: None,
        }
    }
}

impl RangeSettings {
    fn fresh_range(&self) -> PerformanceRange {
        let range = PerformanceRange::new(self.capacity, self.spread);
        match self.default_score {
            Some(score) => range.with_prior(score),
            None => range,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Utility {
    settings: RangeSettings,
    ranges: BTreeMap<(Dimension, Goal), PerformanceRange>,
}

impl Utility {
    pub fn new(goals: &[Goal], settings: RangeSettings) -> Self {
        let mut ranges = BTreeMap::new();
        for dim in Dimension::ALL {
            for goal in goals {
                ranges.insert((dim, goal.clone()), settings.fresh_range());
            }
        }
        Self { settings, ranges }
    }

    pub fn range(&self, dim: Dimension, goal: &Goal) -> Option<&PerformanceRange> {
        self.ranges.get(&(dim, goal.clone()))
    }

    /// Append a score; goals the table was not built with get a range on demand.
    pub fn add_score(&mut self, dim: Dimension, goal: &Goal, score: f64) {
        let settings = self.settings;
        self.ranges
            .entry((dim, goal.clone()))
            .or_insert_with(|| settings.fresh_range())
            .add_value(score);
    }

    pub fn reset(&mut self) {
        for range in self.ranges.values_mut() {
            *range = self.settings.fresh_range();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &Goal, &PerformanceRange)> + '_ {
        self.ranges
            .iter()
            .map(|((dim, goal), range)| (*dim, goal, range))
    }
}
