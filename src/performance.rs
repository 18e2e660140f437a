//! Sliding-window statistics for one (dimension, goal) pair of one node.

use std::cell::Cell;
use std::collections::VecDeque;

/// Fixed-capacity window of punctual scores in `[0, 1]`.
///
/// The average is computed lazily and cached until the next mutation.
/// Boundaries are `average ± spread`, clamped to `[0, 1]`. An empty window
/// without a prior reports `0.0` everywhere, so callers must gate
/// conclusions on [`PerformanceRange::num_punctual_values`].
///
/// A prior (the configured default score) weighs in like one extra sample
/// until the window fills, but never counts as evidence.
#[derive(Debug, Clone)]
pub struct PerformanceRange {
    values: VecDeque<f64>,
    capacity: usize,
    spread: f64,
    prior: Option<f64>,
    cached_average: Cell<Option<f64>>,
}

impl PerformanceRange {
    pub fn new(capacity: usize, spread: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            spread: spread.max(0.0),
            prior: None,
            cached_average: Cell::new(None),
        }
    }

    /// Seed the average with `score`. Non-finite priors are ignored.
    pub fn with_prior(mut self, score: f64) -> Self {
        if score.is_finite() {
            self.prior = Some(score.clamp(0.0, 1.0));
            self.cached_average.set(None);
        }
        self
    }

    /// Append a score, evicting the oldest one past capacity. Non-finite
    /// scores are ignored; finite ones are clamped to `[0, 1]`.
    pub fn add_value(&mut self, score: f64) {
        if !score.is_finite() {
            return;
        }
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(score.clamp(0.0, 1.0));
        self.cached_average.set(None);
    }

    fn is_blank(&self) -> bool {
        self.values.is_empty() && self.prior.is_none()
    }

    pub fn current_average(&self) -> f64 {
        if let Some(avg) = self.cached_average.get() {
            return avg;
        }
        let sum: f64 = self.values.iter().sum();
        let count = self.values.len();
        let avg = match self.prior {
            Some(prior) if count < self.capacity => (sum + prior) / (count + 1) as f64,
            _ if count == 0 => 0.0,
            _ => sum / count as f64,
        };
        self.cached_average.set(Some(avg));
        avg
    }

    pub fn current_top_boundary(&self) -> f64 {
        if self.is_blank() {
            return 0.0;
        }
        (self.current_average() + self.spread).min(1.0)
    }

    pub fn current_bottom_boundary(&self) -> f64 {
        if self.is_blank() {
            return 0.0;
        }
        (self.current_average() - self.spread).max(0.0)
    }

    /// Observed scores in the window; the prior is not one of them.
    pub fn num_punctual_values(&self) -> usize {
        self.values.len()
    }

    /// Drop every observation. The prior, if any, stays.
    pub fn reset(&mut self) {
        self.values.clear();
        self.cached_average.set(None);
    }

    /// Whether the `[bottom, top]` intervals of both ranges intersect.
    pub fn overlaps(&self, other: &PerformanceRange) -> bool {
        self.current_bottom_boundary() <= other.current_top_boundary()
            && other.current_bottom_boundary() <= self.current_top_boundary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_range_reports_zero() {
        let range = PerformanceRange::new(5, 0.1);
        assert_eq!(range.num_punctual_values(), 0);
        assert_eq!(range.current_average(), 0.0);
        assert_eq!(range.current_top_boundary(), 0.0);
        assert_eq!(range.current_bottom_boundary(), 0.0);
    }

    #[test]
    fn window_evicts_oldest_and_refreshes_cache() {
        let mut range = PerformanceRange::new(3, 0.1);
        for v in [1.0, 1.0, 1.0] {
            range.add_value(v);
        }
        assert!((range.current_average() - 1.0).abs() < 1e-12);

        range.add_value(0.0);
        assert_eq!(range.num_punctual_values(), 3);
        assert!((range.current_average() - 2.0 / 3.0).abs() < 1e-12);
        assert!((range.current_top_boundary() - (2.0 / 3.0 + 0.1)).abs() < 1e-12);
        assert!((range.current_bottom_boundary() - (2.0 / 3.0 - 0.1)).abs() < 1e-12);
    }

    #[test]
    fn boundaries_are_clamped_and_bad_scores_ignored() {
        let mut range = PerformanceRange::new(4, 0.3);
        range.add_value(f64::NAN);
        range.add_value(1.7);
        assert_eq!(range.num_punctual_values(), 1);
        assert_eq!(range.current_top_boundary(), 1.0);
        assert!((range.current_bottom_boundary() - 0.7).abs() < 1e-12);

        range.reset();
        assert_eq!(range.num_punctual_values(), 0);
        assert_eq!(range.current_average(), 0.0);
    }

    #[test]
    fn prior_shapes_the_average_but_is_not_evidence() {
        let mut range = PerformanceRange::new(3, 0.1).with_prior(0.0);
        assert_eq!(range.num_punctual_values(), 0);
        assert_eq!(range.current_average(), 0.0);
        assert!((range.current_top_boundary() - 0.1).abs() < 1e-12);

        range.add_value(1.0);
        assert_eq!(range.num_punctual_values(), 1);
        assert!((range.current_average() - 0.5).abs() < 1e-12);

        // A full window no longer leans on the prior.
        range.add_value(1.0);
        range.add_value(1.0);
        assert_eq!(range.num_punctual_values(), 3);
        assert!((range.current_average() - 1.0).abs() < 1e-12);

        range.reset();
        assert_eq!(range.num_punctual_values(), 0);
        assert_eq!(range.current_average(), 0.0);
    }
}
