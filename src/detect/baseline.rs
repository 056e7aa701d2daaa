use std::collections::VecDeque;

use crate::detect::Observation;

/// The warm-up window the detector was trained on.
///
/// Holds at most `capacity` observations, keeping the most recent ones.
/// Once handed to the detector it is never modified again.
#[derive(Debug, Clone)]
pub struct Baseline {
    window: VecDeque<Observation>,
}

impl Baseline {
    pub fn from_observations(observations: &[Observation], capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let skip = observations.len().saturating_sub(capacity);
        Self {
            window: observations.iter().skip(skip).copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.window.iter().map(|o| o.value).collect()
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().map(|o| o.value).sum::<f64>() / self.window.len() as f64
    }

    pub fn variance(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.window.iter().map(|o| (o.value - mean).powi(2)).sum();
        sum_sq_diff / self.window.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(values: &[f64]) -> Vec<Observation> {
        values.iter().map(|&v| Observation::new(v)).collect()
    }

    #[test]
    fn test_stats() {
        let b = Baseline::from_observations(&obs(&[1.0, 2.0, 3.0, 4.0, 5.0]), 10);
        assert_eq!(b.len(), 5);
        assert_eq!(b.mean(), 3.0);
        assert_eq!(b.variance(), 2.0);
        assert!((b.std_dev() - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let b = Baseline::from_observations(&obs(&[9.0, 9.0, 1.0, 2.0, 3.0]), 3);
        assert_eq!(b.values(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty_window_stats_are_zero() {
        let b = Baseline::from_observations(&[], 5);
        assert!(b.is_empty());
        assert_eq!(b.mean(), 0.0);
        assert_eq!(b.std_dev(), 0.0);
    }
}
