//! Isolation forest over a scalar metric.
//!
//! Each tree recursively partitions a random sub-sample at uniformly drawn
//! split points. Outliers are separated after few splits, so a short average
//! path length means an anomalous point. Nodes remember the range of the
//! sample they were built from: a query falling outside that range is
//! considered isolated by the next cut, which keeps values beyond anything
//! seen during warm-up from inheriting the (long) path of the baseline's
//! extreme points.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Upper bound on the per-tree sub-sample size.
const MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
        min: f64,
        max: f64,
    },
    Split {
        threshold: f64,
        min: f64,
        max: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Uniform split point in `[min, max)`. Interpolates when the span itself
/// overflows, which `gen_range` cannot handle.
fn split_point(min: f64, max: f64, rng: &mut StdRng) -> f64 {
    if (max - min).is_finite() {
        return rng.gen_range(min..max);
    }
    let t: f64 = rng.gen();
    min * (1.0 - t) + max * t
}

impl Node {
    fn build(sample: Vec<f64>, depth: usize, limit: usize, rng: &mut StdRng) -> Node {
        let (min, max) = range(&sample);
        if depth >= limit || sample.len() <= 1 || min >= max {
            return Node::Leaf {
                size: sample.len(),
                min,
                max,
            };
        }

        let threshold = split_point(min, max, rng);
        let (left, right): (Vec<f64>, Vec<f64>) = sample.into_iter().partition(|&v| v < threshold);

        Node::Split {
            threshold,
            min,
            max,
            left: Box::new(Node::build(left, depth + 1, limit, rng)),
            right: Box::new(Node::build(right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, value: f64) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size, min, max } => {
                    if *size > 0 && (value < *min || value > *max) {
                        return depth + 1.0;
                    }
                    return depth + average_path_length(*size);
                }
                Node::Split {
                    threshold,
                    min,
                    max,
                    left,
                    right,
                } => {
                    if value < *min || value > *max {
                        return depth + 1.0;
                    }
                    node = if value < *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

fn range(sample: &[f64]) -> (f64, f64) {
    sample
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Average path length of an unsuccessful BST search over `n` points,
/// used to normalise isolation depths.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A trained ensemble of isolation trees.
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Grow `trees` isolation trees over `values`.
    ///
    /// `values` must be non-empty and finite; the detector checks both before
    /// calling in.
    pub fn fit(values: &[f64], trees: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let sample_size = values.len().min(MAX_SAMPLES).max(1);
        let limit = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..trees.max(1))
            .map(|_| {
                let sample: Vec<f64> = values.choose_multiple(&mut rng, sample_size).copied().collect();
                Node::build(sample, 0, limit, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Anomaly score in (0, 1]. Scores well above 0.5 indicate outliers;
    /// scores around 0.5 or below are ordinary.
    pub fn score(&self, value: f64) -> f64 {
        let norm = average_path_length(self.sample_size);
        if norm <= 0.0 {
            return 0.5;
        }
        let mean_path =
            self.trees.iter().map(|t| t.path_length(value)).sum::<f64>() / self.trees.len() as f64;
        2f64.powf(-mean_path / norm)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Linear-interpolated quantile of `values` at `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
