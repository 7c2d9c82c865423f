//! Deterministic isolation forest for multivariate outlier detection.
//!
//! Outliers are isolated closer to the root of randomly built trees, so the
//! expected path length over the ensemble yields an anomaly score in (0, 1):
//! `s(x) = 2^(-E[h(x)] / c(n))`, where `c(n)` is the average path length of
//! an unsuccessful BST search. The contamination fraction sets the score
//! threshold above which a row counts as an outlier.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Euler-Mascheroni constant, used by the path-length normalizer.
const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Training hyperparameters. Seeded so a given training window always yields
/// the same forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// Expected fraction of outliers in the training window.
    pub contamination: f64,
    pub seed: u64,
    /// Per-tree subsample cap.
    pub max_samples: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            contamination: 0.1,
            seed: 42,
            max_samples: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f64,
        /// Range of `feature` over the partition this split was drawn from.
        /// Scoring uses it to isolate rows that fall outside the hull.
        min: f64,
        max: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A fitted isolation forest. Immutable after training; retraining builds a
/// whole new value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
    /// Score above which a row is an outlier; the (1 - contamination)
    /// quantile of training scores.
    score_threshold: f64,
}

impl IsolationForest {
    /// Fit a forest on standardized feature rows.
    pub fn fit(data: &[Vec<f64>], config: &ForestConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let sample_size = data.len().min(config.max_samples).max(1);
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..config.n_trees)
            .map(|_| {
                let sample: Vec<Vec<f64>> = data
                    .choose_multiple(&mut rng, sample_size)
                    .cloned()
                    .collect();
                build_tree(&sample, 0, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            score_threshold: 0.5,
        };

        let mut scores: Vec<f64> = data.iter().map(|row| forest.score(row)).collect();
        if scores.is_empty() {
            return forest;
        }
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let quantile = 1.0 - config.contamination.clamp(0.0, 1.0);
        let idx = ((scores.len() as f64 * quantile) as usize).min(scores.len() - 1);
        forest.score_threshold = scores[idx];

        forest
    }

    /// Anomaly score of one row in (0, 1); higher is more anomalous.
    pub fn score(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let avg_path: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(tree, row, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-avg_path / c_factor(self.sample_size))
    }

    pub fn score_threshold(&self) -> f64 {
        self.score_threshold
    }
}

fn build_tree(rows: &[Vec<f64>], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    if depth >= max_depth || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let n_features = rows[0].len();
    // Only features with spread can split the partition.
    let splittable: Vec<usize> = (0..n_features)
        .filter(|&f| {
            let (min, max) = column_range(rows, f);
            max > min
        })
        .collect();
    let Some(&feature) = splittable.as_slice().choose(rng) else {
        return Node::Leaf { size: rows.len() };
    };

    let (min, max) = column_range(rows, feature);
    let value = rng.gen_range(min..max);

    let (left, right): (Vec<Vec<f64>>, Vec<Vec<f64>>) =
        rows.iter().cloned().partition(|row| row[feature] < value);

    Node::Split {
        feature,
        value,
        min,
        max,
        left: Box::new(build_tree(&left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(&right, depth + 1, max_depth, rng)),
    }
}

fn column_range(rows: &[Vec<f64>], feature: usize) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for row in rows {
        min = min.min(row[feature]);
        max = max.max(row[feature]);
    }
    (min, max)
}

fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + c_factor(*size),
        Node::Split {
            feature,
            value,
            min,
            max,
            left,
            right,
        } => {
            // A row outside this partition's hull on the split feature would
            // have been split off here had it been present at training time,
            // so it counts as isolated one level down. Without this, a far
            // out-of-range row inherits the path of the crowded boundary
            // leaf it drifts into and its score stops growing with
            // extremity.
            if row[*feature] < *min || row[*feature] > *max {
                return depth as f64 + 1.0;
            }
            if row[*feature] < *value {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful search in a BST of `n` nodes.
fn c_factor(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}
