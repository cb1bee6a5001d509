//! Random-forest regression: bootstrap-sampled CART trees with MSE
//! impurity, trained in parallel.

use crate::error::{PipelineError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// Maximum number of splits from the root to any leaf.
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 500,
            max_depth: 12,
            min_samples_split: 2,
            min_samples_leaf: 3,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Node,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    sse: f64,
}

fn mean_of(y: &[f64], idx: &[usize]) -> f64 {
    idx.iter().map(|&i| y[i]).sum::<f64>() / idx.len().max(1) as f64
}

fn sse_of(y: &[f64], idx: &[usize]) -> f64 {
    let m = mean_of(y, idx);
    idx.iter().map(|&i| (y[i] - m).powi(2)).sum()
}

impl RegressionTree {
    /// Fit on the rows of `x` listed in `rows` (duplicates allowed).
    pub fn fit(x: &[Vec<f64>], y: &[f64], rows: Vec<usize>, config: &ForestConfig) -> Self {
        Self {
            root: Self::grow(x, y, rows, 0, config),
        }
    }

    fn grow(x: &[Vec<f64>], y: &[f64], rows: Vec<usize>, depth: usize, cfg: &ForestConfig) -> Node {
        let n = rows.len();
        let leaf = Node::Leaf {
            value: mean_of(y, &rows),
        };
        if depth >= cfg.max_depth
            || n < cfg.min_samples_split.max(2)
            || n < 2 * cfg.min_samples_leaf.max(1)
        {
            return leaf;
        }
        let parent_sse = sse_of(y, &rows);
        if parent_sse <= 1e-12 {
            return leaf;
        }
        let Some(best) = Self::best_split(x, y, &rows, cfg.min_samples_leaf.max(1)) else {
            return leaf;
        };
        if best.sse >= parent_sse {
            return leaf;
        }
        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| x[i][best.feature] <= best.threshold);
        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(Self::grow(x, y, left, depth + 1, cfg)),
            right: Box::new(Self::grow(x, y, right, depth + 1, cfg)),
        }
    }

    /// Exhaustive search over every feature using sorted prefix sums.
    fn best_split(x: &[Vec<f64>], y: &[f64], rows: &[usize], min_leaf: usize) -> Option<SplitCandidate> {
        let n = rows.len();
        let n_features = x.first().map_or(0, |r| r.len());
        let total: f64 = rows.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = rows.iter().map(|&i| y[i] * y[i]).sum();
        let mut best: Option<SplitCandidate> = None;

        let mut order = rows.to_vec();
        for feature in 0..n_features {
            order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
            let mut sum_l = 0.0;
            let mut sq_l = 0.0;
            for k in 1..n {
                let prev = order[k - 1];
                sum_l += y[prev];
                sq_l += y[prev] * y[prev];
                if k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let (lo, hi) = (x[prev][feature], x[order[k]][feature]);
                if lo >= hi {
                    continue;
                }
                let (nl, nr) = (k as f64, (n - k) as f64);
                let sum_r = total - sum_l;
                let sq_r = total_sq - sq_l;
                let sse = (sq_l - sum_l * sum_l / nl) + (sq_r - sum_r * sum_r / nr);
                if best.as_ref().map_or(true, |b| sse < b.sse) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (lo + hi) / 2.0,
                        sse,
                    });
                }
            }
        }
        best
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature] <= *threshold {
                        &**left
                    } else {
                        &**right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Fit `config.n_trees` trees in parallel. Tree `i` draws its bootstrap
    /// sample from `ChaCha8Rng` seeded with `seed + i`.
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &ForestConfig) -> Result<Self> {
        let n = y.len();
        if n == 0 || x.len() != n {
            return Err(PipelineError::insufficient("random forest fit", 1, n.min(x.len())));
        }
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(PipelineError::InvalidTable("ragged feature matrix".into()));
        }

        let trees = (0..config.n_trees.max(1))
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(i as u64));
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, rows, config)
            })
            .collect();

        Ok(Self { trees, n_features })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Mean of the tree predictions.
    pub fn predict_one(&self, features: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_one(features)).sum();
        sum / self.trees.len().max(1) as f64
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }
}

/// Coefficient of determination. A constant target scores 1.0 when
/// predicted exactly, else 0.0. Empty input is NaN.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return f64::NAN;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}
