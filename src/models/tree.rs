//! Regression tree used as the weak learner of the boosting ensemble.
//!
//! Trees are stored as a flat node array (root at index 0) so they serialize
//! to compact JSON and predict without recursion.
//!
//! Split search is exact: for every candidate feature the node's rows are
//! sorted by value and every boundary between distinct values is scored by
//! variance reduction
//!
//! ```text
//! gain = S_l² / n_l + S_r² / n_r - S² / n
//! ```
//!
//! where `S` is the sum of targets. Features are scored in parallel; the best
//! split is chosen deterministically (highest gain, then lowest feature index,
//! then lowest threshold).

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{FeatureVector, N_FEATURES};

/// Splits must improve the score by more than this.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Fit a tree to `targets` using the given rows and candidate features.
    ///
    /// `rows` index into both `x` and `targets`. An empty `rows` yields a single
    /// zero leaf.
    pub fn fit(x: &[FeatureVector], targets: &[f64], rows: &[usize], features: &[usize], params: TreeParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(x, targets, rows.to_vec(), features, params, 0);
        tree
    }

    pub fn predict(&self, x: &FeatureVector) -> f64 {
        let values = x.values();
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if values[*feature] <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(TreeNode::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Structural check for trees loaded from disk: in-range feature and child
    /// indices, children after their parent (no cycles), finite values.
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("node {idx}: non-finite leaf value"));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= N_FEATURES {
                        return Err(format!("node {idx}: feature index {feature} out of range"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx}: non-finite threshold"));
                    }
                    for child in [left, right] {
                        if *child <= idx || *child >= self.nodes.len() {
                            return Err(format!("node {idx}: invalid child index {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn build(
        &mut self,
        x: &[FeatureVector],
        targets: &[f64],
        rows: Vec<usize>,
        features: &[usize],
        params: TreeParams,
        depth: usize,
    ) -> usize {
        let idx = self.nodes.len();
        let value = mean(rows.iter().map(|&r| targets[r]));
        self.nodes.push(TreeNode::Leaf { value });

        let min_leaf = params.min_samples_leaf.max(1);
        if depth >= params.max_depth || rows.len() / 2 < min_leaf || is_constant(targets, &rows) {
            return idx;
        }

        let Some(split) = best_split(x, targets, &rows, features, min_leaf) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| x[r].values()[split.feature] <= split.threshold);

        let left = self.build(x, targets, left_rows, features, params, depth + 1);
        let right = self.build(x, targets, right_rows, features, params, depth + 1);
        self.nodes[idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }
}

fn best_split(
    x: &[FeatureVector],
    targets: &[f64],
    rows: &[usize],
    features: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let candidates: Vec<SplitCandidate> = features
        .par_iter()
        .filter_map(|&feature| best_split_for_feature(x, targets, rows, feature, min_leaf))
        .collect();

    let mut best: Option<SplitCandidate> = None;
    for c in candidates {
        best = match best {
            None => Some(c),
            Some(b) => {
                let better = c.gain > b.gain
                    || (c.gain == b.gain && c.feature < b.feature)
                    || (c.gain == b.gain && c.feature == b.feature && c.threshold < b.threshold);
                Some(if better { c } else { b })
            }
        };
    }
    best
}

fn best_split_for_feature(
    x: &[FeatureVector],
    targets: &[f64],
    rows: &[usize],
    feature: usize,
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let mut pairs: Vec<(f64, f64)> = rows
        .iter()
        .map(|&r| (x[r].values()[feature], targets[r]))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n = pairs.len();
    let total: f64 = pairs.iter().map(|p| p.1).sum();
    let parent_score = total * total / n as f64;

    let mut best: Option<SplitCandidate> = None;
    let mut left_sum = 0.0;

    // Left side is pairs[..i].
    for i in 1..n {
        left_sum += pairs[i - 1].1;
        if i < min_leaf || n - i < min_leaf {
            continue;
        }
        let (lo, hi) = (pairs[i - 1].0, pairs[i].0);
        if lo == hi {
            continue;
        }

        let n_l = i as f64;
        let n_r = (n - i) as f64;
        let right_sum = total - left_sum;
        let gain = left_sum * left_sum / n_l + right_sum * right_sum / n_r - parent_score;

        if gain > MIN_GAIN && best.is_none_or(|b| gain > b.gain) {
            best = Some(SplitCandidate {
                feature,
                threshold: midpoint(lo, hi),
                gain,
            });
        }
    }

    best
}

/// A threshold strictly below `hi` so `hi` always goes right.
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid < hi { mid } else { lo }
}

fn is_constant(targets: &[f64], rows: &[usize]) -> bool {
    let mut it = rows.iter().map(|&r| targets[r]);
    match it.next() {
        Some(first) => it.all(|v| v == first),
        None => true,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}
