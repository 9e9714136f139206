//! Decision tree classifier
//!
//! Gini-impurity classification tree used as the base learner for the bagged
//! ensemble. Leaves keep the full class histogram of the rows they cover so
//! the ensemble can expose per-class probability trees to the explainers.

use crate::error::{ClearcutError, Result};
use crate::training::forest_view::{TreeView, ViewNode};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Tree growth parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeConfig {
    /// Maximum depth; `None` grows until leaves are pure or too small
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of features considered per split; `None` scans all of them
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        prediction: usize,
        n_samples: usize,
        class_counts: Vec<usize>,
    },
    Split {
        feature: usize,
        threshold: f64,
        n_samples: usize,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// A fitted classification tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    config: DecisionTreeConfig,
    root: Option<TreeNode>,
    n_classes: usize,
    n_features: usize,
}

impl DecisionTreeClassifier {
    pub fn new(config: DecisionTreeConfig) -> Self {
        Self {
            config,
            root: None,
            n_classes: 0,
            n_features: 0,
        }
    }

    /// Fit the tree on class codes in `[0, n_classes)`
    pub fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        n_classes: usize,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(ClearcutError::Shape {
                expected: format!("{} target rows", x.nrows()),
                actual: format!("{} target rows", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(ClearcutError::InsufficientData { needed: 1, got: 0 });
        }

        self.n_classes = n_classes;
        self.n_features = x.ncols();
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.root = Some(self.build_node(&x, &y, indices, 0, &mut rng));
        Ok(())
    }

    /// Fit on a bootstrap sample expressed as row indices into `x`
    pub fn fit_indices(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        indices: Vec<usize>,
        n_classes: usize,
    ) -> Result<()> {
        if indices.is_empty() {
            return Err(ClearcutError::InsufficientData { needed: 1, got: 0 });
        }
        self.n_classes = n_classes;
        self.n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.root = Some(self.build_node(&x, &y, indices, 0, &mut rng));
        Ok(())
    }

    fn build_node(
        &self,
        x: &ArrayView2<'_, f64>,
        y: &ArrayView1<'_, f64>,
        indices: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let counts = class_counts(y, &indices, self.n_classes);
        let n_samples = indices.len();

        let depth_reached = self
            .config
            .max_depth
            .map_or(false, |limit| depth >= limit);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        if depth_reached || pure || n_samples < self.config.min_samples_split {
            return leaf_from_counts(counts, n_samples);
        }

        match self.find_best_split(x, y, &indices, &counts, rng) {
            Some(split) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .into_iter()
                    .partition(|&i| x[[i, split.feature]] <= split.threshold);
                let left = self.build_node(x, y, left_idx, depth + 1, rng);
                let right = self.build_node(x, y, right_idx, depth + 1, rng);
                TreeNode::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    n_samples,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            None => leaf_from_counts(counts, n_samples),
        }
    }

    fn find_best_split(
        &self,
        x: &ArrayView2<'_, f64>,
        y: &ArrayView1<'_, f64>,
        indices: &[usize],
        parent_counts: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let candidates: Vec<usize> = match self.config.max_features {
            Some(k) if k < self.n_features => {
                let mut all: Vec<usize> = (0..self.n_features).collect();
                all.shuffle(rng);
                all.truncate(k);
                all
            }
            _ => (0..self.n_features).collect(),
        };

        let parent_gini = gini_from_counts(parent_counts, indices.len());

        candidates
            .into_par_iter()
            .filter_map(|feature| {
                self.best_split_for_feature(x, y, indices, feature, parent_gini)
            })
            .max_by(|a, b| {
                a.gain
                    .partial_cmp(&b.gain)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Tie-break on feature index so parallel scans stay deterministic
                    .then(b.feature.cmp(&a.feature))
            })
            .filter(|split| split.gain > 1e-12)
    }

    fn best_split_for_feature(
        &self,
        x: &ArrayView2<'_, f64>,
        y: &ArrayView1<'_, f64>,
        indices: &[usize],
        feature: usize,
        parent_gini: f64,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_counts = vec![0usize; self.n_classes];
        let mut right_counts = class_counts(y, indices, self.n_classes);

        let mut best: Option<SplitCandidate> = None;
        for pos in 0..n - 1 {
            let class = y[sorted[pos]] as usize;
            left_counts[class] += 1;
            right_counts[class] -= 1;

            let value = x[[sorted[pos], feature]];
            let next = x[[sorted[pos + 1], feature]];
            if next <= value {
                continue;
            }
            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < self.config.min_samples_leaf || n_right < self.config.min_samples_leaf {
                continue;
            }

            let weighted = (n_left as f64 * gini_from_counts(&left_counts, n_left)
                + n_right as f64 * gini_from_counts(&right_counts, n_right))
                / n as f64;
            let gain = parent_gini - weighted;
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (value + next) / 2.0,
                    gain,
                });
            }
        }
        best
    }

    /// Predicted class code for each row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(ClearcutError::ModelNotFitted)?;
        let predictions: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| predict_one(root, &row.to_vec()) as f64)
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    /// Leaf class histogram, normalized, for one sample
    pub fn predict_proba_one(&self, sample: &[f64]) -> Result<Vec<f64>> {
        let root = self.root.as_ref().ok_or(ClearcutError::ModelNotFitted)?;
        let mut node = root;
        loop {
            match node {
                TreeNode::Leaf {
                    class_counts,
                    n_samples,
                    ..
                } => {
                    return Ok(class_counts
                        .iter()
                        .map(|&c| c as f64 / *n_samples as f64)
                        .collect());
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if sample[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Project the fitted tree into a flat probability tree for `class`,
    /// with leaf values additionally scaled by `leaf_scale`
    pub fn class_view(&self, class: usize, leaf_scale: f64) -> Result<TreeView> {
        let root = self.root.as_ref().ok_or(ClearcutError::ModelNotFitted)?;
        let mut nodes = Vec::new();
        flatten(root, class, leaf_scale, &mut nodes);
        Ok(TreeView { nodes })
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

fn class_counts(y: &ArrayView1<'_, f64>, indices: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in indices {
        counts[y[i] as usize] += 1;
    }
    counts
}

fn gini_from_counts(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let sum_sq: f64 = counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total as f64;
            p * p
        })
        .sum();
    1.0 - sum_sq
}

fn leaf_from_counts(class_counts: Vec<usize>, n_samples: usize) -> TreeNode {
    let prediction = class_counts
        .iter()
        .enumerate()
        .max_by_key(|(_, &c)| c)
        .map(|(class, _)| class)
        .unwrap_or(0);
    TreeNode::Leaf {
        prediction,
        n_samples,
        class_counts,
    }
}

fn predict_one(node: &TreeNode, sample: &[f64]) -> usize {
    match node {
        TreeNode::Leaf { prediction, .. } => *prediction,
        TreeNode::Split {
            feature,
            threshold,
            left,
            right,
            ..
        } => {
            if sample[*feature] <= *threshold {
                predict_one(left, sample)
            } else {
                predict_one(right, sample)
            }
        }
    }
}

fn flatten(node: &TreeNode, class: usize, leaf_scale: f64, nodes: &mut Vec<ViewNode>) -> usize {
    match node {
        TreeNode::Leaf {
            class_counts,
            n_samples,
            ..
        } => {
            let idx = nodes.len();
            nodes.push(ViewNode::Leaf {
                value: leaf_scale * class_counts[class] as f64 / *n_samples as f64,
                cover: *n_samples as f64,
            });
            idx
        }
        TreeNode::Split {
            feature,
            threshold,
            n_samples,
            left,
            right,
        } => {
            let idx = nodes.len();
            nodes.push(ViewNode::Leaf {
                value: 0.0,
                cover: 0.0,
            });
            let left_idx = flatten(left, class, leaf_scale, nodes);
            let right_idx = flatten(right, class, leaf_scale, nodes);
            nodes[idx] = ViewNode::Split {
                feature: *feature,
                threshold: *threshold,
                left: left_idx,
                right: right_idx,
                cover: *n_samples as f64,
            };
            idx
        }
    }
}
