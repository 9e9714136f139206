//! Depth-wise gradient boosted trees
//!
//! Softmax multiclass boosting with second-order gradients, one tree per
//! class per round, grown level-wise to a fixed depth. This family trains
//! and predicts through its own packed matrix type, [`NativeMatrix`], so
//! callers convert once up front and predictions stay in margin space.

use crate::error::{ClearcutError, Result};
use crate::training::forest_view::{TreeEnsemble, TreeView, ViewNode};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Packed row-major feature matrix for the boosted-native family
#[derive(Debug, Clone)]
pub struct NativeMatrix {
    data: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
}

impl NativeMatrix {
    pub fn from_array(x: &Array2<f64>) -> Self {
        let n_rows = x.nrows();
        let n_cols = x.ncols();
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in x.rows() {
            data.extend(row.iter().copied());
        }
        Self {
            data,
            n_rows,
            n_cols,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.data[idx * self.n_cols..(idx + 1) * self.n_cols]
    }

    fn value(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols + col]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedNativeConfig {
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    /// Fraction of feature columns sampled per tree
    pub colsample: f64,
    pub seed: u64,
}

impl Default for BoostedNativeConfig {
    fn default() -> Self {
        Self {
            n_rounds: 50,
            learning_rate: 0.3,
            max_depth: 5,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            colsample: 1.0,
            seed: 2,
        }
    }
}

/// A fitted depth-wise boosted classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedNativeClassifier {
    config: BoostedNativeConfig,
    trees: Vec<TreeView>,
    /// Class each tree contributes to, aligned with `trees`
    tree_classes: Vec<usize>,
    num_class: usize,
    n_features: usize,
}

impl BoostedNativeClassifier {
    pub fn new(config: BoostedNativeConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            tree_classes: Vec::new(),
            num_class: 0,
            n_features: 0,
        }
    }

    /// Fit with an explicit class count, one boosting group per class
    pub fn fit(&mut self, dtrain: &NativeMatrix, y: &Array1<f64>, num_class: usize) -> Result<()> {
        let n = dtrain.n_rows();
        if n != y.len() {
            return Err(ClearcutError::Shape {
                expected: format!("{} target rows", n),
                actual: format!("{} target rows", y.len()),
            });
        }
        if n == 0 {
            return Err(ClearcutError::InsufficientData { needed: 1, got: 0 });
        }
        if num_class < 2 {
            return Err(ClearcutError::Training(format!(
                "num_class must be at least 2, got {}",
                num_class
            )));
        }

        self.num_class = num_class;
        self.n_features = dtrain.n_cols();
        self.trees.clear();
        self.tree_classes.clear();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.seed);
        let mut margins = vec![vec![0.0; num_class]; n];
        let all_indices: Vec<usize> = (0..n).collect();
        let n_sampled = ((self.config.colsample * self.n_features as f64).ceil() as usize)
            .clamp(1, self.n_features);

        debug!(
            n_rounds = self.config.n_rounds,
            num_class, "fitting boosted-native classifier"
        );

        for _round in 0..self.config.n_rounds {
            let probs: Vec<Vec<f64>> = margins.iter().map(|m| softmax(m)).collect();
            for class in 0..num_class {
                let mut grad = vec![0.0; n];
                let mut hess = vec![0.0; n];
                for i in 0..n {
                    let p = probs[i][class];
                    let target = if y[i] as usize == class { 1.0 } else { 0.0 };
                    grad[i] = p - target;
                    hess[i] = (2.0 * p * (1.0 - p)).max(1e-16);
                }

                let columns: Vec<usize> = if n_sampled < self.n_features {
                    let mut cols: Vec<usize> = (0..self.n_features).collect();
                    cols.shuffle(&mut rng);
                    cols.truncate(n_sampled);
                    cols
                } else {
                    (0..self.n_features).collect()
                };

                let tree = self.grow_tree(dtrain, &grad, &hess, &all_indices, &columns);
                for (i, margin) in margins.iter_mut().enumerate() {
                    margin[class] += tree.predict(dtrain.row(i));
                }
                self.trees.push(tree);
                self.tree_classes.push(class);
            }
        }
        Ok(())
    }

    fn grow_tree(
        &self,
        dtrain: &NativeMatrix,
        grad: &[f64],
        hess: &[f64],
        indices: &[usize],
        columns: &[usize],
    ) -> TreeView {
        let mut nodes = Vec::new();
        self.grow_node(dtrain, grad, hess, indices.to_vec(), columns, 0, &mut nodes);
        TreeView { nodes }
    }

    fn grow_node(
        &self,
        dtrain: &NativeMatrix,
        grad: &[f64],
        hess: &[f64],
        indices: Vec<usize>,
        columns: &[usize],
        depth: usize,
        nodes: &mut Vec<ViewNode>,
    ) -> usize {
        let g: f64 = indices.iter().map(|&i| grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| hess[i]).sum();
        let cover = indices.len() as f64;

        let split = if depth < self.config.max_depth && indices.len() >= 2 {
            self.find_split(dtrain, grad, hess, &indices, columns, g, h)
        } else {
            None
        };

        match split {
            Some(split) => {
                let idx = nodes.len();
                nodes.push(ViewNode::Leaf {
                    value: 0.0,
                    cover: 0.0,
                });
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .into_iter()
                    .partition(|&i| dtrain.value(i, split.feature) <= split.threshold);
                let left = self.grow_node(dtrain, grad, hess, left_idx, columns, depth + 1, nodes);
                let right = self.grow_node(dtrain, grad, hess, right_idx, columns, depth + 1, nodes);
                nodes[idx] = ViewNode::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                    cover,
                };
                idx
            }
            None => {
                let idx = nodes.len();
                nodes.push(ViewNode::Leaf {
                    value: -self.config.learning_rate * g / (h + self.config.reg_lambda),
                    cover,
                });
                idx
            }
        }
    }

    fn find_split(
        &self,
        dtrain: &NativeMatrix,
        grad: &[f64],
        hess: &[f64],
        indices: &[usize],
        columns: &[usize],
        g_total: f64,
        h_total: f64,
    ) -> Option<GainSplit> {
        let lambda = self.config.reg_lambda;
        let parent_score = g_total * g_total / (h_total + lambda);

        columns
            .par_iter()
            .filter_map(|&feature| {
                let mut sorted: Vec<usize> = indices.to_vec();
                sorted.sort_by(|&a, &b| {
                    dtrain
                        .value(a, feature)
                        .partial_cmp(&dtrain.value(b, feature))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                let mut g_left = 0.0;
                let mut h_left = 0.0;
                let mut best: Option<GainSplit> = None;
                for pos in 0..sorted.len() - 1 {
                    g_left += grad[sorted[pos]];
                    h_left += hess[sorted[pos]];
                    let value = dtrain.value(sorted[pos], feature);
                    let next = dtrain.value(sorted[pos + 1], feature);
                    if next <= value {
                        continue;
                    }
                    let g_right = g_total - g_left;
                    let h_right = h_total - h_left;
                    if h_left < self.config.min_child_weight
                        || h_right < self.config.min_child_weight
                    {
                        continue;
                    }
                    let gain = 0.5
                        * (g_left * g_left / (h_left + lambda)
                            + g_right * g_right / (h_right + lambda)
                            - parent_score);
                    if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                        best = Some(GainSplit {
                            feature,
                            threshold: (value + next) / 2.0,
                            gain,
                        });
                    }
                }
                best
            })
            .max_by(|a, b| {
                a.gain
                    .partial_cmp(&b.gain)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.feature.cmp(&a.feature))
            })
            .filter(|split| split.gain > 1e-12)
    }

    /// Raw per-class margins for every row of `dtrain`
    pub fn predict_margin(&self, dtrain: &NativeMatrix) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(ClearcutError::ModelNotFitted);
        }
        if dtrain.n_cols() != self.n_features {
            return Err(ClearcutError::Shape {
                expected: format!("{} feature columns", self.n_features),
                actual: format!("{} feature columns", dtrain.n_cols()),
            });
        }
        let mut margins = Array2::zeros((dtrain.n_rows(), self.num_class));
        for (tree, &class) in self.trees.iter().zip(&self.tree_classes) {
            for row in 0..dtrain.n_rows() {
                margins[[row, class]] += tree.predict(dtrain.row(row));
            }
        }
        Ok(margins)
    }

    /// Predicted class codes; the conversion to [`NativeMatrix`] happens here
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let dtest = NativeMatrix::from_array(x);
        let margins = self.predict_margin(&dtest)?;
        Ok(Array1::from_shape_fn(margins.nrows(), |row| {
            super::bagged_trees::argmax(&margins.row(row).to_vec()) as f64
        }))
    }

    pub fn num_class(&self) -> usize {
        self.num_class
    }
}

impl TreeEnsemble for BoostedNativeClassifier {
    fn n_classes(&self) -> usize {
        self.num_class
    }

    fn class_trees(&self, class: usize) -> Vec<TreeView> {
        self.trees
            .iter()
            .zip(&self.tree_classes)
            .filter(|(_, &c)| c == class)
            .map(|(tree, _)| tree.clone())
            .collect()
    }

    fn base_value(&self, _class: usize) -> f64 {
        0.0
    }
}

struct GainSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

pub(crate) fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = margins.iter().map(|&m| (m - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}
