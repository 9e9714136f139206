//! Leaf-wise gradient boosted trees
//!
//! Grows each tree best-first: the leaf with the highest split gain anywhere
//! in the tree is split next, up to a leaf budget. The objective is selected
//! from the label count at fit time: class-balanced logistic for two classes,
//! softmax with one tree group per class otherwise.

use crate::error::{ClearcutError, Result};
use crate::training::boosted_native::softmax;
use crate::training::forest_view::{TreeEnsemble, TreeView, ViewNode};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BinaryHeap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedLeafwiseConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_leaves: usize,
    pub min_child_samples: usize,
    pub reg_lambda: f64,
}

impl Default for BoostedLeafwiseConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_leaves: 31,
            min_child_samples: 20,
            reg_lambda: 1.0,
        }
    }
}

/// Objective picked from the number of classes at fit time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeafwiseObjective {
    /// Two classes, logistic loss with inverse-frequency class weights
    BalancedLogistic,
    /// Three or more classes, unweighted softmax
    Softmax,
}

/// A fitted leaf-wise boosted classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedLeafwiseClassifier {
    config: BoostedLeafwiseConfig,
    objective: Option<LeafwiseObjective>,
    trees: Vec<TreeView>,
    /// Class group per tree; all zeros under the binary objective
    tree_classes: Vec<usize>,
    n_classes: usize,
    n_features: usize,
}

impl BoostedLeafwiseClassifier {
    pub fn new(config: BoostedLeafwiseConfig) -> Self {
        Self {
            config,
            objective: None,
            trees: Vec::new(),
            tree_classes: Vec::new(),
            n_classes: 0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        let n = x.nrows();
        if n != y.len() {
            return Err(ClearcutError::Shape {
                expected: format!("{} target rows", n),
                actual: format!("{} target rows", y.len()),
            });
        }
        if n == 0 {
            return Err(ClearcutError::InsufficientData { needed: 1, got: 0 });
        }
        if n_classes < 2 {
            return Err(ClearcutError::Training(format!(
                "need at least 2 classes, got {}",
                n_classes
            )));
        }

        self.n_classes = n_classes;
        self.n_features = x.ncols();
        self.trees.clear();
        self.tree_classes.clear();

        let objective = if n_classes == 2 {
            LeafwiseObjective::BalancedLogistic
        } else {
            LeafwiseObjective::Softmax
        };
        self.objective = Some(objective);
        debug!(?objective, n_estimators = self.config.n_estimators, "fitting leaf-wise booster");

        match objective {
            LeafwiseObjective::BalancedLogistic => self.fit_binary(x, y),
            LeafwiseObjective::Softmax => self.fit_softmax(x, y),
        }
    }

    fn fit_binary(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        let n_pos = y.iter().filter(|&&v| v == 1.0).count();
        let n_neg = n - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Err(ClearcutError::Training(
                "both classes must be present in the training rows".to_string(),
            ));
        }
        // Inverse-frequency weights: each class contributes half the total loss
        let w_pos = n as f64 / (2.0 * n_pos as f64);
        let w_neg = n as f64 / (2.0 * n_neg as f64);

        let mut raw = vec![0.0; n];
        for _ in 0..self.config.n_estimators {
            let mut grad = vec![0.0; n];
            let mut hess = vec![0.0; n];
            for i in 0..n {
                let p = sigmoid(raw[i]);
                let w = if y[i] == 1.0 { w_pos } else { w_neg };
                grad[i] = w * (p - y[i]);
                hess[i] = (w * p * (1.0 - p)).max(1e-16);
            }
            let tree = self.grow_tree(x, &grad, &hess);
            for i in 0..n {
                raw[i] += tree.predict(&x.row(i).to_vec());
            }
            self.trees.push(tree);
            self.tree_classes.push(0);
        }
        Ok(())
    }

    fn fit_softmax(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        let k = self.n_classes;
        let factor = k as f64 / (k as f64 - 1.0);
        let mut margins = vec![vec![0.0; k]; n];

        for _ in 0..self.config.n_estimators {
            let probs: Vec<Vec<f64>> = margins.iter().map(|m| softmax(m)).collect();
            for class in 0..k {
                let mut grad = vec![0.0; n];
                let mut hess = vec![0.0; n];
                for i in 0..n {
                    let p = probs[i][class];
                    let target = if y[i] as usize == class { 1.0 } else { 0.0 };
                    grad[i] = p - target;
                    hess[i] = (factor * p * (1.0 - p)).max(1e-16);
                }
                let tree = self.grow_tree(x, &grad, &hess);
                for (i, margin) in margins.iter_mut().enumerate() {
                    margin[class] += tree.predict(&x.row(i).to_vec());
                }
                self.trees.push(tree);
                self.tree_classes.push(class);
            }
        }
        Ok(())
    }

    /// Best-first growth: split the highest-gain leaf anywhere in the tree
    fn grow_tree(&self, x: &Array2<f64>, grad: &[f64], hess: &[f64]) -> TreeView {
        let lr = self.config.learning_rate;
        let lambda = self.config.reg_lambda;
        let leaf_value = |g: f64, h: f64| -lr * g / (h + lambda);

        let indices: Vec<usize> = (0..x.nrows()).collect();
        let g0: f64 = grad.iter().sum();
        let h0: f64 = hess.iter().sum();

        let mut nodes = vec![ViewNode::Leaf {
            value: leaf_value(g0, h0),
            cover: indices.len() as f64,
        }];
        let mut leaf_rows: HashMap<usize, Vec<usize>> = HashMap::new();
        leaf_rows.insert(0, indices);

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::new();
        if let Some(c) = self.leaf_candidate(x, grad, hess, 0, &leaf_rows[&0]) {
            heap.push(c);
        }

        let mut n_leaves = 1;
        while n_leaves < self.config.max_leaves {
            let candidate = match heap.pop() {
                Some(c) => c,
                None => break,
            };
            let rows = match leaf_rows.remove(&candidate.node) {
                Some(rows) => rows,
                None => continue,
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .into_iter()
                .partition(|&i| x[[i, candidate.feature]] <= candidate.threshold);

            let child = |rows: &[usize]| {
                let g: f64 = rows.iter().map(|&i| grad[i]).sum();
                let h: f64 = rows.iter().map(|&i| hess[i]).sum();
                ViewNode::Leaf {
                    value: leaf_value(g, h),
                    cover: rows.len() as f64,
                }
            };

            let left_idx = nodes.len();
            nodes.push(child(&left_rows));
            let right_idx = nodes.len();
            nodes.push(child(&right_rows));
            let cover = (left_rows.len() + right_rows.len()) as f64;
            nodes[candidate.node] = ViewNode::Split {
                feature: candidate.feature,
                threshold: candidate.threshold,
                left: left_idx,
                right: right_idx,
                cover,
            };
            n_leaves += 1;

            if let Some(c) = self.leaf_candidate(x, grad, hess, left_idx, &left_rows) {
                heap.push(c);
            }
            if let Some(c) = self.leaf_candidate(x, grad, hess, right_idx, &right_rows) {
                heap.push(c);
            }
            leaf_rows.insert(left_idx, left_rows);
            leaf_rows.insert(right_idx, right_rows);
        }

        TreeView { nodes }
    }

    fn leaf_candidate(
        &self,
        x: &Array2<f64>,
        grad: &[f64],
        hess: &[f64],
        node: usize,
        rows: &[usize],
    ) -> Option<Candidate> {
        if rows.len() < 2 * self.config.min_child_samples.max(1) {
            return None;
        }
        let lambda = self.config.reg_lambda;
        let g_total: f64 = rows.iter().map(|&i| grad[i]).sum();
        let h_total: f64 = rows.iter().map(|&i| hess[i]).sum();
        let parent_score = g_total * g_total / (h_total + lambda);

        let mut best: Option<Candidate> = None;
        for feature in 0..x.ncols() {
            let mut sorted: Vec<usize> = rows.to_vec();
            sorted.sort_by(|&a, &b| {
                x[[a, feature]]
                    .partial_cmp(&x[[b, feature]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for pos in 0..sorted.len() - 1 {
                g_left += grad[sorted[pos]];
                h_left += hess[sorted[pos]];
                let value = x[[sorted[pos], feature]];
                let next = x[[sorted[pos + 1], feature]];
                if next <= value {
                    continue;
                }
                let n_left = pos + 1;
                let n_right = sorted.len() - n_left;
                if n_left < self.config.min_child_samples.max(1)
                    || n_right < self.config.min_child_samples.max(1)
                {
                    continue;
                }
                let g_right = g_total - g_left;
                let h_right = h_total - h_left;
                let gain = 0.5
                    * (g_left * g_left / (h_left + lambda)
                        + g_right * g_right / (h_right + lambda)
                        - parent_score);
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Candidate {
                        gain,
                        node,
                        feature,
                        threshold: (value + next) / 2.0,
                    });
                }
            }
        }
        best
    }

    /// Raw margin per class; binary models report one column for class 1
    pub fn predict_margin(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let objective = self.objective.ok_or(ClearcutError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(ClearcutError::Shape {
                expected: format!("{} feature columns", self.n_features),
                actual: format!("{} feature columns", x.ncols()),
            });
        }
        let n_groups = match objective {
            LeafwiseObjective::BalancedLogistic => 1,
            LeafwiseObjective::Softmax => self.n_classes,
        };
        let mut margins = Array2::zeros((x.nrows(), n_groups));
        for (tree, &class) in self.trees.iter().zip(&self.tree_classes) {
            for row in 0..x.nrows() {
                margins[[row, class]] += tree.predict(&x.row(row).to_vec());
            }
        }
        Ok(margins)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let objective = self.objective.ok_or(ClearcutError::ModelNotFitted)?;
        let margins = self.predict_margin(x)?;
        let predictions = match objective {
            LeafwiseObjective::BalancedLogistic => Array1::from_shape_fn(margins.nrows(), |row| {
                if sigmoid(margins[[row, 0]]) >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }),
            LeafwiseObjective::Softmax => Array1::from_shape_fn(margins.nrows(), |row| {
                super::bagged_trees::argmax(&margins.row(row).to_vec()) as f64
            }),
        };
        Ok(predictions)
    }

    pub fn objective(&self) -> Option<LeafwiseObjective> {
        self.objective
    }
}

impl TreeEnsemble for BoostedLeafwiseClassifier {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn class_trees(&self, class: usize) -> Vec<TreeView> {
        match self.objective {
            Some(LeafwiseObjective::BalancedLogistic) => {
                // Class 1 owns the raw margin; class 0 sees it negated
                if class == 1 {
                    self.trees.clone()
                } else {
                    self.trees.iter().map(negate_leaves).collect()
                }
            }
            _ => self
                .trees
                .iter()
                .zip(&self.tree_classes)
                .filter(|(_, &c)| c == class)
                .map(|(tree, _)| tree.clone())
                .collect(),
        }
    }

    fn base_value(&self, _class: usize) -> f64 {
        0.0
    }
}

fn negate_leaves(tree: &TreeView) -> TreeView {
    TreeView {
        nodes: tree
            .nodes
            .iter()
            .map(|node| match node {
                ViewNode::Leaf { value, cover } => ViewNode::Leaf {
                    value: -value,
                    cover: *cover,
                },
                split => split.clone(),
            })
            .collect(),
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug)]
struct Candidate {
    gain: f64,
    node: usize,
    feature: usize,
    threshold: f64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.gain == other.gain && self.node == other.node && self.feature == other.feature
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.gain
            .partial_cmp(&other.gain)
            .unwrap_or(std::cmp::Ordering::Equal)
            // Deterministic pop order for equal gains
            .then(other.node.cmp(&self.node))
            .then(other.feature.cmp(&self.feature))
    }
}
