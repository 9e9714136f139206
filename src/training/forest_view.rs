//! Flattened tree representation shared by every classifier family
//!
//! Both explanation methodologies need to walk trained trees: the additive
//! decomposition requires split structure plus cover statistics, and the
//! weight-based local methodology needs cover-weighted node expectations.
//! Each family projects its fitted ensemble into this common view instead of
//! exposing its internal node types.

use serde::{Deserialize, Serialize};

/// A node in a flattened tree; the root is always index 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ViewNode {
    Leaf {
        value: f64,
        cover: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        cover: f64,
    },
}

/// A single flattened tree with cover statistics on every node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeView {
    pub nodes: Vec<ViewNode>,
}

impl TreeView {
    /// Evaluate the tree for one sample; `<= threshold` goes left
    pub fn predict(&self, sample: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                ViewNode::Leaf { value, .. } => return *value,
                ViewNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn cover(&self, idx: usize) -> f64 {
        match &self.nodes[idx] {
            ViewNode::Leaf { cover, .. } => *cover,
            ViewNode::Split { cover, .. } => *cover,
        }
    }

    /// Cover-weighted expected value of every node, computed bottom-up.
    ///
    /// Index 0 is the tree's expected output over its training distribution.
    pub fn node_values(&self) -> Vec<f64> {
        let mut values = vec![0.0; self.nodes.len()];
        self.fill_node_values(0, &mut values);
        values
    }

    fn fill_node_values(&self, idx: usize, values: &mut [f64]) -> f64 {
        let value = match &self.nodes[idx] {
            ViewNode::Leaf { value, .. } => *value,
            ViewNode::Split { left, right, .. } => {
                let (left, right) = (*left, *right);
                let lv = self.fill_node_values(left, values);
                let rv = self.fill_node_values(right, values);
                let lc = self.cover(left);
                let rc = self.cover(right);
                (lc * lv + rc * rv) / (lc + rc)
            }
        };
        values[idx] = value;
        value
    }

    /// Expected output of the tree under its training distribution
    pub fn expected_value(&self) -> f64 {
        self.node_values()[0]
    }
}

/// Structure view a trained classifier exposes to the tree-aware explainers.
///
/// The additive-contribution methodology is only defined for models that can
/// implement this trait; all three shipped families are tree ensembles and do.
pub trait TreeEnsemble {
    /// Number of class outputs
    fn n_classes(&self) -> usize;

    /// Trees contributing to the output for `class`, with leaf values scaled
    /// so that `base_value(class) + sum of tree expectations + contributions`
    /// reconstructs the model's score for that class
    fn class_trees(&self, class: usize) -> Vec<TreeView>;

    /// Constant offset of the `class` output before any tree is applied
    fn base_value(&self, class: usize) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> TreeView {
        TreeView {
            nodes: vec![
                ViewNode::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                    cover: 100.0,
                },
                ViewNode::Leaf {
                    value: -1.0,
                    cover: 75.0,
                },
                ViewNode::Leaf {
                    value: 1.0,
                    cover: 25.0,
                },
            ],
        }
    }

    #[test]
    fn test_predict_follows_threshold() {
        let tree = stump();
        assert_eq!(tree.predict(&[0.3]), -1.0);
        assert_eq!(tree.predict(&[0.5]), -1.0);
        assert_eq!(tree.predict(&[0.7]), 1.0);
    }

    #[test]
    fn test_expected_value_is_cover_weighted() {
        let tree = stump();
        // (75 * -1 + 25 * 1) / 100
        assert!((tree.expected_value() - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_node_values() {
        let tree = stump();
        let values = tree.node_values();
        assert_eq!(values[1], -1.0);
        assert_eq!(values[2], 1.0);
        assert!((values[0] - (-0.5)).abs() < 1e-12);
    }
}
