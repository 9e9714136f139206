//! Decision-path attribution
//!
//! Walks each tree along the route one sample actually takes and credits
//! every feature with the change in cover-weighted expected value across its
//! split. Fully deterministic: two calls on the same model and row always
//! produce the same weights.

use crate::training::forest_view::{TreeEnsemble, TreeView, ViewNode};

/// Decompose the model's score for `class` on one sample.
///
/// Returns the base value (constant offset plus every tree's expectation)
/// and one contribution per feature. The base plus the contributions sum to
/// the model's raw score for the class.
pub fn path_contributions(
    ensemble: &dyn TreeEnsemble,
    class: usize,
    sample: &[f64],
    n_features: usize,
) -> (f64, Vec<f64>) {
    let mut base = ensemble.base_value(class);
    let mut contributions = vec![0.0; n_features];
    for tree in ensemble.class_trees(class) {
        base += tree_path_contributions(&tree, sample, &mut contributions);
    }
    (base, contributions)
}

/// Walk one tree's path for the sample; returns the tree's expected value
fn tree_path_contributions(tree: &TreeView, sample: &[f64], contributions: &mut [f64]) -> f64 {
    let values = tree.node_values();
    let mut idx = 0;
    loop {
        match &tree.nodes[idx] {
            ViewNode::Leaf { .. } => return values[0],
            ViewNode::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } => {
                let next = if sample[*feature] <= *threshold {
                    *left
                } else {
                    *right
                };
                contributions[*feature] += values[next] - values[idx];
                idx = next;
            }
        }
    }
}
