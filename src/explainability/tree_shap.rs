//! Exact additive feature contributions for tree ensembles
//!
//! Polynomial-time decomposition of a tree's output into per-feature
//! contributions. Each split is walked twice, once down the branch the
//! sample takes (the hot child) and once down the other, carrying the
//! fraction of training cover that could still reach each leaf. The
//! resulting contributions plus the model's expected value reconstruct the
//! raw score exactly.

use crate::adapter::{AdapterKind, TrainedClassifier};
use crate::error::{ClearcutError, Result};
use crate::explainability::{
    rank_contributions, rank_features, ExplainStrategy, GlobalExplanation, LocalExplanation,
    Methodology,
};
use crate::training::forest_view::{TreeEnsemble, TreeView, ViewNode};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct AdditiveStrategy;

impl ExplainStrategy for AdditiveStrategy {
    fn methodology(&self) -> Methodology {
        Methodology::AdditiveContribution
    }

    /// Mean absolute contribution per feature, averaged over every row and
    /// every class output
    fn explain_global(
        &self,
        model: &TrainedClassifier,
        x: &Array2<f64>,
        _y: &Array1<f64>,
        feature_names: &[String],
        top_k: usize,
    ) -> Result<GlobalExplanation> {
        if x.nrows() == 0 {
            return Err(ClearcutError::InsufficientData { needed: 1, got: 0 });
        }
        let ensemble = model.as_tree_ensemble();
        let n_classes = ensemble.n_classes();
        debug!(rows = x.nrows(), n_classes, "additive global importance");

        let mut scores = vec![0.0; x.ncols()];
        for class in 0..n_classes {
            let (_, contributions) = class_contributions(ensemble, class, x)?;
            for row in contributions.rows() {
                for (score, &phi) in scores.iter_mut().zip(row) {
                    *score += phi.abs();
                }
            }
        }
        let denom = (x.nrows() * n_classes) as f64;
        for score in scores.iter_mut() {
            *score /= denom;
        }

        Ok(GlobalExplanation {
            methodology: Methodology::AdditiveContribution,
            entries: rank_features(&scores, feature_names, top_k)?,
        })
    }

    /// Contributions toward the row's predicted class, so the base value is
    /// the expected score of the class the model actually chose
    fn explain_local(
        &self,
        model: &TrainedClassifier,
        x: &Array2<f64>,
        row_index: usize,
        feature_names: &[String],
        target_labels: &[String],
        top_k: usize,
    ) -> Result<LocalExplanation> {
        if row_index >= x.nrows() {
            return Err(ClearcutError::IndexOutOfRange {
                index: row_index,
                len: x.nrows(),
            });
        }
        if feature_names.len() != x.ncols() {
            return Err(ClearcutError::Shape {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        let row = x.select(ndarray::Axis(0), &[row_index]);
        let predicted_class = model.predict(&row)?[0] as usize;
        let (base_value, contributions) =
            class_contributions(model.as_tree_ensemble(), predicted_class, &row)?;
        let sample: Vec<f64> = x.row(row_index).to_vec();

        let predicted_label = match model.kind() {
            AdapterKind::BoostedNative => None,
            _ => target_labels.get(predicted_class).cloned(),
        };

        Ok(LocalExplanation {
            methodology: Methodology::AdditiveContribution,
            row_index,
            predicted_class,
            predicted_label,
            base_value,
            contributions: rank_contributions(
                &contributions.row(0).to_vec(),
                &sample,
                feature_names,
                top_k,
            ),
        })
    }
}

/// Additive contributions toward one class output for every row of `x`.
///
/// Returns the class's expected score (the base value) and a row-per-sample
/// contribution matrix. For each row, base plus the row's contributions
/// equals the ensemble's raw score for the class.
pub fn class_contributions(
    ensemble: &dyn TreeEnsemble,
    class: usize,
    x: &Array2<f64>,
) -> Result<(f64, Array2<f64>)> {
    if class >= ensemble.n_classes() {
        return Err(ClearcutError::IndexOutOfRange {
            index: class,
            len: ensemble.n_classes(),
        });
    }
    let trees = ensemble.class_trees(class);
    let base = ensemble.base_value(class)
        + trees.iter().map(|tree| tree.expected_value()).sum::<f64>();

    let samples: Vec<Vec<f64>> = x.rows().into_iter().map(|row| row.to_vec()).collect();
    let rows: Vec<Vec<f64>> = samples
        .par_iter()
        .map(|sample| {
            let mut phi = vec![0.0; x.ncols()];
            for tree in &trees {
                tree_contributions(tree, sample, &mut phi);
            }
            phi
        })
        .collect();

    let mut contributions = Array2::zeros((x.nrows(), x.ncols()));
    for (r, row) in rows.into_iter().enumerate() {
        for (c, phi) in row.into_iter().enumerate() {
            contributions[[r, c]] = phi;
        }
    }
    Ok((base, contributions))
}

/// Accumulate one tree's contributions for one sample into `phi`
pub fn tree_contributions(tree: &TreeView, sample: &[f64], phi: &mut [f64]) {
    recurse(tree, sample, phi, 0, &[], 1.0, 1.0, -1);
}

/// One step of the path the decomposition tracks through the tree: the
/// feature that split it, the fraction of cover flowing through when the
/// feature is unknown (zero) or matches the sample (one), and the
/// permutation weight accumulated so far
#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: isize,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

fn recurse(
    tree: &TreeView,
    sample: &[f64],
    phi: &mut [f64],
    node: usize,
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: isize,
) {
    let mut path = parent_path.to_vec();
    extend(&mut path, zero_fraction, one_fraction, feature);

    match &tree.nodes[node] {
        ViewNode::Leaf { value, .. } => {
            for i in 1..path.len() {
                let weight = unwound_sum(&path, i);
                let element = path[i];
                phi[element.feature as usize] +=
                    weight * (element.one_fraction - element.zero_fraction) * value;
            }
        }
        ViewNode::Split {
            feature: split_feature,
            threshold,
            left,
            right,
            ..
        } => {
            let (hot, cold) = if sample[*split_feature] <= *threshold {
                (*left, *right)
            } else {
                (*right, *left)
            };
            let total_cover = tree.cover(node);
            let hot_fraction = tree.cover(hot) / total_cover;
            let cold_fraction = tree.cover(cold) / total_cover;

            // A feature already on the path is unwound and its fractions
            // folded into the new occurrence
            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(pos) = path
                .iter()
                .skip(1)
                .position(|e| e.feature == *split_feature as isize)
            {
                let pos = pos + 1;
                incoming_zero = path[pos].zero_fraction;
                incoming_one = path[pos].one_fraction;
                unwind(&mut path, pos);
            }

            recurse(
                tree,
                sample,
                phi,
                hot,
                &path,
                incoming_zero * hot_fraction,
                incoming_one,
                *split_feature as isize,
            );
            recurse(
                tree,
                sample,
                phi,
                cold,
                &path,
                incoming_zero * cold_fraction,
                0.0,
                *split_feature as isize,
            );
        }
    }
}

fn extend(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: isize) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    for i in (0..depth).rev() {
        path[i + 1].pweight +=
            one_fraction * path[i].pweight * (i as f64 + 1.0) / (depth as f64 + 1.0);
        path[i].pweight *= zero_fraction * (depth as f64 - i as f64) / (depth as f64 + 1.0);
    }
}

fn unwind(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;

    let mut next_one_portion = path[depth].pweight;
    if one_fraction != 0.0 {
        for i in (0..depth).rev() {
            let tmp = path[i].pweight;
            path[i].pweight =
                next_one_portion * (depth as f64 + 1.0) / ((i as f64 + 1.0) * one_fraction);
            next_one_portion = tmp
                - path[i].pweight * zero_fraction * (depth as f64 - i as f64)
                    / (depth as f64 + 1.0);
        }
    } else {
        for i in (0..depth).rev() {
            path[i].pweight = path[i].pweight * (depth as f64 + 1.0)
                / (zero_fraction * (depth as f64 - i as f64));
        }
    }
    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight the element at `index` would have if unwound,
/// without mutating the path
fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let mut total = 0.0;

    if one_fraction != 0.0 {
        let mut next_one_portion = path[depth].pweight;
        for i in (0..depth).rev() {
            let tmp = next_one_portion / ((i as f64 + 1.0) * one_fraction);
            total += tmp;
            next_one_portion =
                path[i].pweight - tmp * zero_fraction * (depth as f64 - i as f64);
        }
    } else {
        for i in (0..depth).rev() {
            total += path[i].pweight / (zero_fraction * (depth as f64 - i as f64));
        }
    }
    total * (depth as f64 + 1.0)
}
