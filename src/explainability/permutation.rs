//! Permutation-based explanation strategy
//!
//! Global importance shuffles one feature column at a time and measures the
//! accuracy the model loses, averaged over a fixed number of seeded repeats.
//! Local attribution reuses the deterministic decision-path weights, so a
//! row's explanation never changes between identical runs.

use crate::adapter::{AdapterKind, TrainedClassifier};
use crate::error::{ClearcutError, Result};
use crate::evaluation::accuracy;
use crate::explainability::{
    path_weights, rank_contributions, rank_features, ExplainStrategy, GlobalExplanation,
    LocalExplanation, Methodology,
};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// Default shuffle repeats per feature
pub const DEFAULT_N_REPEATS: usize = 2;

/// Default seed for the column shuffles
pub const DEFAULT_PERMUTATION_SEED: u64 = 1;

#[derive(Debug, Clone)]
pub struct PermutationStrategy {
    pub n_repeats: usize,
    pub seed: u64,
}

impl Default for PermutationStrategy {
    fn default() -> Self {
        Self {
            n_repeats: DEFAULT_N_REPEATS,
            seed: DEFAULT_PERMUTATION_SEED,
        }
    }
}

impl ExplainStrategy for PermutationStrategy {
    fn methodology(&self) -> Methodology {
        Methodology::Permutation
    }

    fn explain_global(
        &self,
        model: &TrainedClassifier,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
        top_k: usize,
    ) -> Result<GlobalExplanation> {
        if x.nrows() != y.len() {
            return Err(ClearcutError::Shape {
                expected: format!("{} target rows", x.nrows()),
                actual: format!("{} target rows", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(ClearcutError::InsufficientData { needed: 1, got: 0 });
        }

        let baseline = accuracy(y, &model.predict(x)?)?;
        debug!(baseline, n_repeats = self.n_repeats, "permutation importance");

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut scores = vec![0.0; x.ncols()];
        for _ in 0..self.n_repeats {
            for feature in 0..x.ncols() {
                let mut permuted = x.clone();
                let mut column: Vec<f64> = permuted.column(feature).to_vec();
                column.shuffle(&mut rng);
                for (row, value) in column.into_iter().enumerate() {
                    permuted[[row, feature]] = value;
                }
                let dropped = baseline - accuracy(y, &model.predict(&permuted)?)?;
                scores[feature] += dropped;
            }
        }
        for score in scores.iter_mut() {
            *score /= self.n_repeats as f64;
        }

        Ok(GlobalExplanation {
            methodology: Methodology::Permutation,
            entries: rank_features(&scores, feature_names, top_k)?,
        })
    }

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
        let sample: Vec<f64> = x.row(row_index).to_vec();
        let row = x.select(ndarray::Axis(0), &[row_index]);
        let predicted_class = model.predict(&row)?[0] as usize;

        let (base_value, contributions) = path_weights::path_contributions(
            model.as_tree_ensemble(),
            predicted_class,
            &sample,
            x.ncols(),
        );

        // The depth-wise boosted family scores in raw margin space and does
        // not carry a label vocabulary through its matrix interface
        let predicted_label = match model.kind() {
            AdapterKind::BoostedNative => None,
            _ => target_labels.get(predicted_class).cloned(),
        };

        Ok(LocalExplanation {
            methodology: Methodology::Permutation,
            row_index,
            predicted_class,
            predicted_label,
            base_value,
            contributions: rank_contributions(&contributions, &sample, feature_names, top_k),
        })
    }
}
