//! Model explanation module
//!
//! Two methodologies behind one trait:
//! - [`permutation`]: global importance by shuffling one feature at a time,
//!   local attribution by walking each tree's decision path
//! - [`tree_shap`]: exact additive contributions with the polynomial-time
//!   tree decomposition
//!
//! Both produce the same record types, so callers switch methodology without
//! touching their rendering code.

pub mod path_weights;
pub mod permutation;
pub mod tree_shap;

use crate::adapter::TrainedClassifier;
use crate::error::{ClearcutError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use permutation::PermutationStrategy;
pub use tree_shap::AdditiveStrategy;

/// Number of features a truncated explanation keeps by default
pub const DEFAULT_TOP_K: usize = 5;

/// Decimal places global importance scores are rounded to
const DISPLAY_DECIMALS: i32 = 2;

/// Which explanation methodology to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Methodology {
    Permutation,
    AdditiveContribution,
}

impl Methodology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Methodology::Permutation => "permutation",
            Methodology::AdditiveContribution => "additive-contribution",
        }
    }

    /// Strategy object implementing this methodology
    pub fn strategy(&self) -> Box<dyn ExplainStrategy> {
        match self {
            Methodology::Permutation => Box::new(PermutationStrategy::default()),
            Methodology::AdditiveContribution => Box::new(AdditiveStrategy::default()),
        }
    }
}

impl fmt::Display for Methodology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One feature with its global importance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFeature {
    pub feature: String,
    pub score: f64,
}

/// Global view: features ranked by importance, highest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalExplanation {
    pub methodology: Methodology,
    pub entries: Vec<RankedFeature>,
}

/// One feature's share of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    /// The row's value for this feature
    pub value: f64,
    pub contribution: f64,
}

/// Local view: how one row's prediction decomposes over its feature values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalExplanation {
    pub methodology: Methodology,
    pub row_index: usize,
    pub predicted_class: usize,
    /// Human-readable label for the predicted class; absent for families
    /// that score in raw margin space without a label vocabulary
    pub predicted_label: Option<String>,
    /// Model output before any feature contribution is applied
    pub base_value: f64,
    /// Strongest contributions first, by absolute value
    pub contributions: Vec<FeatureContribution>,
}

/// A methodology that can explain a trained classifier globally and locally
pub trait ExplainStrategy {
    fn methodology(&self) -> Methodology;

    /// Rank all features by importance over a labeled evaluation set,
    /// truncated to the `top_k` strongest
    fn explain_global(
        &self,
        model: &TrainedClassifier,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
        top_k: usize,
    ) -> Result<GlobalExplanation>;

    /// Decompose the prediction for one row of `x`
    #[allow(clippy::too_many_arguments)]
    fn explain_local(
        &self,
        model: &TrainedClassifier,
        x: &Array2<f64>,
        row_index: usize,
        feature_names: &[String],
        target_labels: &[String],
        top_k: usize,
    ) -> Result<LocalExplanation>;
}

/// Round a score to display precision
pub(crate) fn round_score(value: f64) -> f64 {
    let scale = 10f64.powi(DISPLAY_DECIMALS);
    (value * scale).round() / scale
}

/// Rank raw per-feature scores, round them, and keep the `top_k` strongest
pub(crate) fn rank_features(
    scores: &[f64],
    feature_names: &[String],
    top_k: usize,
) -> Result<Vec<RankedFeature>> {
    if scores.len() != feature_names.len() {
        return Err(ClearcutError::Shape {
            expected: format!("{} feature names", scores.len()),
            actual: format!("{} feature names", feature_names.len()),
        });
    }
    let mut entries: Vec<RankedFeature> = scores
        .iter()
        .zip(feature_names)
        .map(|(&score, name)| RankedFeature {
            feature: name.clone(),
            score: round_score(score),
        })
        .collect();
    entries.sort_by(|a, b| {
        b.score
            .abs()
            .partial_cmp(&a.score.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.feature.cmp(&b.feature))
    });
    entries.truncate(top_k);
    Ok(entries)
}

/// Sort contributions by absolute strength and keep the `top_k` strongest
pub(crate) fn rank_contributions(
    contributions: &[f64],
    sample: &[f64],
    feature_names: &[String],
    top_k: usize,
) -> Vec<FeatureContribution> {
    let mut entries: Vec<FeatureContribution> = contributions
        .iter()
        .zip(sample)
        .zip(feature_names)
        .map(|((&contribution, &value), name)| FeatureContribution {
            feature: name.clone(),
            value,
            contribution,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.contribution
            .abs()
            .partial_cmp(&a.contribution.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.feature.cmp(&b.feature))
    });
    entries.truncate(top_k);
    entries
}
