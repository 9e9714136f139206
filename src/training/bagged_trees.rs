//! Bagged tree ensemble classifier
//!
//! Bootstrap-aggregated decision trees with per-split feature subsampling.
//! Prediction averages the leaf class histograms across trees and takes the
//! argmax, so the probability the explainers decompose is exactly the score
//! the predicted class won with.

use crate::error::{ClearcutError, Result};
use crate::training::decision_tree::{DecisionTreeClassifier, DecisionTreeConfig};
use crate::training::forest_view::{TreeEnsemble, TreeView};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaggedTreesConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` uses sqrt of the feature count
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for BaggedTreesConfig {
    fn default() -> Self {
        Self {
            n_estimators: 500,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 0,
        }
    }
}

/// A fitted bagged ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaggedTreesClassifier {
    config: BaggedTreesConfig,
    trees: Vec<DecisionTreeClassifier>,
    n_classes: usize,
    n_features: usize,
}

impl BaggedTreesClassifier {
    pub fn new(config: BaggedTreesConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_classes: 0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(ClearcutError::Shape {
                expected: format!("{} target rows", x.nrows()),
                actual: format!("{} target rows", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(ClearcutError::InsufficientData { needed: 1, got: 0 });
        }

        let n = x.nrows();
        let max_features = self
            .config
            .max_features
            .unwrap_or_else(|| ((x.ncols() as f64).sqrt().ceil() as usize).max(1));

        // One bootstrap sample per tree, drawn up front so tree fitting can
        // run in parallel without sharing an RNG
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let bootstraps: Vec<Vec<usize>> = (0..self.config.n_estimators)
            .map(|_| (0..n).map(|_| rng.gen_range(0..n)).collect())
            .collect();

        debug!(
            n_estimators = self.config.n_estimators,
            max_features, "fitting bagged ensemble"
        );

        let base = self.config.clone();
        let trees = bootstraps
            .into_par_iter()
            .enumerate()
            .map(|(idx, sample)| {
                let mut tree = DecisionTreeClassifier::new(DecisionTreeConfig {
                    max_depth: base.max_depth,
                    min_samples_split: base.min_samples_split,
                    min_samples_leaf: base.min_samples_leaf,
                    max_features: Some(max_features),
                    seed: base.seed.wrapping_add(idx as u64),
                });
                tree.fit_indices(x.view(), y.view(), sample, n_classes)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;
        self.trees = trees;
        self.n_classes = n_classes;
        self.n_features = x.ncols();
        Ok(())
    }

    /// Mean leaf class histogram across trees, one row per sample
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(ClearcutError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(ClearcutError::Shape {
                expected: format!("{} feature columns", self.n_features),
                actual: format!("{} feature columns", x.ncols()),
            });
        }

        let rows: Vec<Vec<f64>> = x
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect();
        let proba_rows: Vec<Vec<f64>> = rows
            .par_iter()
            .map(|sample| {
                let mut acc = vec![0.0; self.n_classes];
                for tree in &self.trees {
                    let p = tree.predict_proba_one(sample)?;
                    for (a, v) in acc.iter_mut().zip(p) {
                        *a += v;
                    }
                }
                for a in acc.iter_mut() {
                    *a /= self.trees.len() as f64;
                }
                Ok(acc)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (row, values) in proba_rows.into_iter().enumerate() {
            for (class, v) in values.into_iter().enumerate() {
                proba[[row, class]] = v;
            }
        }
        Ok(proba)
    }

    /// Predicted class code per row, argmax of the averaged histograms
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(Array1::from_shape_fn(proba.nrows(), |row| {
            argmax(&proba.row(row).to_vec()) as f64
        }))
    }
}

impl TreeEnsemble for BaggedTreesClassifier {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn class_trees(&self, class: usize) -> Vec<TreeView> {
        let scale = 1.0 / self.trees.len() as f64;
        self.trees
            .iter()
            .filter_map(|tree| tree.class_view(class, scale).ok())
            .collect()
    }

    fn base_value(&self, _class: usize) -> f64 {
        0.0
    }
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = idx;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_config() -> BaggedTreesConfig {
        BaggedTreesConfig {
            n_estimators: 25,
            ..Default::default()
        }
    }

    fn separable() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 0.0],
            [1.5, 1.0],
            [2.0, 0.0],
            [2.5, 1.0],
            [8.0, 1.0],
            [8.5, 0.0],
            [9.0, 1.0],
            [9.5, 0.0],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_fit_predict() {
        let (x, y) = separable();
        let mut model = BaggedTreesClassifier::new(small_config());
        model.fit(&x, &y, 2).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_deterministic_across_fits() {
        let (x, y) = separable();
        let mut a = BaggedTreesClassifier::new(small_config());
        let mut b = BaggedTreesClassifier::new(small_config());
        a.fit(&x, &y, 2).unwrap();
        b.fit(&x, &y, 2).unwrap();
        assert_eq!(
            a.predict_proba(&x).unwrap(),
            b.predict_proba(&x).unwrap()
        );
    }

    #[test]
    fn test_proba_rows_sum_to_one() {
        let (x, y) = separable();
        let mut model = BaggedTreesClassifier::new(small_config());
        model.fit(&x, &y, 2).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            let total: f64 = row.sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_class_trees_reconstruct_proba() {
        let (x, y) = separable();
        let mut model = BaggedTreesClassifier::new(small_config());
        model.fit(&x, &y, 2).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        let trees = model.class_trees(1);
        for row in 0..x.nrows() {
            let sample: Vec<f64> = x.row(row).to_vec();
            let score: f64 = trees.iter().map(|t| t.predict(&sample)).sum();
            assert!((score - proba[[row, 1]]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_predict_unfitted_fails() {
        let model = BaggedTreesClassifier::new(small_config());
        let x = array![[1.0, 2.0]];
        assert!(matches!(
            model.predict(&x),
            Err(ClearcutError::ModelNotFitted)
        ));
    }
}
