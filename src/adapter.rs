//! Classifier adapters
//!
//! One entry point for training any of the three supported families and a
//! closed [`TrainedClassifier`] type that tags each fitted model with the
//! adapter that produced it. Downstream code matches on the variant instead
//! of guessing from runtime shape, so a model can never be explained by the
//! wrong family-specific code path.

use crate::error::{ClearcutError, Result};
use crate::training::{
    BaggedTreesClassifier, BaggedTreesConfig, BoostedLeafwiseClassifier, BoostedLeafwiseConfig,
    BoostedNativeClassifier, BoostedNativeConfig, NativeMatrix, TreeEnsemble,
};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::info;

/// The three supported classifier families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterKind {
    BaggedTrees,
    BoostedNative,
    BoostedLeafwise,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::BaggedTrees => "bagged-trees",
            AdapterKind::BoostedNative => "boosted-native",
            AdapterKind::BoostedLeafwise => "boosted-leafwise",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Training request: which family to use plus optional overrides on top of
/// that family's defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub kind: AdapterKind,
    pub n_estimators: Option<usize>,
    pub max_depth: Option<usize>,
    /// Minimum rows per split (bagged) or per child leaf (leaf-wise)
    pub min_samples: Option<usize>,
    pub seed: Option<u64>,
}

impl AdapterConfig {
    pub fn new(kind: AdapterKind) -> Self {
        Self {
            kind,
            n_estimators: None,
            max_depth: None,
            min_samples: None,
            seed: None,
        }
    }
}

/// A fitted classifier tagged with the family that trained it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedClassifier {
    BaggedTrees(BaggedTreesClassifier),
    BoostedNative(BoostedNativeClassifier),
    BoostedLeafwise(BoostedLeafwiseClassifier),
}

impl TrainedClassifier {
    pub fn kind(&self) -> AdapterKind {
        match self {
            TrainedClassifier::BaggedTrees(_) => AdapterKind::BaggedTrees,
            TrainedClassifier::BoostedNative(_) => AdapterKind::BoostedNative,
            TrainedClassifier::BoostedLeafwise(_) => AdapterKind::BoostedLeafwise,
        }
    }

    /// Error unless this model was produced by the `expected` adapter
    pub fn ensure_kind(&self, expected: AdapterKind) -> Result<()> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(ClearcutError::AdapterMismatch {
                expected: expected.as_str().to_string(),
                actual: self.kind().as_str().to_string(),
            })
        }
    }

    /// Predicted class codes, one per row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            TrainedClassifier::BaggedTrees(model) => model.predict(x),
            TrainedClassifier::BoostedNative(model) => model.predict(x),
            TrainedClassifier::BoostedLeafwise(model) => model.predict(x),
        }
    }

    pub fn n_classes(&self) -> usize {
        self.as_tree_ensemble().n_classes()
    }

    /// Structure view for the tree-aware explainers
    pub fn as_tree_ensemble(&self) -> &dyn TreeEnsemble {
        match self {
            TrainedClassifier::BaggedTrees(model) => model,
            TrainedClassifier::BoostedNative(model) => model,
            TrainedClassifier::BoostedLeafwise(model) => model,
        }
    }
}

/// Train a classifier of the requested family on encoded data.
///
/// `y` must hold integral class codes; at least two distinct classes are
/// required. The class count is taken from the codes, so codes must be dense
/// in `[0, n_classes)`.
pub fn train(config: &AdapterConfig, x: &Array2<f64>, y: &Array1<f64>) -> Result<TrainedClassifier> {
    if x.nrows() != y.len() {
        return Err(ClearcutError::Shape {
            expected: format!("{} target rows", x.nrows()),
            actual: format!("{} target rows", y.len()),
        });
    }
    let distinct: HashSet<u64> = y.iter().map(|&v| v as u64).collect();
    if distinct.len() < 2 {
        return Err(ClearcutError::Training(format!(
            "need at least 2 distinct classes in the training rows, got {}",
            distinct.len()
        )));
    }
    let n_classes = y.iter().fold(0.0f64, |acc, &v| acc.max(v)) as usize + 1;

    info!(kind = %config.kind, rows = x.nrows(), n_classes, "training classifier");

    let model = match config.kind {
        AdapterKind::BaggedTrees => {
            let defaults = BaggedTreesConfig::default();
            let mut family = BaggedTreesConfig {
                n_estimators: config.n_estimators.unwrap_or(defaults.n_estimators),
                max_depth: config.max_depth.or(defaults.max_depth),
                seed: config.seed.unwrap_or(defaults.seed),
                ..defaults
            };
            if let Some(min_samples) = config.min_samples {
                family.min_samples_split = min_samples;
            }
            let mut model = BaggedTreesClassifier::new(family);
            model.fit(x, y, n_classes)?;
            TrainedClassifier::BaggedTrees(model)
        }
        AdapterKind::BoostedNative => {
            let defaults = BoostedNativeConfig::default();
            let family = BoostedNativeConfig {
                n_rounds: config.n_estimators.unwrap_or(defaults.n_rounds),
                max_depth: config.max_depth.unwrap_or(defaults.max_depth),
                seed: config.seed.unwrap_or(defaults.seed),
                ..defaults
            };
            let mut model = BoostedNativeClassifier::new(family);
            // This family trains on its own packed matrix representation
            let dtrain = NativeMatrix::from_array(x);
            model.fit(&dtrain, y, n_classes)?;
            TrainedClassifier::BoostedNative(model)
        }
        AdapterKind::BoostedLeafwise => {
            let defaults = BoostedLeafwiseConfig::default();
            let family = BoostedLeafwiseConfig {
                n_estimators: config.n_estimators.unwrap_or(defaults.n_estimators),
                min_child_samples: config.min_samples.unwrap_or(defaults.min_child_samples),
                ..defaults
            };
            let mut model = BoostedLeafwiseClassifier::new(family);
            model.fit(x, y, n_classes)?;
            TrainedClassifier::BoostedLeafwise(model)
        }
    };
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn binary_data() -> (Array2<f64>, Array1<f64>) {
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

    fn small(kind: AdapterKind) -> AdapterConfig {
        AdapterConfig {
            n_estimators: Some(20),
            min_samples: Some(1),
            ..AdapterConfig::new(kind)
        }
    }

    #[test]
    fn test_train_each_family() {
        let (x, y) = binary_data();
        for kind in [
            AdapterKind::BaggedTrees,
            AdapterKind::BoostedNative,
            AdapterKind::BoostedLeafwise,
        ] {
            let model = train(&small(kind), &x, &y).unwrap();
            assert_eq!(model.kind(), kind);
            let pred = model.predict(&x).unwrap();
            assert_eq!(pred.len(), y.len());
            // Codes stay inside the label range
            assert!(pred.iter().all(|&p| p == 0.0 || p == 1.0));
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 0.0];
        let err = train(&small(AdapterKind::BaggedTrees), &x, &y).unwrap_err();
        assert!(matches!(err, ClearcutError::Training(_)));
    }

    #[test]
    fn test_ensure_kind() {
        let (x, y) = binary_data();
        let model = train(&small(AdapterKind::BaggedTrees), &x, &y).unwrap();
        assert!(model.ensure_kind(AdapterKind::BaggedTrees).is_ok());
        let err = model.ensure_kind(AdapterKind::BoostedNative).unwrap_err();
        assert!(matches!(err, ClearcutError::AdapterMismatch { .. }));
    }

    #[test]
    fn test_n_classes_reported() {
        let (x, y) = binary_data();
        let model = train(&small(AdapterKind::BoostedLeafwise), &x, &y).unwrap();
        assert_eq!(model.n_classes(), 2);
    }
}
