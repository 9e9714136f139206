//! Prediction evaluation
//!
//! Classification metrics over a held-out set plus the misclassification
//! filter that narrows local explanation to the rows the model got wrong.

use crate::error::{ClearcutError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Aligned (features, actual, predicted) rows selected by a filter
#[derive(Debug, Clone)]
pub struct EvaluationSubset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub pred: Array1<f64>,
}

impl EvaluationSubset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Keep only rows where the prediction disagrees with the actual label.
///
/// Row order is preserved, so indices into the subset are stable across
/// identical runs. An empty result is not an error; it means the model got
/// every row right.
pub fn filter_misclassified(
    x: &Array2<f64>,
    y: &Array1<f64>,
    pred: &Array1<f64>,
) -> Result<EvaluationSubset> {
    if x.nrows() != y.len() || y.len() != pred.len() {
        return Err(ClearcutError::Shape {
            expected: format!("{} aligned rows", x.nrows()),
            actual: format!("{} actual / {} predicted", y.len(), pred.len()),
        });
    }
    let indices: Vec<usize> = (0..y.len())
        .filter(|&i| (y[i] - pred[i]).abs() > 0.5)
        .collect();
    Ok(EvaluationSubset {
        x: x.select(Axis(0), &indices),
        y: Array1::from_vec(indices.iter().map(|&i| y[i]).collect()),
        pred: Array1::from_vec(indices.iter().map(|&i| pred[i]).collect()),
    })
}

/// The full test set as an unfiltered subset
pub fn full_subset(x: &Array2<f64>, y: &Array1<f64>, pred: &Array1<f64>) -> Result<EvaluationSubset> {
    if x.nrows() != y.len() || y.len() != pred.len() {
        return Err(ClearcutError::Shape {
            expected: format!("{} aligned rows", x.nrows()),
            actual: format!("{} actual / {} predicted", y.len(), pred.len()),
        });
    }
    Ok(EvaluationSubset {
        x: x.clone(),
        y: y.clone(),
        pred: pred.clone(),
    })
}

/// Per-class precision/recall/F1 for one class code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Classification report over every class plus overall accuracy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassReport {
    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
}

/// Compute precision, recall and F1 per class plus overall accuracy
pub fn classification_report(
    y: &Array1<f64>,
    pred: &Array1<f64>,
    n_classes: usize,
) -> Result<ClassReport> {
    let confusion = confusion_matrix(y, pred, n_classes)?;
    let total: usize = confusion.iter().sum();
    let correct: usize = (0..n_classes).map(|c| confusion[[c, c]]).sum();

    let per_class = (0..n_classes)
        .map(|class| {
            let tp = confusion[[class, class]];
            let predicted: usize = (0..n_classes).map(|a| confusion[[a, class]]).sum();
            let actual: usize = (0..n_classes).map(|p| confusion[[class, p]]).sum();
            let precision = if predicted > 0 {
                tp as f64 / predicted as f64
            } else {
                0.0
            };
            let recall = if actual > 0 {
                tp as f64 / actual as f64
            } else {
                0.0
            };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                class,
                precision,
                recall,
                f1,
                support: actual,
            }
        })
        .collect();

    Ok(ClassReport {
        per_class,
        accuracy: if total > 0 {
            correct as f64 / total as f64
        } else {
            0.0
        },
    })
}

/// Confusion matrix indexed `[actual, predicted]`
pub fn confusion_matrix(
    y: &Array1<f64>,
    pred: &Array1<f64>,
    n_classes: usize,
) -> Result<Array2<usize>> {
    if y.len() != pred.len() {
        return Err(ClearcutError::Shape {
            expected: format!("{} predicted rows", y.len()),
            actual: format!("{} predicted rows", pred.len()),
        });
    }
    let mut matrix = Array2::zeros((n_classes, n_classes));
    for (&actual, &predicted) in y.iter().zip(pred.iter()) {
        let (a, p) = (actual as usize, predicted as usize);
        if a >= n_classes || p >= n_classes {
            return Err(ClearcutError::Data(format!(
                "class code out of range: actual {} predicted {} with {} classes",
                actual, predicted, n_classes
            )));
        }
        matrix[[a, p]] += 1;
    }
    Ok(matrix)
}

/// Fraction of rows where prediction equals the actual code
pub fn accuracy(y: &Array1<f64>, pred: &Array1<f64>) -> Result<f64> {
    if y.len() != pred.len() {
        return Err(ClearcutError::Shape {
            expected: format!("{} predicted rows", y.len()),
            actual: format!("{} predicted rows", pred.len()),
        });
    }
    if y.is_empty() {
        return Ok(0.0);
    }
    let correct = y
        .iter()
        .zip(pred.iter())
        .filter(|(a, p)| (**a - **p).abs() < 0.5)
        .count();
    Ok(correct as f64 / y.len() as f64)
}
