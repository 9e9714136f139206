//! Reproducible train/test splitting

use crate::error::{ClearcutError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Default train fraction, matching the interactive 80/20 convention
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;

/// Default shuffle seed; fixed so row indices stay stable across re-runs
pub const DEFAULT_SEED: u64 = 0;

/// A single train/test partition of encoded data
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
}

/// Split encoded data into train and test subsets.
///
/// The shuffle is seeded, so calling twice on identical input yields the
/// identical partition. Downstream misclassification filtering and local
/// explanation row indices rely on that stability.
pub fn train_test_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    train_ratio: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    let n = x.nrows();
    if n != y.len() {
        return Err(ClearcutError::Shape {
            expected: format!("target length {}", n),
            actual: format!("target length {}", y.len()),
        });
    }
    if n < 2 {
        return Err(ClearcutError::InsufficientData { needed: 2, got: n });
    }
    if !(0.0..1.0).contains(&train_ratio) || train_ratio == 0.0 {
        return Err(ClearcutError::Data(format!(
            "train_ratio must be in (0, 1), got {}",
            train_ratio
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    // At least one row on each side
    let n_train = ((n as f64 * train_ratio) as usize).clamp(1, n - 1);
    let (train_idx, test_idx) = indices.split_at(n_train);

    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), train_idx),
        x_test: x.select(Axis(0), test_idx),
        y_train: Array1::from_vec(train_idx.iter().map(|&i| y[i]).collect()),
        y_test: Array1::from_vec(test_idx.iter().map(|&i| y[i]).collect()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(r, c)| (r * 2 + c) as f64);
        let y = Array1::from_shape_fn(n, |i| (i % 2) as f64);
        (x, y)
    }

    #[test]
    fn test_split_sizes() {
        let (x, y) = data(10);
        let split = train_test_split(&x, &y, 0.8, 0).unwrap();
        assert_eq!(split.x_train.nrows(), 8);
        assert_eq!(split.x_test.nrows(), 2);
        assert_eq!(split.y_train.len(), 8);
        assert_eq!(split.y_test.len(), 2);
    }

    #[test]
    fn test_split_deterministic() {
        let (x, y) = data(20);
        let a = train_test_split(&x, &y, 0.8, 0).unwrap();
        let b = train_test_split(&x, &y, 0.8, 0).unwrap();
        assert_eq!(a.x_train, b.x_train);
        assert_eq!(a.x_test, b.x_test);
        assert_eq!(a.y_train, b.y_train);
        assert_eq!(a.y_test, b.y_test);
    }

    #[test]
    fn test_split_rows_stay_aligned() {
        let (x, y) = data(10);
        let split = train_test_split(&x, &y, 0.8, 7).unwrap();
        // Each x row encodes its original index; check alignment with y
        for (row, &label) in split.x_train.rows().into_iter().zip(split.y_train.iter()) {
            let original = (row[0] / 2.0) as usize;
            assert_eq!(label, (original % 2) as f64);
        }
    }

    #[test]
    fn test_split_too_few_rows() {
        let (x, y) = data(1);
        let err = train_test_split(&x, &y, 0.8, 0).unwrap_err();
        assert!(matches!(err, ClearcutError::InsufficientData { .. }));
    }

    #[test]
    fn test_split_bad_ratio() {
        let (x, y) = data(10);
        assert!(train_test_split(&x, &y, 0.0, 0).is_err());
        assert!(train_test_split(&x, &y, 1.5, 0).is_err());
    }
}
