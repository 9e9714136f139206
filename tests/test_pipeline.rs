//! End-to-end pipeline tests: encode, split, train, evaluate

use clearcut::adapter::{train, AdapterConfig, AdapterKind};
use clearcut::error::ClearcutError;
use clearcut::evaluation::{classification_report, confusion_matrix, filter_misclassified};
use clearcut::preprocessing::{encode, train_test_split, DEFAULT_SEED, DEFAULT_TRAIN_RATIO};
use ndarray::{array, Array1, Array2};
use polars::prelude::*;

/// 150 rows, 3 classes, one numeric plus one categorical column that expands
/// to three dummies
fn three_class_df() -> DataFrame {
    let n = 150;
    let measure: Vec<f64> = (0..n)
        .map(|i| match i % 3 {
            0 => 1.0 + (i % 10) as f64 * 0.1,
            1 => 5.0 + (i % 10) as f64 * 0.1,
            _ => 9.0 + (i % 10) as f64 * 0.1,
        })
        .collect();
    let shade: Vec<&str> = (0..n)
        .map(|i| match i % 3 {
            0 => "pale",
            1 => "mid",
            _ => "deep",
        })
        .collect();
    let species: Vec<&str> = (0..n)
        .map(|i| match i % 3 {
            0 => "setosa",
            1 => "versicolor",
            _ => "virginica",
        })
        .collect();
    df!("measure" => measure, "shade" => shade, "species" => species).unwrap()
}

fn binary_data(n: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((n, 3), |(r, c)| {
        let class = (r >= n / 2) as usize as f64;
        match c {
            0 => class * 6.0 + (r % 5) as f64 * 0.2,
            1 => (r % 7) as f64,
            _ => class,
        }
    });
    let y = Array1::from_shape_fn(n, |r| (r >= n / 2) as usize as f64);
    (x, y)
}

fn fast(kind: AdapterKind) -> AdapterConfig {
    AdapterConfig {
        n_estimators: Some(20),
        min_samples: Some(1),
        ..AdapterConfig::new(kind)
    }
}

#[test]
fn test_encode_three_class_table() {
    let table = encode(&three_class_df(), "species").unwrap();
    assert_eq!(table.n_rows(), 150);
    // measure + 3 shade dummies
    assert_eq!(table.n_features(), 4);
    assert_eq!(
        table.target_labels,
        vec!["setosa", "versicolor", "virginica"]
    );
    assert_eq!(table.n_classes(), 3);
    assert_eq!(
        table.feature_names,
        vec!["measure", "shade_pale", "shade_mid", "shade_deep"]
    );
}

#[test]
fn test_default_split_is_80_20_and_stable() {
    let table = encode(&three_class_df(), "species").unwrap();
    let a = train_test_split(
        &table.features,
        &table.target,
        DEFAULT_TRAIN_RATIO,
        DEFAULT_SEED,
    )
    .unwrap();
    assert_eq!(a.x_train.nrows(), 120);
    assert_eq!(a.x_test.nrows(), 30);

    let b = train_test_split(
        &table.features,
        &table.target,
        DEFAULT_TRAIN_RATIO,
        DEFAULT_SEED,
    )
    .unwrap();
    assert_eq!(a.x_test, b.x_test);
    assert_eq!(a.y_test, b.y_test);
}

#[test]
fn test_every_family_predicts_valid_codes() {
    let (x, y) = binary_data(150);
    let split = train_test_split(&x, &y, DEFAULT_TRAIN_RATIO, DEFAULT_SEED).unwrap();
    assert_eq!(split.x_train.nrows(), 120);
    assert_eq!(split.x_test.nrows(), 30);

    for kind in [
        AdapterKind::BaggedTrees,
        AdapterKind::BoostedNative,
        AdapterKind::BoostedLeafwise,
    ] {
        let model = train(&fast(kind), &split.x_train, &split.y_train).unwrap();
        let pred = model.predict(&split.x_test).unwrap();
        assert_eq!(pred.len(), 30, "{} prediction count", kind);
        assert!(
            pred.iter().all(|&p| p == 0.0 || p == 1.0),
            "{} produced a code outside the label range",
            kind
        );
    }
}

#[test]
fn test_every_family_learns_separable_data() {
    let (x, y) = binary_data(150);
    let split = train_test_split(&x, &y, DEFAULT_TRAIN_RATIO, DEFAULT_SEED).unwrap();
    for kind in [
        AdapterKind::BaggedTrees,
        AdapterKind::BoostedNative,
        AdapterKind::BoostedLeafwise,
    ] {
        let model = train(&fast(kind), &split.x_train, &split.y_train).unwrap();
        let pred = model.predict(&split.x_test).unwrap();
        let report = classification_report(&split.y_test, &pred, 2).unwrap();
        assert!(
            report.accuracy > 0.9,
            "{} accuracy was {}",
            kind,
            report.accuracy
        );
    }
}

#[test]
fn test_three_class_end_to_end() {
    let table = encode(&three_class_df(), "species").unwrap();
    let split = train_test_split(
        &table.features,
        &table.target,
        DEFAULT_TRAIN_RATIO,
        DEFAULT_SEED,
    )
    .unwrap();
    let model = train(&fast(AdapterKind::BoostedNative), &split.x_train, &split.y_train).unwrap();
    let pred = model.predict(&split.x_test).unwrap();
    assert_eq!(model.n_classes(), 3);
    assert!(pred.iter().all(|&p| p == 0.0 || p == 1.0 || p == 2.0));

    let confusion = confusion_matrix(&split.y_test, &pred, 3).unwrap();
    let total: usize = confusion.iter().sum();
    assert_eq!(total, 30);
}

#[test]
fn test_filter_misclassified_selects_disagreements() {
    let x = array![[0.0], [1.0], [2.0], [3.0]];
    let y = array![0.0, 1.0, 1.0, 0.0];
    let pred = array![0.0, 0.0, 1.0, 1.0];
    let subset = filter_misclassified(&x, &y, &pred).unwrap();
    assert_eq!(subset.len(), 2);
    assert_eq!(subset.x, array![[1.0], [3.0]]);
}

#[test]
fn test_report_accuracy_matches_misclassified_count() {
    let (x, y) = binary_data(150);
    let split = train_test_split(&x, &y, DEFAULT_TRAIN_RATIO, DEFAULT_SEED).unwrap();
    let model = train(&fast(AdapterKind::BaggedTrees), &split.x_train, &split.y_train).unwrap();
    let pred = model.predict(&split.x_test).unwrap();
    let report = classification_report(&split.y_test, &pred, 2).unwrap();
    let subset = filter_misclassified(&split.x_test, &split.y_test, &pred).unwrap();
    let expected = 1.0 - subset.len() as f64 / split.y_test.len() as f64;
    assert!((report.accuracy - expected).abs() < 1e-12);
}

#[test]
fn test_train_rejects_single_class() {
    let x = array![[1.0], [2.0], [3.0], [4.0]];
    let y = array![1.0, 1.0, 1.0, 1.0];
    for kind in [
        AdapterKind::BaggedTrees,
        AdapterKind::BoostedNative,
        AdapterKind::BoostedLeafwise,
    ] {
        let err = train(&fast(kind), &x, &y).unwrap_err();
        assert!(matches!(err, ClearcutError::Training(_)), "{}", kind);
    }
}

#[test]
fn test_training_is_reproducible() {
    let (x, y) = binary_data(80);
    let split = train_test_split(&x, &y, DEFAULT_TRAIN_RATIO, DEFAULT_SEED).unwrap();
    for kind in [
        AdapterKind::BaggedTrees,
        AdapterKind::BoostedNative,
        AdapterKind::BoostedLeafwise,
    ] {
        let a = train(&fast(kind), &split.x_train, &split.y_train).unwrap();
        let b = train(&fast(kind), &split.x_train, &split.y_train).unwrap();
        assert_eq!(
            a.predict(&split.x_test).unwrap(),
            b.predict(&split.x_test).unwrap(),
            "{} predictions differ across identical fits",
            kind
        );
    }
}
