//! Explanation methodology tests across all classifier families

use approx::assert_abs_diff_eq;
use clearcut::adapter::{train, AdapterConfig, AdapterKind, TrainedClassifier};
use clearcut::error::ClearcutError;
use clearcut::explainability::tree_shap::class_contributions;
use clearcut::explainability::{Methodology, DEFAULT_TOP_K};
use clearcut::session::{Session, SessionConfig};
use clearcut::training::NativeMatrix;
use ndarray::{Array1, Array2};
use polars::prelude::*;

fn wide_data(n: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    // Only the first two columns carry signal; the rest is patterned noise
    let x = Array2::from_shape_fn((n, n_features), |(r, c)| {
        let class = (r >= n / 2) as usize as f64;
        match c {
            0 => class * 5.0 + (r % 4) as f64 * 0.3,
            1 => class,
            _ => ((r * 31 + c * 17) % 13) as f64,
        }
    });
    let y = Array1::from_shape_fn(n, |r| (r >= n / 2) as usize as f64);
    (x, y)
}

fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("col_{}", i)).collect()
}

fn labels() -> Vec<String> {
    vec!["no".to_string(), "yes".to_string()]
}

fn fast(kind: AdapterKind) -> AdapterConfig {
    AdapterConfig {
        n_estimators: Some(20),
        min_samples: Some(1),
        ..AdapterConfig::new(kind)
    }
}

fn all_kinds() -> [AdapterKind; 3] {
    [
        AdapterKind::BaggedTrees,
        AdapterKind::BoostedNative,
        AdapterKind::BoostedLeafwise,
    ]
}

#[test]
fn test_global_truncates_to_top_k() {
    let (x, y) = wide_data(60, 20);
    let feature_names = names(20);
    for kind in all_kinds() {
        let model = train(&fast(kind), &x, &y).unwrap();
        for methodology in [Methodology::Permutation, Methodology::AdditiveContribution] {
            let global = methodology
                .strategy()
                .explain_global(&model, &x, &y, &feature_names, DEFAULT_TOP_K)
                .unwrap();
            assert_eq!(global.entries.len(), 5, "{} {}", kind, methodology);
            for pair in global.entries.windows(2) {
                assert!(pair[0].score.abs() >= pair[1].score.abs());
            }
        }
    }
}

#[test]
fn test_global_ranks_signal_features_first() {
    let (x, y) = wide_data(60, 8);
    let feature_names = names(8);
    for kind in all_kinds() {
        let model = train(&fast(kind), &x, &y).unwrap();
        let global = Methodology::AdditiveContribution
            .strategy()
            .explain_global(&model, &x, &y, &feature_names, DEFAULT_TOP_K)
            .unwrap();
        // The separating columns must land in the top entries
        let top: Vec<&str> = global
            .entries
            .iter()
            .take(2)
            .map(|e| e.feature.as_str())
            .collect();
        assert!(
            top.contains(&"col_0") || top.contains(&"col_1"),
            "{} ranked {:?} on top",
            kind,
            top
        );
    }
}

#[test]
fn test_global_scores_are_display_rounded() {
    let (x, y) = wide_data(60, 6);
    let model = train(&fast(AdapterKind::BaggedTrees), &x, &y).unwrap();
    let global = Methodology::Permutation
        .strategy()
        .explain_global(&model, &x, &y, &names(6), DEFAULT_TOP_K)
        .unwrap();
    for entry in &global.entries {
        let rounded = (entry.score * 100.0).round() / 100.0;
        assert_eq!(entry.score, rounded);
    }
}

#[test]
fn test_local_explanations_are_reproducible() {
    let (x, y) = wide_data(60, 6);
    let feature_names = names(6);
    for kind in all_kinds() {
        let model = train(&fast(kind), &x, &y).unwrap();
        for methodology in [Methodology::Permutation, Methodology::AdditiveContribution] {
            let strategy = methodology.strategy();
            let a = strategy
                .explain_local(&model, &x, 3, &feature_names, &labels(), DEFAULT_TOP_K)
                .unwrap();
            let b = strategy
                .explain_local(&model, &x, 3, &feature_names, &labels(), DEFAULT_TOP_K)
                .unwrap();
            assert_eq!(a.contributions, b.contributions, "{} {}", kind, methodology);
            assert_eq!(a.base_value, b.base_value);
        }
    }
}

#[test]
fn test_local_row_out_of_range() {
    let (x, y) = wide_data(40, 4);
    let model = train(&fast(AdapterKind::BaggedTrees), &x, &y).unwrap();
    let err = Methodology::Permutation
        .strategy()
        .explain_local(&model, &x, 400, &names(4), &labels(), DEFAULT_TOP_K)
        .unwrap_err();
    assert!(matches!(err, ClearcutError::IndexOutOfRange { .. }));
}

#[test]
fn test_native_family_omits_label() {
    let (x, y) = wide_data(40, 4);
    let model = train(&fast(AdapterKind::BoostedNative), &x, &y).unwrap();
    let local = Methodology::AdditiveContribution
        .strategy()
        .explain_local(&model, &x, 0, &names(4), &labels(), DEFAULT_TOP_K)
        .unwrap();
    assert!(local.predicted_label.is_none());

    let model = train(&fast(AdapterKind::BoostedLeafwise), &x, &y).unwrap();
    let local = Methodology::AdditiveContribution
        .strategy()
        .explain_local(&model, &x, 0, &names(4), &labels(), DEFAULT_TOP_K)
        .unwrap();
    assert_eq!(local.predicted_label.as_deref(), Some("no"));
}

#[test]
fn test_additive_contributions_reconstruct_bagged_probability() {
    let (x, y) = wide_data(40, 4);
    let config = fast(AdapterKind::BaggedTrees);
    let model = train(&config, &x, &y).unwrap();
    let bagged = match &model {
        TrainedClassifier::BaggedTrees(inner) => inner,
        _ => unreachable!(),
    };
    let proba = bagged.predict_proba(&x).unwrap();
    let (base, phi) = class_contributions(model.as_tree_ensemble(), 1, &x).unwrap();
    for row in 0..x.nrows() {
        let reconstructed: f64 = base + phi.row(row).sum();
        assert_abs_diff_eq!(reconstructed, proba[[row, 1]], epsilon = 1e-9);
    }
}

#[test]
fn test_additive_contributions_reconstruct_native_margin() {
    let (x, y) = wide_data(40, 4);
    let model = train(&fast(AdapterKind::BoostedNative), &x, &y).unwrap();
    let native = match &model {
        TrainedClassifier::BoostedNative(inner) => inner,
        _ => unreachable!(),
    };
    let dtest = NativeMatrix::from_array(&x);
    let margins = native.predict_margin(&dtest).unwrap();
    for class in 0..2 {
        let (base, phi) = class_contributions(model.as_tree_ensemble(), class, &x).unwrap();
        for row in 0..x.nrows() {
            let reconstructed: f64 = base + phi.row(row).sum();
            assert_abs_diff_eq!(reconstructed, margins[[row, class]], epsilon = 1e-9);
        }
    }
}

#[test]
fn test_explanation_records_serialize() {
    let (x, y) = wide_data(40, 4);
    let model = train(&fast(AdapterKind::BaggedTrees), &x, &y).unwrap();
    let global = Methodology::Permutation
        .strategy()
        .explain_global(&model, &x, &y, &names(4), DEFAULT_TOP_K)
        .unwrap();
    let json = serde_json::to_string(&global).unwrap();
    assert!(json.contains("col_0"));
    let local = Methodology::AdditiveContribution
        .strategy()
        .explain_local(&model, &x, 0, &names(4), &labels(), DEFAULT_TOP_K)
        .unwrap();
    let json = serde_json::to_string(&local).unwrap();
    assert!(json.contains("base_value"));
}

#[test]
fn test_session_switches_methodology_without_retraining() {
    let n = 60;
    let x1: Vec<f64> = (0..n).map(|i| if i < n / 2 { 1.0 } else { 7.0 }).collect();
    let x2: Vec<f64> = (0..n).map(|i| (i % 5) as f64).collect();
    let label: Vec<&str> = (0..n).map(|i| if i < n / 2 { "low" } else { "high" }).collect();
    let df = df!("x1" => x1, "x2" => x2, "label" => label).unwrap();

    let mut session = Session::new();
    let mut config = SessionConfig::new(AdapterKind::BaggedTrees, Methodology::Permutation);
    config.adapter.n_estimators = Some(15);

    let a = session.run(&df, "label", &config).unwrap();
    assert_eq!(a.global.methodology, Methodology::Permutation);

    config.methodology = Methodology::AdditiveContribution;
    let b = session.run(&df, "label", &config).unwrap();
    assert_eq!(b.global.methodology, Methodology::AdditiveContribution);
    // Same model, same split, same predictions
    assert_eq!(a.predictions, b.predictions);

    let local = session.explain_row(1).unwrap();
    assert_eq!(local.methodology, Methodology::AdditiveContribution);
    assert!(local.contributions.len() <= DEFAULT_TOP_K);
}
