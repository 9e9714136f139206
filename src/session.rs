//! Interactive analysis session
//!
//! Drives the whole pipeline for one dataset: encode, split, train, score,
//! explain. Training and global explanation are memoized under explicit
//! keys derived from the data fingerprint and the settings that affect each
//! artifact, so toggling an unrelated setting never retrains the model.

use crate::adapter::{self, AdapterConfig, AdapterKind, TrainedClassifier};
use crate::error::{ClearcutError, Result};
use crate::evaluation::{
    classification_report, confusion_matrix, filter_misclassified, full_subset, ClassReport,
    EvaluationSubset,
};
use crate::explainability::{
    GlobalExplanation, LocalExplanation, Methodology, DEFAULT_TOP_K,
};
use crate::preprocessing::{
    encode, train_test_split, DEFAULT_SEED, DEFAULT_TRAIN_RATIO,
};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, info};

/// Settings for one analysis pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub adapter: AdapterConfig,
    pub methodology: Methodology,
    pub top_k: usize,
    pub train_ratio: f64,
    pub seed: u64,
    /// Restrict local explanation to rows the model misclassified
    pub misclassified_only: bool,
}

impl SessionConfig {
    pub fn new(kind: AdapterKind, methodology: Methodology) -> Self {
        Self {
            adapter: AdapterConfig::new(kind),
            methodology,
            top_k: DEFAULT_TOP_K,
            train_ratio: DEFAULT_TRAIN_RATIO,
            seed: DEFAULT_SEED,
            misclassified_only: false,
        }
    }
}

/// Everything one pass produces, ready for rendering
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub kind: AdapterKind,
    pub n_train: usize,
    pub n_test: usize,
    pub predictions: Array1<f64>,
    pub report: ClassReport,
    pub confusion: Array2<usize>,
    pub global: GlobalExplanation,
    /// Rows available for local explanation; the full test set, or only the
    /// misclassified rows when the filter is on
    pub subset: EvaluationSubset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ModelKey {
    data: u64,
    kind: AdapterKind,
    n_estimators: Option<usize>,
    max_depth: Option<usize>,
    min_samples: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GlobalKey {
    model: ModelKey,
    methodology: Methodology,
    top_k: usize,
}

/// Pass state kept for follow-up local explanations
#[derive(Debug, Clone)]
struct PassState {
    subset: EvaluationSubset,
    feature_names: Vec<String>,
    target_labels: Vec<String>,
    methodology: Methodology,
    top_k: usize,
}

/// A stateful analysis session with keyed memoization
#[derive(Default)]
pub struct Session {
    model_cache: Option<(ModelKey, TrainedClassifier)>,
    global_cache: Option<(GlobalKey, GlobalExplanation)>,
    current: Option<PassState>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one full pass over a labeled table.
    ///
    /// Re-running with inputs whose keys match the cached artifacts skips
    /// retraining and re-explanation; any key-relevant change drops the
    /// stale entry and recomputes.
    pub fn run(
        &mut self,
        df: &DataFrame,
        target_column: &str,
        config: &SessionConfig,
    ) -> Result<SessionOutcome> {
        let table = encode(df, target_column)?;
        let split = train_test_split(
            &table.features,
            &table.target,
            config.train_ratio,
            config.seed,
        )?;

        let data_key = fingerprint(&split.x_train, &split.y_train, config.train_ratio, config.seed);
        let model_key = ModelKey {
            data: data_key,
            kind: config.adapter.kind,
            n_estimators: config.adapter.n_estimators,
            max_depth: config.adapter.max_depth,
            min_samples: config.adapter.min_samples,
            seed: config.adapter.seed,
        };

        let model = self.fit_or_reuse(&model_key, config, &split.x_train, &split.y_train)?;
        let predictions = model.predict(&split.x_test)?;
        let n_classes = table.n_classes().max(model.n_classes());
        let report = classification_report(&split.y_test, &predictions, n_classes)?;
        let confusion = confusion_matrix(&split.y_test, &predictions, n_classes)?;

        let global_key = GlobalKey {
            model: model_key.clone(),
            methodology: config.methodology,
            top_k: config.top_k,
        };
        let global = self.explain_or_reuse(&global_key, config, &split, &table.feature_names)?;

        let subset = if config.misclassified_only {
            filter_misclassified(&split.x_test, &split.y_test, &predictions)?
        } else {
            full_subset(&split.x_test, &split.y_test, &predictions)?
        };

        info!(
            kind = %config.adapter.kind,
            accuracy = report.accuracy,
            n_subset = subset.len(),
            "analysis pass complete"
        );

        self.current = Some(PassState {
            subset: subset.clone(),
            feature_names: table.feature_names.clone(),
            target_labels: table.target_labels.clone(),
            methodology: config.methodology,
            top_k: config.top_k,
        });

        Ok(SessionOutcome {
            kind: config.adapter.kind,
            n_train: split.x_train.nrows(),
            n_test: split.x_test.nrows(),
            predictions,
            report,
            confusion,
            global,
            subset,
        })
    }

    /// Explain one row of the most recent pass's subset
    pub fn explain_row(&self, row_index: usize) -> Result<LocalExplanation> {
        let state = self.current.as_ref().ok_or(ClearcutError::ModelNotFitted)?;
        let (_, model) = self
            .model_cache
            .as_ref()
            .ok_or(ClearcutError::ModelNotFitted)?;
        if row_index >= state.subset.len() {
            return Err(ClearcutError::IndexOutOfRange {
                index: row_index,
                len: state.subset.len(),
            });
        }
        state.methodology.strategy().explain_local(
            model,
            &state.subset.x,
            row_index,
            &state.feature_names,
            &state.target_labels,
            state.top_k,
        )
    }

    fn fit_or_reuse(
        &mut self,
        key: &ModelKey,
        config: &SessionConfig,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<TrainedClassifier> {
        if let Some((cached_key, model)) = &self.model_cache {
            if cached_key == key {
                model.ensure_kind(config.adapter.kind)?;
                debug!(kind = %config.adapter.kind, "model cache hit");
                return Ok(model.clone());
            }
        }
        debug!(kind = %config.adapter.kind, "model cache miss, training");
        // Any key change invalidates both the model and the explanation
        // derived from it
        self.global_cache = None;
        let model = adapter::train(&config.adapter, x, y)?;
        self.model_cache = Some((key.clone(), model.clone()));
        Ok(model)
    }

    fn explain_or_reuse(
        &mut self,
        key: &GlobalKey,
        config: &SessionConfig,
        split: &crate::preprocessing::TrainTestSplit,
        feature_names: &[String],
    ) -> Result<GlobalExplanation> {
        if let Some((cached_key, global)) = &self.global_cache {
            if cached_key == key {
                debug!(methodology = %config.methodology, "global explanation cache hit");
                return Ok(global.clone());
            }
        }
        let (_, model) = self
            .model_cache
            .as_ref()
            .ok_or(ClearcutError::ModelNotFitted)?;
        debug!(methodology = %config.methodology, "global explanation cache miss");
        let global = config.methodology.strategy().explain_global(
            model,
            &split.x_train,
            &split.y_train,
            feature_names,
            config.top_k,
        )?;
        self.global_cache = Some((key.clone(), global.clone()));
        Ok(global)
    }
}

/// Order-sensitive fingerprint of the training inputs
fn fingerprint(x: &Array2<f64>, y: &Array1<f64>, train_ratio: f64, seed: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    x.nrows().hash(&mut hasher);
    x.ncols().hash(&mut hasher);
    for value in x.iter() {
        value.to_bits().hash(&mut hasher);
    }
    for value in y.iter() {
        value.to_bits().hash(&mut hasher);
    }
    train_ratio.to_bits().hash(&mut hasher);
    seed.hash(&mut hasher);
    hasher.finish()
}
