//! Table encoding: raw labeled DataFrame to numeric matrix plus coded target

use crate::error::{ClearcutError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Encoded dataset: numeric feature matrix, coded target and the name/label
/// bookkeeping needed to display results in the caller's vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedTable {
    /// Row-major feature matrix after one-hot expansion, missing values as 0.0
    pub features: Array2<f64>,
    /// Integral class codes, one per row, indexing into `target_labels`
    pub target: Array1<f64>,
    /// Column names of `features`, in matrix order
    pub feature_names: Vec<String>,
    /// Original label strings in first-occurrence order; index = class code
    pub target_labels: Vec<String>,
}

impl EncodedTable {
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn n_classes(&self) -> usize {
        self.target_labels.len()
    }
}

/// Encode a labeled table into a numeric feature matrix and coded target.
///
/// Non-target columns are kept as-is when numeric (nulls become 0.0) and
/// one-hot expanded otherwise, with dummy categories in first-occurrence
/// order. Encoding is best-effort: unconvertible values become their own
/// dummy category rather than an error.
///
/// The target column is stringified and integer-factorized in
/// first-occurrence order; that order defines the code-to-label mapping used
/// by every downstream prediction and explanation.
pub fn encode(df: &DataFrame, target_column: &str) -> Result<EncodedTable> {
    if !df
        .get_column_names()
        .iter()
        .any(|name| name.as_str() == target_column)
    {
        return Err(ClearcutError::FeatureNotFound(target_column.to_string()));
    }

    let n_rows = df.height();
    let mut feature_names: Vec<String> = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for name in df.get_column_names() {
        if name.as_str() == target_column {
            continue;
        }
        let column = df
            .column(name.as_str())
            .map_err(|_| ClearcutError::FeatureNotFound(name.to_string()))?;

        if is_numeric_dtype(column.dtype()) {
            let cast = column
                .cast(&DataType::Float64)
                .map_err(|e| ClearcutError::Data(e.to_string()))?;
            let values: Vec<f64> = cast
                .as_materialized_series()
                .f64()
                .map_err(|e| ClearcutError::Data(e.to_string()))?
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect();
            feature_names.push(name.to_string());
            columns.push(values);
        } else {
            // One-hot expansion in first-occurrence category order
            let raw = string_values(column)?;
            let mut seen: HashMap<String, usize> = HashMap::new();
            let mut categories: Vec<String> = Vec::new();
            for value in raw.iter().flatten() {
                if !seen.contains_key(value) {
                    seen.insert(value.clone(), categories.len());
                    categories.push(value.clone());
                }
            }
            let mut dummies: Vec<Vec<f64>> = vec![vec![0.0; n_rows]; categories.len()];
            for (row, value) in raw.iter().enumerate() {
                if let Some(value) = value {
                    dummies[seen[value]][row] = 1.0;
                }
            }
            for (category, dummy) in categories.into_iter().zip(dummies) {
                feature_names.push(format!("{}_{}", name, category));
                columns.push(dummy);
            }
        }
    }

    // Factorize the target by first appearance, not lexical order
    let target_col = df
        .column(target_column)
        .map_err(|_| ClearcutError::FeatureNotFound(target_column.to_string()))?;
    let raw_target = string_values(target_col)?;

    let mut label_codes: HashMap<String, usize> = HashMap::new();
    let mut target_labels: Vec<String> = Vec::new();
    let mut target: Vec<f64> = Vec::with_capacity(n_rows);
    for value in raw_target {
        let value = value.unwrap_or_default();
        let code = *label_codes.entry(value.clone()).or_insert_with(|| {
            target_labels.push(value.clone());
            target_labels.len() - 1
        });
        target.push(code as f64);
    }

    let col_refs: Vec<&[f64]> = columns.iter().map(|c| c.as_slice()).collect();
    let features = Array2::from_shape_fn((n_rows, col_refs.len()), |(r, c)| col_refs[c][r]);

    Ok(EncodedTable {
        features,
        target: Array1::from_vec(target),
        feature_names,
        target_labels,
    })
}

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
            | DataType::Boolean
    )
}

fn string_values(column: &Column) -> Result<Vec<Option<String>>> {
    let cast = column
        .cast(&DataType::String)
        .map_err(|e| ClearcutError::Data(e.to_string()))?;
    let series = cast.as_materialized_series();
    let ca = series.str().map_err(|e| ClearcutError::Data(e.to_string()))?;
    Ok(ca.into_iter().map(|v| v.map(|s| s.to_string())).collect())
}
