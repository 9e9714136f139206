//! Error types for the clearcut library

use thiserror::Error;

/// Result type alias for clearcut operations
pub type Result<T> = std::result::Result<T, ClearcutError>;

/// Main error type for the clearcut library
#[derive(Error, Debug)]
pub enum ClearcutError {
    #[error("Data error: {0}")]
    Data(String),

    #[error("Column not found: {0}")]
    FeatureNotFound(String),

    #[error("Insufficient data: need at least {needed} rows, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Row index {index} out of range for {len} rows")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Adapter mismatch: model was trained by {actual}, not {expected}")]
    AdapterMismatch { expected: String, actual: String },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,
}

impl From<polars::error::PolarsError> for ClearcutError {
    fn from(err: polars::error::PolarsError) -> Self {
        ClearcutError::Data(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ClearcutError {
    fn from(err: ndarray::ShapeError) -> Self {
        ClearcutError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
