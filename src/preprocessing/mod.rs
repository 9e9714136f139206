//! Data preprocessing module
//!
//! Turns a raw labeled table into the numeric form the classifiers and
//! explainers consume:
//! - One-hot encoding of categorical columns, zero-imputed missing values
//! - Target factorization in first-occurrence order with label bookkeeping
//! - Seeded, reproducible train/test splitting

mod encoder;
mod split;

pub use encoder::{encode, EncodedTable};
pub use split::{train_test_split, TrainTestSplit, DEFAULT_SEED, DEFAULT_TRAIN_RATIO};
