//! Clearcut - Tree-ensemble classification with built-in explanations
//!
//! Train a classifier on a labeled table, evaluate it on a held-out split,
//! and explain what it learned, globally and one prediction at a time.
//!
//! # Modules
//!
//! ## Pipeline
//! - [`preprocessing`] - One-hot encoding, target factorization, seeded splits
//! - [`adapter`] - One training entry point over three classifier families
//! - [`evaluation`] - Classification metrics and misclassification filtering
//!
//! ## Classifiers
//! - [`training`] - Bagged trees and two gradient-boosted families behind a
//!   shared flattened-tree view
//!
//! ## Explanations
//! - [`explainability`] - Permutation importance, decision-path weights, and
//!   exact additive contributions behind one strategy trait
//!
//! ## Orchestration
//! - [`session`] - Full analysis passes with keyed memoization
//!
//! # Example
//!
//! ```no_run
//! use clearcut::adapter::AdapterKind;
//! use clearcut::explainability::Methodology;
//! use clearcut::session::{Session, SessionConfig};
//! use polars::prelude::*;
//!
//! # fn main() -> clearcut::error::Result<()> {
//! let df = df!(
//!     "age" => &[30.0, 42.0, 55.0, 61.0],
//!     "smoker" => &["no", "yes", "no", "yes"],
//!     "outcome" => &["healthy", "sick", "healthy", "sick"]
//! )?;
//!
//! let mut session = Session::new();
//! let config = SessionConfig::new(AdapterKind::BaggedTrees, Methodology::Permutation);
//! let outcome = session.run(&df, "outcome", &config)?;
//! println!("accuracy: {:.2}", outcome.report.accuracy);
//! for entry in &outcome.global.entries {
//!     println!("{}: {}", entry.feature, entry.score);
//! }
//! let local = session.explain_row(0)?;
//! println!("row 0 predicted {:?}", local.predicted_label);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod error;
pub mod evaluation;
pub mod explainability;
pub mod preprocessing;
pub mod session;
pub mod training;

pub use adapter::{train, AdapterConfig, AdapterKind, TrainedClassifier};
pub use error::{ClearcutError, Result};
pub use evaluation::{filter_misclassified, ClassReport, EvaluationSubset};
pub use explainability::{
    ExplainStrategy, GlobalExplanation, LocalExplanation, Methodology,
};
pub use preprocessing::{encode, train_test_split, EncodedTable, TrainTestSplit};
pub use session::{Session, SessionConfig, SessionOutcome};
