//! Classifier training module
//!
//! Three tree-ensemble families with a shared flattened-tree view:
//! - [`bagged_trees`]: bootstrap-aggregated decision trees
//! - [`boosted_native`]: depth-wise gradient boosting over a packed matrix
//! - [`boosted_leafwise`]: best-first gradient boosting with a leaf budget

pub mod bagged_trees;
pub mod boosted_leafwise;
pub mod boosted_native;
pub mod decision_tree;
pub mod forest_view;

pub use bagged_trees::{BaggedTreesClassifier, BaggedTreesConfig};
pub use boosted_leafwise::{BoostedLeafwiseClassifier, BoostedLeafwiseConfig, LeafwiseObjective};
pub use boosted_native::{BoostedNativeClassifier, BoostedNativeConfig, NativeMatrix};
pub use decision_tree::{DecisionTreeClassifier, DecisionTreeConfig};
pub use forest_view::{TreeEnsemble, TreeView, ViewNode};
