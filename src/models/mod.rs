//! Bleaching-risk regressor: regression trees combined by gradient boosting.

pub mod boost;
pub mod tree;

pub use boost::*;
pub use tree::{RegressionTree, TreeNode, TreeParams};
