//! Supervised classification and accuracy assessment
//!
//! - **Random forest**: bagged CART trees with Gini splits
//! - **Confusion matrix**: overall accuracy, kappa, per-class accuracies

mod confusion;
mod forest;
mod tree;

pub use confusion::ConfusionMatrix;
pub use forest::{classify_image, classify_table, RandomForest, RandomForestParams};
pub use tree::DecisionTree;
