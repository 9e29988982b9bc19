//! Tree-based estimators: CART trees, bagged and extra-trees forests, and
//! gradient boosting.
//!
//! Every model trains on a dense row-major `ndarray` matrix and a
//! [`Target`], and predicts a `(n_rows, n_outputs)` matrix: class
//! probabilities for classification, a single value column for regression.
//! Forest training and prediction run on rayon; `n_jobs` pins a dedicated
//! pool.

mod boosting;
mod config;
mod criterion;
mod error;
mod forest;
mod node;
mod pool;
mod split;
mod target;
mod tree;

pub use boosting::{BoostingConfig, GradientBoosting};
pub use config::{ForestConfig, MaxFeatures};
pub use criterion::Criterion;
pub use error::TreeError;
pub use forest::Forest;
pub use node::Node;
pub use split::SplitMethod;
pub use target::{Target, Task};
pub use tree::{DecisionTree, TreeConfig, validate_training};
