//! Configuration builder for forest training.

use ndarray::ArrayView2;

use crate::criterion::Criterion;
use crate::error::TreeError;
use crate::forest::Forest;
use crate::split::SplitMethod;
use crate::target::{Target, Task};

/// Strategy for determining the number of features to consider at each split.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxFeatures {
    /// Square root of total features.
    Sqrt,
    /// Log base 2 of total features.
    Log2,
    /// A fraction of total features (must be in (0.0, 1.0]).
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// All features (no subsampling).
    All,
}

impl MaxFeatures {
    /// Resolve to a concrete count for `n_features` columns.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidMaxFeatures`] when the count falls outside
    /// `[1, n_features]`.
    pub fn resolve(self, n_features: usize) -> Result<usize, TreeError> {
        let resolved = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil().max(1.0) as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        };
        if resolved == 0 || resolved > n_features {
            return Err(TreeError::InvalidMaxFeatures {
                max_features: resolved,
                n_features,
            });
        }
        Ok(resolved)
    }
}

/// Configuration for a bagged or extra-trees forest.
///
/// Construct via [`ForestConfig::random_forest`] or
/// [`ForestConfig::extra_trees`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Random forest   | Extra trees      |
/// |---------------------|-----------------|------------------|
/// | `split_method`      | `Best`          | `Random`         |
/// | `bootstrap`         | `true`          | `false`          |
/// | `criterion`         | `Gini`          | `Gini`           |
/// | `max_features`      | `Sqrt` (classification), `All` (regression) | same |
/// | `max_depth`         | `None`          | `None`           |
/// | `min_samples_split` | 2               | 2                |
/// | `min_samples_leaf`  | 1               | 1                |
/// | `seed`              | 42              | 42               |
/// | `n_jobs`            | `None` (global pool) | same        |
/// | `verbose`           | 0               | 0                |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForestConfig {
    pub(crate) task: Task,
    pub(crate) n_estimators: usize,
    pub(crate) split_method: SplitMethod,
    pub(crate) criterion: Criterion,
    pub(crate) max_features: MaxFeatures,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) bootstrap: bool,
    pub(crate) seed: u64,
    pub(crate) n_jobs: Option<usize>,
    pub(crate) verbose: u8,
}

impl ForestConfig {
    fn new(task: Task, n_estimators: usize, split_method: SplitMethod) -> Result<Self, TreeError> {
        if n_estimators == 0 {
            return Err(TreeError::InvalidEstimatorCount { n_estimators });
        }
        Ok(Self {
            task,
            n_estimators,
            split_method,
            criterion: Criterion::Gini,
            max_features: match task {
                Task::Classification => MaxFeatures::Sqrt,
                Task::Regression => MaxFeatures::All,
            },
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: split_method == SplitMethod::Best,
            seed: 42,
            n_jobs: None,
            verbose: 0,
        })
    }

    /// Bagged CART trees with exhaustive split search.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidEstimatorCount`] if `n_estimators` is zero.
    pub fn random_forest(task: Task, n_estimators: usize) -> Result<Self, TreeError> {
        Self::new(task, n_estimators, SplitMethod::Best)
    }

    /// Extremely randomized trees grown on the full sample.
    ///
    /// With `max_features = Fixed(1)` this is a completely-random forest.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidEstimatorCount`] if `n_estimators` is zero.
    pub fn extra_trees(task: Task, n_estimators: usize) -> Result<Self, TreeError> {
        Self::new(task, n_estimators, SplitMethod::Random)
    }

    // --- Setters ---

    /// Set the classification split criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the max features strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Draw a bootstrap sample per tree instead of using every row.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train on a dedicated pool of `n_jobs` threads. `None` uses the global pool.
    #[must_use]
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Set the progress logging level (0 = silent).
    #[must_use]
    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    // --- Getters ---

    /// Return the learning task.
    #[must_use]
    pub fn task(&self) -> Task {
        self.task
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    /// Return the split-finding strategy.
    #[must_use]
    pub fn split_method(&self) -> SplitMethod {
        self.split_method
    }

    /// Return the max features strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return whether trees are grown on bootstrap samples.
    #[must_use]
    pub fn bootstrap(&self) -> bool {
        self.bootstrap
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the thread count, if pinned.
    #[must_use]
    pub fn n_jobs(&self) -> Option<usize> {
        self.n_jobs
    }

    /// Return the progress logging level.
    #[must_use]
    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    /// Train a forest on the provided dataset.
    ///
    /// # Errors
    ///
    /// | Variant                            | When                                           |
    /// |------------------------------------|------------------------------------------------|
    /// | [`TreeError::TaskMismatch`]        | target kind differs from the configured task   |
    /// | [`TreeError::EmptyDataset`]        | `x` has no rows                                |
    /// | [`TreeError::TargetLengthMismatch`]| `y` and `x` disagree on the sample count       |
    /// | [`TreeError::NonFiniteValue`]      | any value is NaN or infinite                   |
    /// | [`TreeError::InvalidMaxFeatures`]  | resolved max_features is outside [1, n_features] |
    /// | [`TreeError::ThreadPool`]          | the `n_jobs` pool could not be built           |
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: &Target) -> Result<Forest, TreeError> {
        crate::forest::train(self, x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_max_features() {
        assert_eq!(MaxFeatures::Sqrt.resolve(10).unwrap(), 4);
        assert_eq!(MaxFeatures::Log2.resolve(8).unwrap(), 3);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(10).unwrap(), 5);
        assert_eq!(MaxFeatures::All.resolve(7).unwrap(), 7);
        assert!(MaxFeatures::Fixed(0).resolve(7).is_err());
        assert!(MaxFeatures::Fixed(8).resolve(7).is_err());
    }

    #[test]
    fn family_defaults() {
        let rf = ForestConfig::random_forest(Task::Classification, 10).unwrap();
        assert_eq!(rf.split_method(), SplitMethod::Best);
        assert!(rf.bootstrap());
        let et = ForestConfig::extra_trees(Task::Regression, 10).unwrap();
        assert_eq!(et.split_method(), SplitMethod::Random);
        assert!(!et.bootstrap());
        assert_eq!(et.max_features(), MaxFeatures::All);
    }

    #[test]
    fn zero_estimators_rejected() {
        assert!(matches!(
            ForestConfig::random_forest(Task::Classification, 0),
            Err(TreeError::InvalidEstimatorCount { n_estimators: 0 })
        ));
    }
}
