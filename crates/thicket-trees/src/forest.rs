//! Forest training with parallel tree construction, and prediction.

use ndarray::{Array1, Array2, ArrayView2, Zip};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::config::ForestConfig;
use crate::error::TreeError;
use crate::pool::with_jobs;
use crate::split::SplitMethod;
use crate::target::{Target, Task};
use crate::tree::{DecisionTree, TreeConfig, grow, validate_training};

/// A fitted forest of decision trees.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Forest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) task: Task,
    pub(crate) split_method: SplitMethod,
    pub(crate) n_features: usize,
    pub(crate) n_outputs: usize,
    pub(crate) n_jobs: Option<usize>,
    pub(crate) verbose: u8,
}

#[instrument(skip_all, fields(n_estimators = config.n_estimators, n_samples = x.nrows()))]
pub(crate) fn train(
    config: &ForestConfig,
    x: ArrayView2<'_, f64>,
    y: &Target,
) -> Result<Forest, TreeError> {
    if y.task() != config.task {
        return Err(TreeError::TaskMismatch {
            expected: config.task,
            got: y.task(),
        });
    }
    validate_training(x, y)?;
    let n_samples = x.nrows();
    let n_features = x.ncols();
    let max_features = config.max_features.resolve(n_features)?;

    let tree_config = TreeConfig::new()
        .with_criterion(config.criterion)
        .with_split_method(config.split_method)
        .with_max_depth(config.max_depth)
        .with_min_samples_split(config.min_samples_split)
        .with_min_samples_leaf(config.min_samples_leaf);
    tree_config.validate_limits()?;

    if config.verbose > 0 {
        info!(
            n_estimators = config.n_estimators,
            n_samples,
            n_features,
            n_outputs = y.n_outputs(),
            max_features,
            split_method = ?config.split_method,
            "training forest"
        );
    }

    // Per-tree seeds from one master stream keep results independent of scheduling.
    let mut master = ChaCha8Rng::seed_from_u64(config.seed);
    let seeds: Vec<u64> = (0..config.n_estimators).map(|_| master.r#gen()).collect();
    let bootstrap = config.bootstrap;
    let verbose = config.verbose;

    let trees: Vec<DecisionTree> = with_jobs(config.n_jobs, || {
        seeds
            .into_par_iter()
            .enumerate()
            .map(|(t, seed)| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let indices: Vec<usize> = if bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let tree = grow(&tree_config, x, y, indices, max_features, &mut rng);
                if verbose > 1 {
                    debug!(tree = t, n_nodes = tree.n_nodes(), depth = tree.depth(), "tree built");
                }
                tree
            })
            .collect()
    })?;

    if verbose > 0 {
        info!(n_trees = trees.len(), "forest training complete");
    }

    Ok(Forest {
        trees,
        task: config.task,
        split_method: config.split_method,
        n_features,
        n_outputs: y.n_outputs(),
        n_jobs: config.n_jobs,
        verbose: config.verbose,
    })
}

impl Forest {
    /// Average the leaf values of every tree for each row of `x`.
    ///
    /// Returns `(n_rows, n_classes)` class probabilities for classification
    /// and `(n_rows, 1)` predicted values for regression.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] when `x` has the wrong
    /// number of columns, or [`TreeError::ThreadPool`] when the `n_jobs` pool
    /// cannot be built.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, TreeError> {
        if x.ncols() != self.n_features {
            return Err(TreeError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: x.ncols(),
            });
        }
        if self.verbose > 0 {
            info!(n_rows = x.nrows(), n_trees = self.trees.len(), "forest predict");
        }
        let n_trees = self.trees.len() as f64;
        let mut out = Array2::<f64>::zeros((x.nrows(), self.n_outputs));
        with_jobs(self.n_jobs, || {
            Zip::from(out.rows_mut())
                .and(x.rows())
                .par_for_each(|mut out_row, row| {
                    for tree in &self.trees {
                        for (o, v) in out_row.iter_mut().zip(tree.leaf_value(row)) {
                            *o += v;
                        }
                    }
                    out_row.mapv_inplace(|v| v / n_trees);
                });
        })?;
        Ok(out)
    }

    /// Predicted class index (as `f64`) or regression value for each row.
    ///
    /// # Errors
    ///
    /// Same as [`Forest::predict_proba`].
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, TreeError> {
        let proba = self.predict_proba(x)?;
        Ok(match self.task {
            Task::Regression => proba.column(0).to_owned(),
            Task::Classification => proba
                .outer_iter()
                .map(|row| argmax(row.iter().copied()) as f64)
                .collect(),
        })
    }

    /// Return the learning task.
    #[must_use]
    pub fn task(&self) -> Task {
        self.task
    }

    /// Return the split strategy the trees were grown with.
    #[must_use]
    pub fn split_method(&self) -> SplitMethod {
        self.split_method
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    /// Return the number of features the forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the prediction width: class count, or 1 for regression.
    #[must_use]
    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// Return the fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Return the progress logging level.
    #[must_use]
    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    /// Set the progress logging level used by later predictions.
    pub fn set_verbose(&mut self, verbose: u8) {
        self.verbose = verbose;
    }
}

/// Index of the largest value; first index wins ties.
pub(crate) fn argmax(values: impl Iterator<Item = f64>) -> usize {
    values
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}
