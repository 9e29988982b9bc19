//! Gradient-boosted regression trees.
//!
//! Regression minimises squared error: every stage fits one tree to the
//! residuals. Classification minimises multinomial log-loss: every stage
//! fits one tree per class to `1{y = k} - softmax(F)_k`.

use ndarray::{Array2, ArrayView2, Axis};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::config::MaxFeatures;
use crate::criterion::Criterion;
use crate::error::TreeError;
use crate::forest::argmax;
use crate::pool::with_jobs;
use crate::target::{Target, Task};
use crate::tree::{DecisionTree, TreeConfig, grow, validate_training};

/// Smallest class prior used for the initial log-odds.
const MIN_PRIOR: f64 = 1e-12;

/// Configuration for gradient boosting.
///
/// # Defaults
///
/// | Parameter           | Default |
/// |---------------------|---------|
/// | `learning_rate`     | 0.1     |
/// | `max_depth`         | 3       |
/// | `min_samples_split` | 2       |
/// | `min_samples_leaf`  | 1       |
/// | `subsample`         | 1.0     |
/// | `max_features`      | `All`   |
/// | `seed`              | 42      |
/// | `verbose`           | 0       |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoostingConfig {
    task: Task,
    n_estimators: usize,
    learning_rate: f64,
    max_depth: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    subsample: f64,
    max_features: MaxFeatures,
    seed: u64,
    n_jobs: Option<usize>,
    verbose: u8,
}

impl BoostingConfig {
    /// Create a config with `n_estimators` boosting stages.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidEstimatorCount`] if `n_estimators` is zero.
    pub fn new(task: Task, n_estimators: usize) -> Result<Self, TreeError> {
        if n_estimators == 0 {
            return Err(TreeError::InvalidEstimatorCount { n_estimators });
        }
        Ok(Self {
            task,
            n_estimators,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            max_features: MaxFeatures::All,
            seed: 42,
            n_jobs: None,
            verbose: 0,
        })
    }

    /// Set the shrinkage applied to every tree.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the depth of each tree.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
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

    /// Set the fraction of rows drawn (without replacement) per stage.
    #[must_use]
    pub fn with_subsample(mut self, subsample: f64) -> Self {
        self.subsample = subsample;
        self
    }

    /// Set the max features strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit per-class trees on a dedicated pool of `n_jobs` threads.
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

    /// Return the learning task.
    #[must_use]
    pub fn task(&self) -> Task {
        self.task
    }

    /// Return the number of boosting stages.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    /// Return the learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Return the progress logging level.
    #[must_use]
    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    /// Fit the boosted ensemble.
    ///
    /// # Errors
    ///
    /// | Variant                           | When                                     |
    /// |-----------------------------------|------------------------------------------|
    /// | [`TreeError::TaskMismatch`]       | target kind differs from the task        |
    /// | [`TreeError::InvalidLearningRate`]| `learning_rate` is not positive/finite   |
    /// | [`TreeError::InvalidSubsample`]   | `subsample` is outside (0.0, 1.0]        |
    /// | [`TreeError::InvalidMaxDepth`]    | `max_depth` is zero                      |
    /// | input validation errors           | see [`validate_training`]                |
    #[instrument(skip_all, fields(n_estimators = self.n_estimators, n_samples = x.nrows()))]
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: &Target) -> Result<GradientBoosting, TreeError> {
        if y.task() != self.task {
            return Err(TreeError::TaskMismatch {
                expected: self.task,
                got: y.task(),
            });
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(TreeError::InvalidLearningRate {
                learning_rate: self.learning_rate,
            });
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(TreeError::InvalidSubsample {
                subsample: self.subsample,
            });
        }
        validate_training(x, y)?;
        let tree_config = TreeConfig::new()
            .with_criterion(Criterion::SquaredError)
            .with_max_depth(Some(self.max_depth))
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf);
        tree_config.validate_limits()?;
        let max_features = self.max_features.resolve(x.ncols())?;

        let n_samples = x.nrows();
        let n_outputs = y.n_outputs();
        let init = initial_scores(y);
        let mut scores = Array2::from_shape_fn((n_samples, n_outputs), |(_, k)| init[k]);
        let draw = ((n_samples as f64) * self.subsample).ceil() as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut stages: Vec<Vec<DecisionTree>> = Vec::with_capacity(self.n_estimators);

        if self.verbose > 0 {
            info!(n_samples, n_outputs, draw, task = %self.task, "training gradient boosting");
        }

        for stage in 0..self.n_estimators {
            let residuals = residuals(y, &scores);
            let rows: Vec<usize> = if draw < n_samples {
                let mut rows = sample(&mut rng, n_samples, draw).into_vec();
                rows.sort_unstable();
                rows
            } else {
                (0..n_samples).collect()
            };
            let seeds: Vec<u64> = (0..n_outputs).map(|_| rng.r#gen()).collect();

            let trees: Vec<DecisionTree> = with_jobs(self.n_jobs, || {
                seeds
                    .into_par_iter()
                    .enumerate()
                    .map(|(k, seed)| {
                        let target = Target::Values(residuals.column(k).to_vec());
                        let mut tree_rng = ChaCha8Rng::seed_from_u64(seed);
                        grow(&tree_config, x, &target, rows.clone(), max_features, &mut tree_rng)
                    })
                    .collect()
            })?;

            for (mut score_row, row) in scores.outer_iter_mut().zip(x.outer_iter()) {
                for (k, tree) in trees.iter().enumerate() {
                    score_row[k] += self.learning_rate * tree.leaf_value(row)[0];
                }
            }
            if self.verbose > 1 {
                debug!(stage, "boosting stage complete");
            }
            stages.push(trees);
        }

        Ok(GradientBoosting {
            task: self.task,
            init,
            stages,
            learning_rate: self.learning_rate,
            n_features: x.ncols(),
            verbose: self.verbose,
        })
    }
}

/// Initial raw scores: the mean for regression, log class priors otherwise.
fn initial_scores(y: &Target) -> Vec<f64> {
    match y {
        Target::Values(values) => vec![values.iter().sum::<f64>() / values.len().max(1) as f64],
        Target::Classes { labels, n_classes } => {
            let mut counts = vec![0usize; *n_classes];
            for &l in labels {
                counts[l] += 1;
            }
            let n = labels.len().max(1) as f64;
            counts
                .iter()
                .map(|&c| (c as f64 / n).max(MIN_PRIOR).ln())
                .collect()
        }
    }
}

/// Negative gradient of the loss at the current scores.
fn residuals(y: &Target, scores: &Array2<f64>) -> Array2<f64> {
    match y {
        Target::Values(values) => {
            let mut r = scores.mapv(|s| -s);
            for (mut row, v) in r.outer_iter_mut().zip(values) {
                row[0] += v;
            }
            r
        }
        Target::Classes { labels, .. } => {
            let mut r = softmax(scores);
            r.mapv_inplace(|p| -p);
            for (mut row, &l) in r.outer_iter_mut().zip(labels) {
                row[l] += 1.0;
            }
            r
        }
    }
}

/// Row-wise softmax with max subtraction.
fn softmax(scores: &Array2<f64>) -> Array2<f64> {
    let mut p = scores.clone();
    for mut row in p.axis_iter_mut(Axis(0)) {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let total = row.sum();
        row.mapv_inplace(|v| v / total);
    }
    p
}

/// A fitted gradient-boosted ensemble.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GradientBoosting {
    task: Task,
    init: Vec<f64>,
    stages: Vec<Vec<DecisionTree>>,
    learning_rate: f64,
    n_features: usize,
    verbose: u8,
}

impl GradientBoosting {
    /// Raw additive scores for each row.
    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, TreeError> {
        if x.ncols() != self.n_features {
            return Err(TreeError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: x.ncols(),
            });
        }
        let mut scores = Array2::from_shape_fn((x.nrows(), self.init.len()), |(_, k)| self.init[k]);
        for (mut score_row, row) in scores.outer_iter_mut().zip(x.outer_iter()) {
            for trees in &self.stages {
                for (k, tree) in trees.iter().enumerate() {
                    score_row[k] += self.learning_rate * tree.leaf_value(row)[0];
                }
            }
        }
        Ok(scores)
    }

    /// Class probabilities `(n_rows, n_classes)`, or `(n_rows, 1)` values for
    /// regression.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] when `x` has the wrong
    /// number of columns.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, TreeError> {
        if self.verbose > 0 {
            info!(n_rows = x.nrows(), n_stages = self.stages.len(), "boosting predict");
        }
        let scores = self.decision_function(x)?;
        Ok(match self.task {
            Task::Regression => scores,
            Task::Classification => softmax(&scores),
        })
    }

    /// Predicted class index (as `f64`) or regression value for each row.
    ///
    /// # Errors
    ///
    /// Same as [`GradientBoosting::predict_proba`].
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<ndarray::Array1<f64>, TreeError> {
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

    /// Return the number of boosting stages.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.stages.len()
    }

    /// Return the prediction width.
    #[must_use]
    pub fn n_outputs(&self) -> usize {
        self.init.len()
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
