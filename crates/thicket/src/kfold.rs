//! K-fold wrapping: one [`Estimator`] per fold, producing out-of-fold
//! predictions for the training rows.

use std::path::Path;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use thicket_trees::{Target, Task, TreeError, validate_training};
use tracing::{debug, instrument};

use crate::cache::CachePolicy;
use crate::descriptor::EstimatorDescriptor;
use crate::error::ThicketError;
use crate::estimator::Estimator;
use crate::model::Backend;
use crate::params::Params;

/// Hyperparameter that receives a distinct seed per fold.
const SEED_PARAM: &str = "random_state";

/// Out-of-fold predictions for training rows plus fold-averaged predictions
/// for each evaluation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldPredictions {
    /// `(n_train_rows, n_outputs)`; row `i` comes from the fold that held `i` out.
    pub out_of_fold: Array2<f64>,
    /// One matrix per evaluation input, averaged over all folds.
    pub evals: Vec<Array2<f64>>,
}

/// An estimator trained `n_folds` times on complementary row subsets.
///
/// Fold `k` is named `<name>/fold-<k>` and seeded with the base
/// `random_state` plus `k`. With `n_folds == 1` the single estimator is
/// trained on every row and its in-sample predictions stand in for the
/// out-of-fold matrix.
#[derive(Debug)]
pub struct KFoldEstimator {
    name: String,
    n_folds: usize,
    seed: u64,
    folds: Vec<Estimator>,
}

impl KFoldEstimator {
    /// K-fold wrapper over a built-in estimator kind.
    ///
    /// # Errors
    ///
    /// Returns [`ThicketError::InvalidFoldCount`] if `n_folds` is zero.
    pub fn new(
        descriptor: &EstimatorDescriptor,
        n_folds: usize,
        seed: u64,
        cache_policy: CachePolicy,
    ) -> Result<Self, ThicketError> {
        Self::with_backend(
            descriptor.name.clone(),
            descriptor.kind.backend(),
            &descriptor.params,
            n_folds,
            seed,
            cache_policy,
        )
    }

    /// K-fold wrapper over an arbitrary backend.
    ///
    /// # Errors
    ///
    /// Returns [`ThicketError::InvalidFoldCount`] if `n_folds` is zero.
    pub fn with_backend(
        name: impl Into<String>,
        backend: Arc<dyn Backend>,
        params: &Params,
        n_folds: usize,
        seed: u64,
        cache_policy: CachePolicy,
    ) -> Result<Self, ThicketError> {
        if n_folds == 0 {
            return Err(ThicketError::InvalidFoldCount { n_folds });
        }
        let name = name.into();
        let base_seed = params
            .get(SEED_PARAM)
            .and_then(Value::as_u64)
            .unwrap_or(seed);
        let folds = (0..n_folds)
            .map(|k| {
                let fold_params = params
                    .clone()
                    .with(SEED_PARAM, base_seed.wrapping_add(k as u64));
                Estimator::with_backend(format!("{name}/fold-{k}"), Arc::clone(&backend), fold_params)
                    .with_cache_policy(cache_policy)
            })
            .collect();
        Ok(Self {
            name,
            n_folds,
            seed,
            folds,
        })
    }

    /// Return the base name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the number of folds.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Return the task of the wrapped estimators.
    #[must_use]
    pub fn task(&self) -> Task {
        self.folds.first().map_or(Task::Classification, Estimator::task)
    }

    /// Return the per-fold estimators.
    #[must_use]
    pub fn folds(&self) -> &[Estimator] {
        &self.folds
    }

    /// Fit every fold and predict held-out rows and `evals`.
    ///
    /// # Errors
    ///
    /// | Variant                              | When                                  |
    /// |--------------------------------------|---------------------------------------|
    /// | [`ThicketError::TargetLengthMismatch`] | `y` and `x` disagree on row count   |
    /// | [`ThicketError::Model`]              | empty input, non-finite values or a label `>= n_classes` |
    /// | [`ThicketError::TooFewSamples`]      | fewer rows than folds                 |
    /// | [`ThicketError::TooFewSamplesForFolds`] | a class has fewer rows than folds  |
    /// | estimator errors                     | see [`Estimator::fit`] and [`Estimator::predict_proba`] |
    #[instrument(skip_all, fields(name = %self.name, n_folds = self.n_folds, n_samples = x.nrows()))]
    pub fn fit_transform(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &Target,
        evals: &[ArrayView2<'_, f64>],
        cache_dir: Option<&Path>,
        batch_size: Option<usize>,
    ) -> Result<FoldPredictions, ThicketError> {
        if y.len() != x.nrows() {
            return Err(ThicketError::TargetLengthMismatch {
                n_samples: x.nrows(),
                n_targets: y.len(),
            });
        }
        validate_training(x, y)?;

        if self.n_folds == 1 {
            let est = &mut self.folds[0];
            est.fit(x, y, cache_dir)?;
            let out_of_fold = est.predict_proba(x, cache_dir, batch_size)?;
            let evals = evals
                .iter()
                .map(|e| est.predict_proba(*e, cache_dir, batch_size))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(FoldPredictions { out_of_fold, evals });
        }

        let assignment = fold_assignment(y, self.n_folds, self.seed)?;
        let mut out_of_fold: Option<Array2<f64>> = None;
        let mut eval_sums: Vec<Option<Array2<f64>>> = vec![None; evals.len()];

        for (k, est) in self.folds.iter_mut().enumerate() {
            let (train, held_out): (Vec<usize>, Vec<usize>) =
                (0..x.nrows()).partition(|&i| assignment[i] != k);
            debug!(fold = k, n_train = train.len(), n_held_out = held_out.len(), "fitting fold");

            let x_train = x.select(Axis(0), &train);
            est.fit(x_train.view(), &y.select(&train), cache_dir)?;

            let pred = est.predict_proba(x.select(Axis(0), &held_out).view(), cache_dir, batch_size)?;
            let oof = out_of_fold.get_or_insert_with(|| Array2::zeros((x.nrows(), pred.ncols())));
            for (row, &i) in pred.outer_iter().zip(&held_out) {
                oof.row_mut(i).assign(&row);
            }

            for (sum, e) in eval_sums.iter_mut().zip(evals) {
                let pred = est.predict_proba(*e, cache_dir, batch_size)?;
                *sum.get_or_insert_with(|| Array2::zeros(pred.raw_dim())) += &pred;
            }
        }

        let n_folds = self.n_folds as f64;
        Ok(FoldPredictions {
            out_of_fold: out_of_fold.unwrap_or_else(|| Array2::zeros((0, 0))),
            evals: eval_sums
                .into_iter()
                .map(|sum| sum.map(|s| s / n_folds).unwrap_or_else(|| Array2::zeros((0, 0))))
                .collect(),
        })
    }

    /// Average the predictions of every fold.
    ///
    /// # Errors
    ///
    /// See [`Estimator::predict_proba`].
    pub fn predict_proba(
        &mut self,
        x: ArrayView2<'_, f64>,
        cache_dir: Option<&Path>,
        batch_size: Option<usize>,
    ) -> Result<Array2<f64>, ThicketError> {
        let mut sum: Option<Array2<f64>> = None;
        for est in &mut self.folds {
            let pred = est.predict_proba(x, cache_dir, batch_size)?;
            *sum.get_or_insert_with(|| Array2::zeros(pred.raw_dim())) += &pred;
        }
        let n_folds = self.n_folds as f64;
        Ok(sum.map(|s| s / n_folds).unwrap_or_else(|| Array2::zeros((0, 0))))
    }
}

/// Fold index for every row.
///
/// Classification is stratified: rows are shuffled within each class and
/// dealt round-robin, continuing the rotation from one class to the next so
/// fold sizes stay balanced. Regression shuffles all rows and deals them the
/// same way.
///
/// # Errors
///
/// [`ThicketError::TooFewSamples`], [`ThicketError::TooFewSamplesForFolds`],
/// or [`ThicketError::Model`] wrapping [`TreeError::LabelOutOfRange`].
pub fn fold_assignment(y: &Target, n_folds: usize, seed: u64) -> Result<Vec<usize>, ThicketError> {
    if y.len() < n_folds {
        return Err(ThicketError::TooFewSamples {
            n_samples: y.len(),
            n_folds,
        });
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut groups: Vec<Vec<usize>> = match y {
        Target::Classes { labels, n_classes } => {
            let mut by_class = vec![Vec::new(); (*n_classes).max(1)];
            for (i, &label) in labels.iter().enumerate() {
                let Some(rows) = by_class.get_mut(label) else {
                    return Err(TreeError::LabelOutOfRange {
                        label,
                        sample_index: i,
                        n_classes: *n_classes,
                    }
                    .into());
                };
                rows.push(i);
            }
            for (class, rows) in by_class.iter().enumerate() {
                if !rows.is_empty() && rows.len() < n_folds {
                    return Err(ThicketError::TooFewSamplesForFolds {
                        class,
                        count: rows.len(),
                        n_folds,
                    });
                }
            }
            by_class
        }
        Target::Values(values) => vec![(0..values.len()).collect()],
    };

    let mut assignment = vec![0usize; y.len()];
    let mut next = 0;
    for rows in &mut groups {
        rows.shuffle(&mut rng);
        for &i in rows.iter() {
            assignment[i] = next % n_folds;
            next += 1;
        }
    }
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::descriptor::EstimatorKind;
    use crate::estimator::tests::{CountingBackend, CountingHandle};

    fn make_separable_data(n: usize) -> (Array2<f64>, Target) {
        let x = Array2::from_shape_fn((n, 2), |(i, f)| {
            if f == 0 { (i % 3) as f64 * 10.0 + (i / 3) as f64 * 0.01 } else { 0.5 }
        });
        (x, Target::classes_with((0..n).map(|i| i % 3).collect(), 3))
    }

    #[test]
    fn assignment_is_stratified_and_balanced() {
        let y = Target::classes((0..30).map(|i| i % 3).collect());
        let folds = fold_assignment(&y, 5, 1).unwrap();
        for k in 0..5 {
            let members: Vec<usize> = (0..30).filter(|&i| folds[i] == k).collect();
            assert_eq!(members.len(), 6);
            for class in 0..3 {
                assert_eq!(members.iter().filter(|&&i| i % 3 == class).count(), 2);
            }
        }
    }

    #[test]
    fn assignment_is_deterministic() {
        let y = Target::values((0..17).map(|i| i as f64).collect());
        assert_eq!(fold_assignment(&y, 4, 9).unwrap(), fold_assignment(&y, 4, 9).unwrap());
    }

    #[test]
    fn too_few_samples_for_class() {
        let y = Target::classes(vec![0, 0, 0, 1]);
        assert!(matches!(
            fold_assignment(&y, 3, 0),
            Err(ThicketError::TooFewSamplesForFolds { class: 1, count: 1, n_folds: 3 })
        ));
    }

    #[test]
    fn label_beyond_class_count_is_an_error() {
        let y = Target::classes_with(vec![0, 1, 0, 5], 2);
        assert!(matches!(
            fold_assignment(&y, 2, 0),
            Err(ThicketError::Model(TreeError::LabelOutOfRange { label: 5, sample_index: 3, n_classes: 2 }))
        ));

        let state = std::sync::Arc::new(CountingBackend::default());
        let backend: Arc<dyn Backend> = Arc::new(CountingHandle(Arc::clone(&state)));
        let mut kfold =
            KFoldEstimator::with_backend("mock", backend, &Params::new(), 2, 0, CachePolicy::Reuse)
                .unwrap();
        let (x, _) = make_separable_data(4);
        assert!(matches!(
            kfold.fit_transform(x.view(), &y, &[], None, None),
            Err(ThicketError::Model(TreeError::LabelOutOfRange { .. }))
        ));
        assert_eq!(state.fits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_folds_rejected() {
        let desc = EstimatorDescriptor::new(EstimatorKind::RandomForestClassifier, "rf", Params::new());
        assert!(matches!(
            KFoldEstimator::new(&desc, 0, 0, CachePolicy::Reuse),
            Err(ThicketError::InvalidFoldCount { n_folds: 0 })
        ));
    }

    #[test]
    fn folds_are_named_and_seeded() {
        let desc = EstimatorDescriptor::new(
            EstimatorKind::ExtraTreesClassifier,
            "et",
            Params::new().with("random_state", 10),
        );
        let kfold = KFoldEstimator::new(&desc, 3, 0, CachePolicy::Reuse).unwrap();
        let names: Vec<&str> = kfold.folds().iter().map(Estimator::name).collect();
        assert_eq!(names, ["et/fold-0", "et/fold-1", "et/fold-2"]);
        assert_eq!(kfold.folds()[2].params().get("random_state"), Some(&Value::from(12u64)));
    }

    #[test]
    fn out_of_fold_covers_every_row() {
        let desc = EstimatorDescriptor::new(
            EstimatorKind::RandomForestClassifier,
            "rf",
            Params::new().with("n_estimators", 10),
        );
        let mut kfold = KFoldEstimator::new(&desc, 3, 7, CachePolicy::Reuse).unwrap();
        let (x, y) = make_separable_data(30);
        let test = x.slice(ndarray::s![..5, ..]);
        let preds = kfold.fit_transform(x.view(), &y, &[test], None, None).unwrap();
        assert_eq!(preds.out_of_fold.dim(), (30, 3));
        for row in preds.out_of_fold.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(preds.evals.len(), 1);
        assert_eq!(preds.evals[0].dim(), (5, 3));
        assert_eq!(kfold.predict_proba(test, None, None).unwrap(), preds.evals[0]);
    }

    #[test]
    fn single_fold_trains_on_everything() {
        let state = std::sync::Arc::new(CountingBackend::default());
        let backend: Arc<dyn Backend> = Arc::new(CountingHandle(Arc::clone(&state)));
        let mut kfold =
            KFoldEstimator::with_backend("mock", backend, &Params::new(), 1, 0, CachePolicy::Reuse)
                .unwrap();
        let (x, y) = make_separable_data(9);
        let preds = kfold.fit_transform(x.view(), &y, &[], None, None).unwrap();
        assert_eq!(preds.out_of_fold.nrows(), 9);
        assert_eq!(state.fits.load(Ordering::SeqCst), 1);
        assert_eq!(*state.predict_rows.lock().unwrap(), vec![9]);
    }

    #[test]
    fn cached_folds_skip_refit() {
        let dir = tempfile::tempdir().unwrap();
        let state = std::sync::Arc::new(CountingBackend::default());
        let backend: Arc<dyn Backend> = Arc::new(CountingHandle(Arc::clone(&state)));
        let (x, y) = make_separable_data(12);
        for _ in 0..2 {
            let mut kfold = KFoldEstimator::with_backend(
                "layer-0/mock",
                Arc::clone(&backend),
                &Params::new(),
                3,
                0,
                CachePolicy::Reuse,
            )
            .unwrap();
            kfold.fit_transform(x.view(), &y, &[], Some(dir.path()), None).unwrap();
        }
        assert_eq!(state.fits.load(Ordering::SeqCst), 3);
        assert!(dir.path().join("layer-0-mock-fold-2.bin").exists());
    }
}
