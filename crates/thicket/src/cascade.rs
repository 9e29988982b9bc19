//! Auto-growing cascade.
//!
//! Every layer trains one [`KFoldEstimator`] per configured descriptor.
//! Layer 0 sees the raw features; later layers see the raw features with the
//! previous layer's predictions appended as extra columns. Growth continues
//! until `early_stopping_rounds` consecutive layers fail to improve the best
//! score, or `max_layers` is reached (`0` means no cap). Layers after the
//! best one are dropped.

use std::path::PathBuf;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2, Axis, concatenate};
use serde::Serialize;
use thicket_trees::{Target, Task, validate_training};
use tracing::{Span, info, info_span};

use crate::config::CascadeConfig;
use crate::error::ThicketError;
use crate::kfold::KFoldEstimator;
use crate::metrics::{Metric, argmax_rows};
use crate::model::Backend;

/// Why growth ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// Too many consecutive layers without improvement.
    EarlyStopping,
    /// The layer cap was reached.
    MaxLayers,
}

/// Lifecycle of a [`Cascade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CascadeState {
    /// Nothing trained yet.
    Empty,
    /// Training layer `layer`.
    Growing {
        /// Zero-based index of the layer being trained.
        layer: usize,
    },
    /// Growth finished.
    Stopped(StopReason),
}

/// Scores recorded for one grown layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerReport {
    /// Zero-based layer index.
    pub layer: usize,
    /// Score of the averaged layer output.
    pub score: f64,
    /// Score of each member estimator, by descriptor name.
    pub estimator_scores: Vec<(String, f64)>,
    /// Whether this layer became the best so far.
    pub improved: bool,
}

/// A cascade of k-fold estimator layers.
#[derive(Debug)]
pub struct Cascade {
    config: CascadeConfig,
    backends: Vec<Arc<dyn Backend>>,
    metric: Metric,
    layers: Vec<Vec<KFoldEstimator>>,
    state: CascadeState,
    history: Vec<LayerReport>,
    best_layer: Option<usize>,
    n_features: Option<usize>,
    span: Span,
}

impl Cascade {
    /// A cascade over the built-in estimator kinds named in `config`.
    ///
    /// # Errors
    ///
    /// See [`CascadeConfig::validate`].
    pub fn new(config: CascadeConfig) -> Result<Self, ThicketError> {
        let backends = config.estimators().iter().map(|d| d.kind.backend()).collect();
        Self::with_backends(config, backends)
    }

    /// A cascade whose `i`-th descriptor is built by `backends[i]`.
    ///
    /// # Errors
    ///
    /// [`ThicketError::InvalidConfig`] when the backend count or tasks do not
    /// match the descriptors, otherwise see [`CascadeConfig::validate`].
    pub fn with_backends(
        config: CascadeConfig,
        backends: Vec<Arc<dyn Backend>>,
    ) -> Result<Self, ThicketError> {
        config.validate()?;
        if backends.len() != config.estimators().len() {
            return Err(ThicketError::InvalidConfig {
                field: "estimators",
                reason: format!(
                    "{} descriptors but {} backends",
                    config.estimators().len(),
                    backends.len()
                ),
            });
        }
        let task = config.task();
        if let Some(backend) = backends.iter().find(|b| b.task() != task) {
            return Err(ThicketError::InvalidConfig {
                field: "estimators",
                reason: format!("backend {} solves {}, expected {task}", backend.id(), backend.task()),
            });
        }
        Ok(Self {
            metric: Metric::for_task(task),
            config,
            backends,
            layers: Vec::new(),
            state: CascadeState::Empty,
            history: Vec::new(),
            best_layer: None,
            n_features: None,
            span: info_span!("cascade"),
        })
    }

    /// Grow layers on `x`, `y` until a stop condition holds.
    ///
    /// Layers are scored on `validation` when given, otherwise on the
    /// out-of-fold training predictions. Refitting discards previous layers
    /// (cached models are still reused).
    ///
    /// # Errors
    ///
    /// | Variant                                | When                                  |
    /// |----------------------------------------|---------------------------------------|
    /// | [`ThicketError::TaskMismatch`]         | a target does not match the estimators |
    /// | [`ThicketError::TargetLengthMismatch`] | a target and its matrix disagree on rows |
    /// | [`ThicketError::FeatureMismatch`]      | validation columns differ from training |
    /// | [`ThicketError::Model`]                | empty input, non-finite values or a label `>= n_classes` |
    /// | member errors                          | see [`KFoldEstimator::fit_transform`]; growth aborts |
    pub fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &Target,
        validation: Option<(ArrayView2<'_, f64>, &Target)>,
    ) -> Result<StopReason, ThicketError> {
        let span = self.span.clone();
        let _guard = span.enter();

        self.check_target(x, y)?;
        if let Some((xv, yv)) = validation {
            self.check_target(xv, yv)?;
            if xv.ncols() != x.ncols() {
                return Err(ThicketError::FeatureMismatch {
                    expected: x.ncols(),
                    got: xv.ncols(),
                });
            }
        }

        self.layers.clear();
        self.history.clear();
        self.best_layer = None;
        self.n_features = Some(x.ncols());
        self.state = CascadeState::Empty;

        let cache_dir = self.config.cache_dir().map(PathBuf::from);
        let batch_size = self.config.predict_batch_size();
        let mut best_score: Option<f64> = None;
        let mut stale = 0;
        let mut reason = StopReason::MaxLayers;
        let mut train_aug: Option<Array2<f64>> = None;
        let mut val_aug: Option<Array2<f64>> = None;

        let cap = match self.config.max_layers() {
            0 => usize::MAX,
            n => n,
        };
        for layer in 0..cap {
            self.state = CascadeState::Growing { layer };
            let train_in = augment(x, train_aug.as_ref())?;
            let val_in = validation
                .map(|(xv, _)| augment(xv, val_aug.as_ref()))
                .transpose()?;
            let evals: Vec<ArrayView2<'_, f64>> = val_in.iter().map(Array2::view).collect();
            info!(layer, n_features = train_in.ncols(), "growing layer");

            let mut members = Vec::with_capacity(self.backends.len());
            let mut train_outs = Vec::with_capacity(self.backends.len());
            let mut val_outs = Vec::with_capacity(self.backends.len());
            let mut estimator_scores = Vec::with_capacity(self.backends.len());
            for (desc, backend) in self.config.estimators().iter().zip(&self.backends) {
                let mut member = KFoldEstimator::with_backend(
                    format!("layer-{layer}/{}", desc.name),
                    Arc::clone(backend),
                    &desc.params,
                    self.config.n_folds(),
                    self.config.seed(),
                    self.config.cache_policy(),
                )?;
                let preds =
                    member.fit_transform(train_in.view(), y, &evals, cache_dir.as_deref(), batch_size)?;
                let member_score = match (validation, preds.evals.first()) {
                    (Some((_, yv)), Some(val_pred)) => self.metric.score(val_pred.view(), yv),
                    _ => self.metric.score(preds.out_of_fold.view(), y),
                };
                info!(layer, estimator = %desc.name, score = member_score, "estimator scored");
                estimator_scores.push((desc.name.clone(), member_score));
                train_outs.push(preds.out_of_fold);
                val_outs.extend(preds.evals);
                members.push(member);
            }

            let score = match validation {
                Some((_, yv)) => self.metric.score(mean(&val_outs).view(), yv),
                None => self.metric.score(mean(&train_outs).view(), y),
            };
            let improved = self.metric.improves(score, best_score);
            if improved {
                best_score = Some(score);
                self.best_layer = Some(layer);
                stale = 0;
            } else {
                stale += 1;
            }
            info!(layer, score, improved, best_layer = ?self.best_layer, "layer scored");
            self.history.push(LayerReport {
                layer,
                score,
                estimator_scores,
                improved,
            });
            self.layers.push(members);

            if stale >= self.config.early_stopping_rounds() {
                reason = StopReason::EarlyStopping;
                break;
            }
            train_aug = Some(stack(&train_outs)?);
            if validation.is_some() {
                val_aug = Some(stack(&val_outs)?);
            }
        }

        let keep = self.best_layer.map_or(self.layers.len(), |best| best + 1);
        self.layers.truncate(keep);
        self.state = CascadeState::Stopped(reason);
        info!(
            ?reason,
            n_layers = self.layers.len(),
            best_score = ?best_score,
            "cascade stopped"
        );
        Ok(reason)
    }

    fn check_target(&self, x: ArrayView2<'_, f64>, y: &Target) -> Result<(), ThicketError> {
        let expected = self.config.task();
        if y.task() != expected {
            return Err(ThicketError::TaskMismatch {
                expected,
                got: y.task(),
            });
        }
        if y.len() != x.nrows() {
            return Err(ThicketError::TargetLengthMismatch {
                n_samples: x.nrows(),
                n_targets: y.len(),
            });
        }
        validate_training(x, y)?;
        Ok(())
    }

    /// Run `x` through the kept layers and average the last layer's outputs.
    ///
    /// # Errors
    ///
    /// [`ThicketError::CascadeNotFitted`] before a successful `fit`,
    /// [`ThicketError::FeatureMismatch`] for the wrong column count, or a
    /// member's prediction error.
    pub fn predict_proba(&mut self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ThicketError> {
        let span = self.span.clone();
        let _guard = span.enter();

        let (Some(n_features), CascadeState::Stopped(_)) = (self.n_features, self.state) else {
            return Err(ThicketError::CascadeNotFitted);
        };
        if x.ncols() != n_features {
            return Err(ThicketError::FeatureMismatch {
                expected: n_features,
                got: x.ncols(),
            });
        }

        let cache_dir = self.config.cache_dir().map(PathBuf::from);
        let batch_size = self.config.predict_batch_size();
        let n_layers = self.layers.len();
        let mut aug: Option<Array2<f64>> = None;
        for (i, members) in self.layers.iter_mut().enumerate() {
            let input = augment(x, aug.as_ref())?;
            let outs = members
                .iter_mut()
                .map(|m| m.predict_proba(input.view(), cache_dir.as_deref(), batch_size))
                .collect::<Result<Vec<_>, _>>()?;
            if i + 1 == n_layers {
                return Ok(mean(&outs));
            }
            aug = Some(stack(&outs)?);
        }
        Err(ThicketError::CascadeNotFitted)
    }

    /// Predicted class index (as `f64`) or regression value per row.
    ///
    /// # Errors
    ///
    /// Same as [`Cascade::predict_proba`].
    pub fn predict(&mut self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ThicketError> {
        let proba = self.predict_proba(x)?;
        Ok(match self.config.task() {
            Task::Regression => proba.column(0).to_owned(),
            Task::Classification => argmax_rows(proba.view()),
        })
    }

    /// Return the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CascadeState {
        self.state
    }

    /// Return a report for every layer grown, including discarded ones.
    #[must_use]
    pub fn history(&self) -> &[LayerReport] {
        &self.history
    }

    /// Return the index of the best layer.
    #[must_use]
    pub fn best_layer(&self) -> Option<usize> {
        self.best_layer
    }

    /// Return the score of the best layer.
    #[must_use]
    pub fn best_score(&self) -> Option<f64> {
        self.best_layer
            .and_then(|b| self.history.get(b))
            .map(|r| r.score)
    }

    /// Return the number of layers used for prediction.
    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Return the scoring metric.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Return the configuration.
    #[must_use]
    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }
}

/// `x` with `extra` appended column-wise.
fn augment(x: ArrayView2<'_, f64>, extra: Option<&Array2<f64>>) -> Result<Array2<f64>, ThicketError> {
    Ok(match extra {
        None => x.to_owned(),
        Some(extra) => concatenate(Axis(1), &[x.view(), extra.view()])?,
    })
}

/// Column-wise concatenation of member outputs.
fn stack(outs: &[Array2<f64>]) -> Result<Array2<f64>, ThicketError> {
    let views: Vec<ArrayView2<'_, f64>> = outs.iter().map(Array2::view).collect();
    Ok(concatenate(Axis(1), &views)?)
}

/// Element-wise mean of same-shaped matrices.
fn mean(outs: &[Array2<f64>]) -> Array2<f64> {
    let Some((first, rest)) = outs.split_first() else {
        return Array2::zeros((0, 0));
    };
    let mut sum = first.clone();
    for out in rest {
        sum += out;
    }
    sum / outs.len() as f64
}
