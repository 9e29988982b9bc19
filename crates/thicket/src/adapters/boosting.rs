use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thicket_trees::{BoostingConfig, GradientBoosting, Target, Task};

use super::{DEFAULT_N_ESTIMATORS, max_features, n_jobs, verbose};
use crate::error::ThicketError;
use crate::model::{Backend, Model};
use crate::params::Params;

/// Builds [`BoostingModel`]s.
///
/// Recognised hyperparameters: `n_estimators`, `learning_rate`,
/// `max_depth`, `min_samples_split`, `min_samples_leaf`, `subsample`,
/// `max_features`, `random_state`, `n_jobs`, `verbose`.
#[derive(Debug, Clone, Copy)]
pub struct BoostingBackend {
    task: Task,
}

impl BoostingBackend {
    /// Backend for gradient boosting on `task`.
    #[must_use]
    pub fn new(task: Task) -> Self {
        Self { task }
    }
}

impl Backend for BoostingBackend {
    fn id(&self) -> &str {
        match self.task {
            Task::Classification => "gbdt_classifier",
            Task::Regression => "gbdt_regressor",
        }
    }

    fn task(&self) -> Task {
        self.task
    }

    fn build(&self, params: &Params) -> Result<Box<dyn Model>, ThicketError> {
        let id = self.id();
        let mut r = params.reader(id);
        let n_estimators = r.usize("n_estimators")?.unwrap_or(DEFAULT_N_ESTIMATORS);
        let mut config = BoostingConfig::new(self.task, n_estimators)?;
        if let Some(lr) = r.f64("learning_rate")? {
            config = config.with_learning_rate(lr);
        }
        if let Some(depth) = r.usize("max_depth")? {
            config = config.with_max_depth(depth);
        }
        if let Some(n) = r.usize("min_samples_split")? {
            config = config.with_min_samples_split(n);
        }
        if let Some(n) = r.usize("min_samples_leaf")? {
            config = config.with_min_samples_leaf(n);
        }
        if let Some(fraction) = r.f64("subsample")? {
            config = config.with_subsample(fraction);
        }
        if let Some(mf) = max_features(&mut r)? {
            config = config.with_max_features(mf);
        }
        if let Some(seed) = r.u64("random_state")? {
            config = config.with_seed(seed);
        }
        config = config.with_n_jobs(n_jobs(&mut r)?);
        if let Some(v) = verbose(&mut r)? {
            config = config.with_verbose(v);
        }
        r.finish();

        Ok(Box::new(BoostingModel {
            backend: id.to_string(),
            config,
            model: None,
        }))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Model>, ThicketError> {
        let model: BoostingModel =
            bincode::deserialize(bytes).map_err(|source| ThicketError::DecodeModel {
                name: self.id().to_string(),
                source,
            })?;
        Ok(Box::new(model))
    }
}

/// A boosting configuration plus, once fitted, the trained stages.
///
/// Boosting has no batch-size heuristic: its per-row cost does not grow with
/// the number of classes the way forest averaging does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingModel {
    backend: String,
    config: BoostingConfig,
    model: Option<GradientBoosting>,
}

impl BoostingModel {
    /// The trained ensemble, if any.
    #[must_use]
    pub fn ensemble(&self) -> Option<&GradientBoosting> {
        self.model.as_ref()
    }
}

impl Model for BoostingModel {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &Target) -> Result<(), ThicketError> {
        self.model = Some(self.config.fit(x, y)?);
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ThicketError> {
        let model = self.model.as_ref().ok_or_else(|| ThicketError::NotFitted {
            name: self.backend.clone(),
        })?;
        Ok(model.predict_proba(x)?)
    }

    fn encode(&self) -> Result<Vec<u8>, ThicketError> {
        bincode::serialize(self).map_err(|source| ThicketError::EncodeModel {
            name: self.backend.clone(),
            source,
        })
    }

    fn verbose(&self) -> Option<u8> {
        Some(self.config.verbose())
    }

    fn set_verbose(&mut self, verbose: u8) {
        self.config = self.config.clone().with_verbose(verbose);
        if let Some(model) = &mut self.model {
            model.set_verbose(verbose);
        }
    }
}
