use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thicket_trees::{Criterion, Forest, ForestConfig, Target, Task};

use super::{DEFAULT_N_ESTIMATORS, max_features, n_jobs, verbose};
use crate::batch::Footprint;
use crate::error::ThicketError;
use crate::model::{Backend, Model};
use crate::params::Params;

/// Which forest recipe a [`ForestBackend`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForestFamily {
    /// Bootstrap samples, best split among `max_features` candidates.
    RandomForest,
    /// Full sample, random threshold per candidate feature.
    ExtraTrees,
}

/// Builds [`ForestModel`]s.
///
/// Recognised hyperparameters: `n_estimators`, `max_features`, `max_depth`,
/// `min_samples_split`, `min_samples_leaf`, `bootstrap`, `criterion`,
/// `random_state`, `n_jobs`, `verbose`.
#[derive(Debug, Clone, Copy)]
pub struct ForestBackend {
    family: ForestFamily,
    task: Task,
}

impl ForestBackend {
    /// Backend for `family` on `task`.
    #[must_use]
    pub fn new(family: ForestFamily, task: Task) -> Self {
        Self { family, task }
    }
}

impl Backend for ForestBackend {
    fn id(&self) -> &str {
        match (self.family, self.task) {
            (ForestFamily::RandomForest, Task::Classification) => "random_forest_classifier",
            (ForestFamily::RandomForest, Task::Regression) => "random_forest_regressor",
            (ForestFamily::ExtraTrees, Task::Classification) => "extra_trees_classifier",
            (ForestFamily::ExtraTrees, Task::Regression) => "extra_trees_regressor",
        }
    }

    fn task(&self) -> Task {
        self.task
    }

    fn build(&self, params: &Params) -> Result<Box<dyn Model>, ThicketError> {
        let id = self.id();
        let mut r = params.reader(id);
        let n_estimators = r.usize("n_estimators")?.unwrap_or(DEFAULT_N_ESTIMATORS);
        let mut config = match self.family {
            ForestFamily::RandomForest => ForestConfig::random_forest(self.task, n_estimators)?,
            ForestFamily::ExtraTrees => ForestConfig::extra_trees(self.task, n_estimators)?,
        };
        if let Some(mf) = max_features(&mut r)? {
            config = config.with_max_features(mf);
        }
        if let Some(depth) = r.usize("max_depth")? {
            config = config.with_max_depth(Some(depth));
        }
        if let Some(n) = r.usize("min_samples_split")? {
            config = config.with_min_samples_split(n);
        }
        if let Some(n) = r.usize("min_samples_leaf")? {
            config = config.with_min_samples_leaf(n);
        }
        if let Some(bootstrap) = r.bool("bootstrap")? {
            config = config.with_bootstrap(bootstrap);
        }
        if let Some(value) = r.raw("criterion") {
            let criterion = match value.as_str() {
                Some("gini") => Criterion::Gini,
                Some("entropy") => Criterion::Entropy,
                Some("squared_error" | "mse") => Criterion::SquaredError,
                _ => {
                    return Err(r.reject(
                        "criterion",
                        "\"gini\", \"entropy\" or \"squared_error\"",
                        value,
                    ));
                }
            };
            config = config.with_criterion(criterion);
        }
        if let Some(seed) = r.u64("random_state")? {
            config = config.with_seed(seed);
        }
        config = config.with_n_jobs(n_jobs(&mut r)?);
        if let Some(v) = verbose(&mut r)? {
            config = config.with_verbose(v);
        }
        r.finish();

        Ok(Box::new(ForestModel {
            backend: id.to_string(),
            config,
            forest: None,
        }))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Model>, ThicketError> {
        let model: ForestModel =
            bincode::deserialize(bytes).map_err(|source| ThicketError::DecodeModel {
                name: self.id().to_string(),
                source,
            })?;
        Ok(Box::new(model))
    }
}

/// A forest configuration plus, once fitted, the trained trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    backend: String,
    config: ForestConfig,
    forest: Option<Forest>,
}

impl ForestModel {
    /// The trained forest, if any.
    #[must_use]
    pub fn forest(&self) -> Option<&Forest> {
        self.forest.as_ref()
    }

    fn fitted(&self) -> Result<&Forest, ThicketError> {
        self.forest.as_ref().ok_or_else(|| ThicketError::NotFitted {
            name: self.backend.clone(),
        })
    }
}

impl Model for ForestModel {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &Target) -> Result<(), ThicketError> {
        self.forest = Some(self.config.fit(x, y)?);
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ThicketError> {
        Ok(self.fitted()?.predict_proba(x)?)
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
        if let Some(forest) = &mut self.forest {
            forest.set_verbose(verbose);
        }
    }

    fn footprint(&self) -> Option<Footprint> {
        self.forest.as_ref().map(|forest| Footprint {
            n_estimators: forest.n_estimators(),
            n_outputs: forest.n_outputs(),
            task: forest.task(),
        })
    }
}
