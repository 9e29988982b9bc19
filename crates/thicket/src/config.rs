//! Cascade configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thicket_trees::Task;

use crate::cache::{CachePolicy, sanitize_name};
use crate::descriptor::EstimatorDescriptor;
use crate::error::ThicketError;

fn default_max_layers() -> usize {
    10
}

fn default_early_stopping_rounds() -> usize {
    3
}

fn default_n_folds() -> usize {
    3
}

fn default_seed() -> u64 {
    42
}

/// Configuration of an auto-growing cascade.
///
/// Build with [`CascadeConfig::new`] and `with_*` setters, or load from JSON
/// with [`CascadeConfig::from_json_file`].
///
/// # Defaults
///
/// | Parameter               | Default                 |
/// |-------------------------|-------------------------|
/// | `max_layers`            | 10 (`0` means no cap)   |
/// | `early_stopping_rounds` | 3                       |
/// | `n_folds`               | 3                       |
/// | `cache_dir`             | `None` (models in memory) |
/// | `cache_policy`          | `Reuse`                 |
/// | `predict_batch_size`    | `None` (per-model heuristic) |
/// | `seed`                  | 42                      |
///
/// ```
/// use thicket::CascadeConfig;
///
/// let config = CascadeConfig::from_json_str(
///     r#"{
///         "estimators": [
///             {"kind": "RandomForestClassifier", "name": "rf", "params": {"n_estimators": 50}},
///             {"kind": "ExtraTreesClassifier", "name": "crf", "params": {"max_features": 1}}
///         ],
///         "early_stopping_rounds": 2
///     }"#,
/// )
/// .unwrap();
/// assert_eq!(config.early_stopping_rounds(), 2);
/// assert_eq!(config.max_layers(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CascadeConfig {
    estimators: Vec<EstimatorDescriptor>,
    #[serde(default = "default_max_layers")]
    max_layers: usize,
    #[serde(default = "default_early_stopping_rounds")]
    early_stopping_rounds: usize,
    #[serde(default = "default_n_folds")]
    n_folds: usize,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    cache_policy: CachePolicy,
    #[serde(default)]
    predict_batch_size: Option<usize>,
    #[serde(default = "default_seed")]
    seed: u64,
}

impl CascadeConfig {
    /// A config that stacks `estimators` in every layer.
    ///
    /// # Errors
    ///
    /// See [`CascadeConfig::validate`].
    pub fn new(estimators: Vec<EstimatorDescriptor>) -> Result<Self, ThicketError> {
        let config = Self {
            estimators,
            max_layers: default_max_layers(),
            early_stopping_rounds: default_early_stopping_rounds(),
            n_folds: default_n_folds(),
            cache_dir: None,
            cache_policy: CachePolicy::default(),
            predict_batch_size: None,
            seed: default_seed(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// [`ThicketError::ParseConfig`] for malformed JSON or unknown fields,
    /// then anything [`CascadeConfig::validate`] returns.
    pub fn from_json_str(json: &str) -> Result<Self, ThicketError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ThicketError::ParseConfig {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// [`ThicketError::ReadConfig`] if the file can't be read, otherwise as
    /// [`CascadeConfig::from_json_str`].
    pub fn from_json_file(path: &Path) -> Result<Self, ThicketError> {
        let text = std::fs::read_to_string(path).map_err(|source| ThicketError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ThicketError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every cascade relies on.
    ///
    /// # Errors
    ///
    /// [`ThicketError::InvalidConfig`] when the estimator list is empty,
    /// two names map to the same cache file name, tasks are mixed, or
    /// `early_stopping_rounds` is zero;
    /// [`ThicketError::InvalidFoldCount`] when `n_folds` is zero.
    pub fn validate(&self) -> Result<(), ThicketError> {
        let Some(first) = self.estimators.first() else {
            return Err(ThicketError::InvalidConfig {
                field: "estimators",
                reason: "must not be empty".into(),
            });
        };
        let mut names = BTreeMap::new();
        for desc in &self.estimators {
            if let Some(other) = names.insert(sanitize_name(&desc.name), desc.name.as_str()) {
                let reason = if other == desc.name {
                    format!("name {:?} is used twice", desc.name)
                } else {
                    format!("names {other:?} and {:?} share a cache file name", desc.name)
                };
                return Err(ThicketError::InvalidConfig {
                    field: "estimators",
                    reason,
                });
            }
            if desc.kind.task() != first.kind.task() {
                return Err(ThicketError::InvalidConfig {
                    field: "estimators",
                    reason: format!(
                        "{} is a {} estimator but {} is {}",
                        desc.name,
                        desc.kind.task(),
                        first.name,
                        first.kind.task()
                    ),
                });
            }
        }
        if self.early_stopping_rounds == 0 {
            return Err(ThicketError::InvalidConfig {
                field: "early_stopping_rounds",
                reason: "must be at least 1".into(),
            });
        }
        if self.n_folds == 0 {
            return Err(ThicketError::InvalidFoldCount { n_folds: 0 });
        }
        Ok(())
    }

    // --- Setters ---

    /// Set the maximum number of layers grown; `0` grows until early stopping.
    #[must_use]
    pub fn with_max_layers(mut self, max_layers: usize) -> Self {
        self.max_layers = max_layers;
        self
    }

    /// Set how many consecutive non-improving layers stop growth.
    #[must_use]
    pub fn with_early_stopping_rounds(mut self, rounds: usize) -> Self {
        self.early_stopping_rounds = rounds;
        self
    }

    /// Set the number of cross-validation folds per estimator.
    #[must_use]
    pub fn with_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    /// Persist fitted models under `cache_dir` instead of keeping them in memory.
    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    /// Set how existing cache files are treated.
    #[must_use]
    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    /// Set an explicit prediction batch size.
    #[must_use]
    pub fn with_predict_batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.predict_batch_size = batch_size;
        self
    }

    /// Set the seed for fold assignment and default estimator seeds.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the per-layer estimator descriptors.
    #[must_use]
    pub fn estimators(&self) -> &[EstimatorDescriptor] {
        &self.estimators
    }

    /// Return the task shared by every estimator.
    #[must_use]
    pub fn task(&self) -> Task {
        self.estimators
            .first()
            .map_or(Task::Classification, |d| d.kind.task())
    }

    /// Return the maximum number of layers, `0` for no cap.
    #[must_use]
    pub fn max_layers(&self) -> usize {
        self.max_layers
    }

    /// Return the early-stopping patience.
    #[must_use]
    pub fn early_stopping_rounds(&self) -> usize {
        self.early_stopping_rounds
    }

    /// Return the number of folds.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Return the cache directory, if any.
    #[must_use]
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Return the cache policy.
    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// Return the explicit prediction batch size, if any.
    #[must_use]
    pub fn predict_batch_size(&self) -> Option<usize> {
        self.predict_batch_size
    }

    /// Return the seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}
