//! Declarative estimator descriptions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thicket_trees::Task;

use crate::adapters::{BoostingBackend, ForestBackend, ForestFamily};
use crate::model::Backend;
use crate::params::Params;

/// The built-in estimator families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EstimatorKind {
    /// Bagged CART forest.
    RandomForestClassifier,
    /// Extremely randomized trees. With `max_features = 1` this is a
    /// completely-random forest.
    #[serde(alias = "CompletelyRandomForestClassifier")]
    ExtraTreesClassifier,
    /// Gradient-boosted trees with a softmax loss.
    #[serde(alias = "GradientBoostingClassifier")]
    GbdtClassifier,
    /// Bagged CART forest on squared error.
    RandomForestRegressor,
    /// Extremely randomized trees on squared error.
    #[serde(alias = "CompletelyRandomForestRegressor")]
    ExtraTreesRegressor,
    /// Gradient-boosted trees on squared error.
    #[serde(alias = "GradientBoostingRegressor")]
    GbdtRegressor,
}

impl EstimatorKind {
    /// Every built-in kind.
    pub const ALL: [EstimatorKind; 6] = [
        EstimatorKind::RandomForestClassifier,
        EstimatorKind::ExtraTreesClassifier,
        EstimatorKind::GbdtClassifier,
        EstimatorKind::RandomForestRegressor,
        EstimatorKind::ExtraTreesRegressor,
        EstimatorKind::GbdtRegressor,
    ];

    /// Task solved by this kind.
    #[must_use]
    pub fn task(self) -> Task {
        match self {
            EstimatorKind::RandomForestClassifier
            | EstimatorKind::ExtraTreesClassifier
            | EstimatorKind::GbdtClassifier => Task::Classification,
            EstimatorKind::RandomForestRegressor
            | EstimatorKind::ExtraTreesRegressor
            | EstimatorKind::GbdtRegressor => Task::Regression,
        }
    }

    /// The backend that builds models of this kind.
    #[must_use]
    pub fn backend(self) -> Arc<dyn Backend> {
        let task = self.task();
        match self {
            EstimatorKind::RandomForestClassifier | EstimatorKind::RandomForestRegressor => {
                Arc::new(ForestBackend::new(ForestFamily::RandomForest, task))
            }
            EstimatorKind::ExtraTreesClassifier | EstimatorKind::ExtraTreesRegressor => {
                Arc::new(ForestBackend::new(ForestFamily::ExtraTrees, task))
            }
            EstimatorKind::GbdtClassifier | EstimatorKind::GbdtRegressor => {
                Arc::new(BoostingBackend::new(task))
            }
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One named, configured estimator.
///
/// The name identifies the estimator in logs and derives its cache file.
///
/// ```
/// use thicket::{EstimatorDescriptor, EstimatorKind};
///
/// let desc: EstimatorDescriptor = serde_json::from_str(
///     r#"{"kind": "RandomForestClassifier", "name": "rf", "params": {"n_estimators": 10}}"#,
/// )
/// .unwrap();
/// assert_eq!(desc.kind, EstimatorKind::RandomForestClassifier);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorDescriptor {
    /// Estimator family.
    pub kind: EstimatorKind,
    /// Identifier, unique within a cascade layer.
    pub name: String,
    /// Hyperparameters handed to the family's constructor.
    #[serde(default)]
    pub params: Params,
}

impl EstimatorDescriptor {
    /// Describe an estimator.
    #[must_use]
    pub fn new(kind: EstimatorKind, name: impl Into<String>, params: Params) -> Self {
        Self {
            kind,
            name: name.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_by_kind() {
        let classifiers = EstimatorKind::ALL
            .iter()
            .filter(|k| k.task() == Task::Classification)
            .count();
        assert_eq!(classifiers, 3);
    }

    #[test]
    fn backend_matches_kind_task() {
        for kind in EstimatorKind::ALL {
            assert_eq!(kind.backend().task(), kind.task(), "{kind}");
        }
    }

    #[test]
    fn aliases_deserialize() {
        let kind: EstimatorKind =
            serde_json::from_str("\"CompletelyRandomForestClassifier\"").unwrap();
        assert_eq!(kind, EstimatorKind::ExtraTreesClassifier);
    }

    #[test]
    fn params_default_to_empty() {
        let desc: EstimatorDescriptor =
            serde_json::from_str(r#"{"kind": "GbdtRegressor", "name": "gb"}"#).unwrap();
        assert!(desc.params.is_empty());
    }
}
