//! The seam between the estimator wrapper and concrete model libraries.

use std::fmt;

use ndarray::{Array2, ArrayView2};
use thicket_trees::{Target, Task};

use crate::batch::Footprint;
use crate::error::ThicketError;
use crate::params::Params;

/// A trainable model owned by an [`crate::Estimator`].
///
/// `predict_proba` must depend on each row alone, so that predicting a
/// matrix in row slices and concatenating equals predicting it whole.
pub trait Model: fmt::Debug + Send + Sync {
    /// Train on `x` and `y`, replacing any previous fit.
    ///
    /// # Errors
    ///
    /// Whatever the underlying library reports.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &Target) -> Result<(), ThicketError>;

    /// `(n_rows, n_outputs)` class probabilities or regression values.
    ///
    /// # Errors
    ///
    /// [`ThicketError::NotFitted`] before `fit`, or a library error.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ThicketError>;

    /// Serialize the model for the disk cache.
    ///
    /// # Errors
    ///
    /// [`ThicketError::EncodeModel`] when serialization fails.
    fn encode(&self) -> Result<Vec<u8>, ThicketError>;

    /// Current progress verbosity, when the model has one.
    fn verbose(&self) -> Option<u8> {
        None
    }

    /// Change progress verbosity. No-op for models without one.
    fn set_verbose(&mut self, _verbose: u8) {}

    /// Prediction memory profile used for the default batch size.
    ///
    /// `None` means the model has no heuristic and predicts in one pass.
    fn footprint(&self) -> Option<Footprint> {
        None
    }
}

/// Builds and restores [`Model`]s of one kind.
pub trait Backend: fmt::Debug + Send + Sync {
    /// Stable identifier recorded in cache files.
    fn id(&self) -> &str;

    /// Task the models solve.
    fn task(&self) -> Task;

    /// A fresh, unfitted model configured from `params`.
    ///
    /// # Errors
    ///
    /// [`ThicketError::InvalidParam`] for ill-typed or out-of-range values.
    fn build(&self, params: &Params) -> Result<Box<dyn Model>, ThicketError>;

    /// Restore a model previously produced by [`Model::encode`].
    ///
    /// # Errors
    ///
    /// A decode error when `bytes` are not a model of this backend.
    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Model>, ThicketError>;
}
