use std::path::PathBuf;

use thicket_trees::{Task, TreeError};

/// Errors from estimator wrapping, caching and cascade growth.
#[derive(Debug, thiserror::Error)]
pub enum ThicketError {
    /// A failure inside the underlying model library, surfaced unchanged.
    #[error(transparent)]
    Model(#[from] TreeError),

    /// Returned when a hyperparameter has the wrong type or an invalid value.
    #[error("invalid value for hyperparameter `{key}` of {backend}: expected {expected}, got {got}")]
    InvalidParam {
        /// Backend that rejected the value.
        backend: String,
        /// Hyperparameter name.
        key: String,
        /// Description of what was expected.
        expected: &'static str,
        /// The JSON value that was supplied.
        got: String,
    },

    /// Returned when predicting with neither an in-memory model nor a cache.
    #[error("estimator {name} has not been fitted")]
    NotFitted {
        /// Estimator name.
        name: String,
    },

    /// Returned when the cache directory cannot be created.
    #[error("cannot create cache directory {path}")]
    CacheDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when writing a cached model fails.
    #[error("failed to write cached model to {path}")]
    CacheWrite {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading a cached model fails.
    #[error("failed to read cached model from {path}")]
    CacheRead {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a model cannot be encoded for the cache.
    #[error("failed to encode model {name}")]
    EncodeModel {
        /// Estimator or backend name.
        name: String,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when serialized model bytes do not decode as the backend's model.
    #[error("failed to decode {name} model")]
    DecodeModel {
        /// Backend name.
        name: String,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when a cache file cannot be decoded.
    #[error("failed to decode cache file {path}")]
    DecodeCache {
        /// Path to the cache file.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when a cache file was written by an incompatible format version.
    #[error("incompatible cache version in {path}: expected {expected}, found {found}")]
    IncompatibleCacheVersion {
        /// The format version this build expects.
        expected: u32,
        /// The format version found in the file.
        found: u32,
        /// Path to the cache file.
        path: PathBuf,
    },

    /// Returned when a cache file holds a model from a different backend.
    #[error("cache file {path} holds a {found} model, expected {expected}")]
    CacheBackendMismatch {
        /// Backend of the estimator doing the load.
        expected: String,
        /// Backend recorded in the cache file.
        found: String,
        /// Path to the cache file.
        path: PathBuf,
    },

    /// Returned when a batch yields a different prediction width than the first.
    #[error("batch starting at row {offset} produced {got} columns, expected {expected}")]
    BatchShapeMismatch {
        /// Width established by the first batch.
        expected: usize,
        /// Width of the offending batch.
        got: usize,
        /// First row of the offending batch.
        offset: usize,
    },

    /// Returned when matrices that must be stacked disagree on shape.
    #[error("cannot stack prediction matrices")]
    Shape {
        /// The underlying ndarray error.
        #[from]
        source: ndarray::ShapeError,
    },

    /// Returned when n_folds is zero.
    #[error("n_folds must be at least 1, got {n_folds}")]
    InvalidFoldCount {
        /// The invalid n_folds value provided.
        n_folds: usize,
    },

    /// Returned when a class has fewer samples than the number of folds.
    #[error("class {class} has only {count} samples, need at least {n_folds} for stratified folds")]
    TooFewSamplesForFolds {
        /// The class label with insufficient samples.
        class: usize,
        /// The number of samples belonging to that class.
        count: usize,
        /// The requested number of folds.
        n_folds: usize,
    },

    /// Returned when a dataset has fewer rows than the number of folds.
    #[error("{n_samples} samples cannot be split into {n_folds} folds")]
    TooFewSamples {
        /// Number of rows.
        n_samples: usize,
        /// The requested number of folds.
        n_folds: usize,
    },

    /// Returned when a cascade configuration is invalid.
    #[error("invalid cascade config: {field} {reason}")]
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Returned when a target or matrix does not match the cascade's task or shape.
    #[error("cascade expects {expected} data, got {got}")]
    TaskMismatch {
        /// Task of the configured estimators.
        expected: Task,
        /// Task implied by the supplied target.
        got: Task,
    },

    /// Returned when a matrix has the wrong number of feature columns.
    #[error("input has {got} features, expected {expected}")]
    FeatureMismatch {
        /// Expected column count.
        expected: usize,
        /// Actual column count.
        got: usize,
    },

    /// Returned when the target length differs from the number of rows.
    #[error("target has {n_targets} entries but the feature matrix has {n_samples} rows")]
    TargetLengthMismatch {
        /// Rows in the feature matrix.
        n_samples: usize,
        /// Entries in the target.
        n_targets: usize,
    },

    /// Returned when predicting with a cascade that has no grown layer.
    #[error("cascade has not been fitted")]
    CascadeNotFitted,

    /// Returned when a config file cannot be read.
    #[error("failed to read config from {path}")]
    ReadConfig {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a config file is not valid JSON for [`crate::CascadeConfig`].
    #[error("failed to parse config {path}")]
    ParseConfig {
        /// Path to the config file, or `<inline>` for strings.
        path: PathBuf,
        /// The underlying serde_json error.
        source: serde_json::Error,
    },

    /// Returned when the global tracing subscriber cannot be installed.
    #[error("failed to install the tracing subscriber")]
    Telemetry {
        /// The underlying subscriber error.
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}
