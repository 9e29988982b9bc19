use crate::target::Task;

/// Errors from tree, forest and boosting operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Returned when n_estimators is zero.
    #[error("n_estimators must be at least 1, got {n_estimators}")]
    InvalidEstimatorCount {
        /// The invalid n_estimators value provided.
        n_estimators: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when min_samples_leaf is zero.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf {
        /// The invalid min_samples_leaf value provided.
        min_samples_leaf: usize,
    },

    /// Returned when max_features resolves to 0 or exceeds n_features.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when the boosting learning rate is not strictly positive.
    #[error("learning_rate must be positive and finite, got {learning_rate}")]
    InvalidLearningRate {
        /// The invalid learning rate.
        learning_rate: f64,
    },

    /// Returned when the row subsampling fraction is not in (0.0, 1.0].
    #[error("subsample must be in (0.0, 1.0], got {subsample}")]
    InvalidSubsample {
        /// The invalid fraction.
        subsample: f64,
    },

    /// Returned when n_jobs is zero.
    #[error("n_jobs must be at least 1 when set")]
    InvalidJobCount,

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero feature columns.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when the target length differs from the number of rows.
    #[error("target has {n_targets} entries but the feature matrix has {n_samples} rows")]
    TargetLengthMismatch {
        /// Rows in the feature matrix.
        n_samples: usize,
        /// Entries in the target.
        n_targets: usize,
    },

    /// Returned when a class label is not below the declared class count.
    #[error("label {label} at sample {sample_index} is out of range for {n_classes} classes")]
    LabelOutOfRange {
        /// The offending label.
        label: usize,
        /// Zero-based index of the sample.
        sample_index: usize,
        /// Declared number of classes.
        n_classes: usize,
    },

    /// Returned when a feature value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a regression target is NaN or infinite.
    #[error("non-finite regression target at sample {sample_index}")]
    NonFiniteTarget {
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when the target kind does not match the configured task.
    #[error("model is configured for {expected} but was given a {got} target")]
    TaskMismatch {
        /// Task the model was configured for.
        expected: Task,
        /// Task implied by the target.
        got: Task,
    },

    /// Returned when prediction input has the wrong number of features.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when the scoped rayon pool for n_jobs cannot be built.
    #[error("failed to build a thread pool with {n_jobs} threads")]
    ThreadPool {
        /// Requested thread count.
        n_jobs: usize,
        /// The underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },
}
