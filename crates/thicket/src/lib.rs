//! Deep-forest building blocks on top of `thicket-trees`.
//!
//! - [`Estimator`] wraps one model behind a uniform fit / predict interface,
//!   adds an on-disk cache keyed by estimator name, and predicts large inputs
//!   in memory-bounded batches.
//! - [`KFoldEstimator`] trains one estimator per fold and returns
//!   out-of-fold predictions.
//! - [`Cascade`] stacks layers of k-fold estimators, feeding each layer's
//!   predictions to the next, and stops growing when the layer score stops
//!   improving.
//!
//! Model families plug in through the [`Model`] and [`Backend`] traits; the
//! built-in families live in [`adapters`] and are selected by
//! [`EstimatorKind`].

pub mod adapters;
pub mod batch;
pub mod cache;
mod cascade;
mod config;
mod descriptor;
mod error;
mod estimator;
mod kfold;
pub mod metrics;
mod model;
mod params;
pub mod telemetry;

pub use batch::{Footprint, MIN_BATCH_SIZE, forest_batch_size, free_memory};
pub use cache::{CacheEnvelope, CachePolicy};
pub use cascade::{Cascade, CascadeState, LayerReport, StopReason};
pub use config::CascadeConfig;
pub use descriptor::{EstimatorDescriptor, EstimatorKind};
pub use error::ThicketError;
pub use estimator::Estimator;
pub use kfold::{FoldPredictions, KFoldEstimator, fold_assignment};
pub use metrics::Metric;
pub use model::{Backend, Model};
pub use params::{ParamReader, Params};
pub use thicket_trees::{Target, Task};
