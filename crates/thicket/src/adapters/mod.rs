//! [`Backend`](crate::Backend) implementations over `thicket-trees`.
//!
//! Hyperparameter names follow the usual scikit-learn spelling
//! (`n_estimators`, `max_features`, `random_state`, `n_jobs`, ...), so
//! descriptors written for Python forests carry over.

mod boosting;
mod forest;

pub use boosting::{BoostingBackend, BoostingModel};
pub use forest::{ForestBackend, ForestFamily, ForestModel};

use serde_json::Value;
use thicket_trees::MaxFeatures;

use crate::error::ThicketError;
use crate::params::ParamReader;

/// Trees per ensemble when `n_estimators` is absent.
pub const DEFAULT_N_ESTIMATORS: usize = 100;

/// `max_features`: `"sqrt"`, `"log2"`, `"all"`, a count, or a fraction in (0, 1].
fn max_features(r: &mut ParamReader<'_>) -> Result<Option<MaxFeatures>, ThicketError> {
    const EXPECTED: &str = "\"sqrt\", \"log2\", \"all\", a positive integer or a fraction";
    let Some(value) = r.raw("max_features") else {
        return Ok(None);
    };
    let parsed = match value {
        Value::String(s) => match s.as_str() {
            "sqrt" | "auto" => Some(MaxFeatures::Sqrt),
            "log2" => Some(MaxFeatures::Log2),
            "all" | "none" => Some(MaxFeatures::All),
            _ => None,
        },
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(count), _) if count > 0 => usize::try_from(count).ok().map(MaxFeatures::Fixed),
            (None, Some(f)) if f > 0.0 && f <= 1.0 => Some(MaxFeatures::Fraction(f)),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| r.reject("max_features", EXPECTED, value))
}

/// `n_jobs`: a positive thread count, or `-1` for every core.
fn n_jobs(r: &mut ParamReader<'_>) -> Result<Option<usize>, ThicketError> {
    let Some(value) = r.raw("n_jobs") else {
        return Ok(None);
    };
    match value.as_i64() {
        Some(-1) => Ok(None),
        Some(n) if n > 0 => Ok(usize::try_from(n).ok()),
        _ => Err(r.reject("n_jobs", "a positive integer or -1", value)),
    }
}

/// `verbose`, saturated to `u8`.
fn verbose(r: &mut ParamReader<'_>) -> Result<Option<u8>, ThicketError> {
    Ok(r.usize("verbose")?.map(|v| u8::try_from(v).unwrap_or(u8::MAX)))
}
