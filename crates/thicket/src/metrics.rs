//! Layer scoring.

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use thicket_trees::{Target, Task};

/// How a cascade layer's predictions are scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Fraction of rows whose most probable class is the label. Higher is better.
    Accuracy,
    /// Mean squared error of the first output column. Lower is better.
    MeanSquaredError,
}

impl Metric {
    /// The default metric for `task`.
    #[must_use]
    pub fn for_task(task: Task) -> Self {
        match task {
            Task::Classification => Metric::Accuracy,
            Task::Regression => Metric::MeanSquaredError,
        }
    }

    /// Score `predictions` against `y`.
    ///
    /// Returns `NaN` when `y` does not fit the metric (labels for MSE or
    /// values for accuracy) or is empty.
    #[must_use]
    pub fn score(self, predictions: ArrayView2<'_, f64>, y: &Target) -> f64 {
        match (self, y) {
            (Metric::Accuracy, Target::Classes { labels, .. }) => accuracy(predictions, labels),
            (Metric::MeanSquaredError, Target::Values(values)) => {
                mean_squared_error(predictions, values)
            }
            _ => f64::NAN,
        }
    }

    /// True when `candidate` is strictly better than `best`.
    ///
    /// Anything beats "no score yet"; `NaN` never improves.
    #[must_use]
    pub fn improves(self, candidate: f64, best: Option<f64>) -> bool {
        if candidate.is_nan() {
            return false;
        }
        match best {
            None => true,
            Some(best) => match self {
                Metric::Accuracy => candidate > best,
                Metric::MeanSquaredError => candidate < best,
            },
        }
    }
}

/// Fraction of rows whose argmax column equals the label.
#[must_use]
pub fn accuracy(proba: ArrayView2<'_, f64>, labels: &[usize]) -> f64 {
    if labels.is_empty() {
        return f64::NAN;
    }
    let predicted = argmax_rows(proba);
    let correct = predicted
        .iter()
        .zip(labels)
        .filter(|&(&p, &l)| p as usize == l)
        .count();
    correct as f64 / labels.len() as f64
}

/// Mean squared error between column 0 of `pred` and `values`.
#[must_use]
pub fn mean_squared_error(pred: ArrayView2<'_, f64>, values: &[f64]) -> f64 {
    if values.is_empty() || pred.ncols() == 0 {
        return f64::NAN;
    }
    let sum: f64 = pred
        .column(0)
        .iter()
        .zip(values)
        .map(|(p, v)| (p - v).powi(2))
        .sum();
    sum / values.len() as f64
}

/// Index of each row's largest value as `f64`; first index wins ties.
#[must_use]
pub fn argmax_rows(proba: ArrayView2<'_, f64>) -> Array1<f64> {
    proba
        .outer_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
                    if v > bv { (i, v) } else { (bi, bv) }
                })
                .0 as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn accuracy_counts_argmax_hits() {
        let proba = array![[0.9, 0.1], [0.2, 0.8], [0.6, 0.4], [0.5, 0.5]];
        assert!((accuracy(proba.view(), &[0, 1, 1, 0]) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn mse_uses_first_column() {
        let pred = array![[1.0], [3.0]];
        assert!((mean_squared_error(pred.view(), &[0.0, 3.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn improvement_direction() {
        assert!(Metric::Accuracy.improves(0.8, Some(0.7)));
        assert!(!Metric::Accuracy.improves(0.7, Some(0.7)));
        assert!(Metric::MeanSquaredError.improves(0.1, Some(0.2)));
        assert!(!Metric::MeanSquaredError.improves(0.3, Some(0.2)));
        assert!(Metric::MeanSquaredError.improves(5.0, None));
        assert!(!Metric::Accuracy.improves(f64::NAN, None));
    }

    #[test]
    fn mismatched_target_scores_nan() {
        let pred = array![[1.0]];
        assert!(Metric::Accuracy.score(pred.view(), &Target::values(vec![1.0])).is_nan());
    }
}
