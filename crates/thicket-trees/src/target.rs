//! Training targets and the learning task they imply.

use std::fmt;

/// Learning task of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Task {
    /// Predict a class distribution.
    Classification,
    /// Predict a real value.
    Regression,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Classification => f.write_str("classification"),
            Task::Regression => f.write_str("regression"),
        }
    }
}

/// Supervised training target.
///
/// Class labels are zero-based. `n_classes` is carried explicitly so that a
/// subset of rows (a cross-validation fold, a bootstrap sample) still
/// produces models with the full output width.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Class labels in `0..n_classes`.
    Classes {
        /// Label per sample.
        labels: Vec<usize>,
        /// Total number of classes.
        n_classes: usize,
    },
    /// Real-valued regression targets.
    Values(Vec<f64>),
}

impl Target {
    /// Build a classification target, inferring `n_classes` as `max(label) + 1`.
    #[must_use]
    pub fn classes(labels: Vec<usize>) -> Self {
        let n_classes = labels.iter().max().map_or(0, |&m| m + 1);
        Target::Classes { labels, n_classes }
    }

    /// Build a classification target with an explicit class count.
    #[must_use]
    pub fn classes_with(labels: Vec<usize>, n_classes: usize) -> Self {
        Target::Classes { labels, n_classes }
    }

    /// Build a regression target.
    #[must_use]
    pub fn values(values: Vec<f64>) -> Self {
        Target::Values(values)
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Target::Classes { labels, .. } => labels.len(),
            Target::Values(values) => values.len(),
        }
    }

    /// True when the target has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Task implied by the target kind.
    #[must_use]
    pub fn task(&self) -> Task {
        match self {
            Target::Classes { .. } => Task::Classification,
            Target::Values(_) => Task::Regression,
        }
    }

    /// Width of a prediction row: the class count, or 1 for regression.
    #[must_use]
    pub fn n_outputs(&self) -> usize {
        match self {
            Target::Classes { n_classes, .. } => *n_classes,
            Target::Values(_) => 1,
        }
    }

    /// Class labels, if this is a classification target.
    #[must_use]
    pub fn labels(&self) -> Option<&[usize]> {
        match self {
            Target::Classes { labels, .. } => Some(labels),
            Target::Values(_) => None,
        }
    }

    /// Regression values, if this is a regression target.
    #[must_use]
    pub fn as_values(&self) -> Option<&[f64]> {
        match self {
            Target::Classes { .. } => None,
            Target::Values(values) => Some(values),
        }
    }

    /// Select the given rows, keeping the class count.
    #[must_use]
    pub fn select(&self, rows: &[usize]) -> Self {
        match self {
            Target::Classes { labels, n_classes } => Target::Classes {
                labels: rows.iter().map(|&r| labels[r]).collect(),
                n_classes: *n_classes,
            },
            Target::Values(values) => Target::Values(rows.iter().map(|&r| values[r]).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inferred_class_count() {
        let y = Target::classes(vec![0, 2, 1, 2]);
        assert_eq!(y.n_outputs(), 3);
        assert_eq!(y.task(), Task::Classification);
    }

    #[test]
    fn select_keeps_class_count() {
        let y = Target::classes(vec![0, 2, 1, 2]);
        let sub = y.select(&[0, 2]);
        assert_eq!(sub.labels(), Some(&[0, 1][..]));
        assert_eq!(sub.n_outputs(), 3);
    }

    #[test]
    fn regression_has_one_output() {
        let y = Target::values(vec![1.5, -2.0]);
        assert_eq!(y.n_outputs(), 1);
        assert_eq!(y.select(&[1]).as_values(), Some(&[-2.0][..]));
    }
}
