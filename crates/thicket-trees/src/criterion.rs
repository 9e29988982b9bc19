use crate::target::Target;

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Criterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    Entropy,
    /// Variance of the target (regression).
    SquaredError,
}

impl Criterion {
    /// Impurity of a node from its class counts.
    ///
    /// Returns 0.0 when `n_samples` is zero. Meaningless for
    /// [`Criterion::SquaredError`], which is computed from moments instead.
    #[must_use]
    pub fn class_impurity(&self, class_counts: &[usize], n_samples: usize) -> f64 {
        if n_samples == 0 {
            return 0.0;
        }
        let n = n_samples as f64;
        match self {
            Criterion::Gini => {
                1.0 - class_counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum::<f64>()
            }
            Criterion::Entropy => -class_counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            Criterion::SquaredError => 0.0,
        }
    }
}

/// Incrementally maintained node statistics.
///
/// Split search moves samples from a right accumulator into a left one and
/// asks both for their impurity after every move.
pub(crate) trait Accumulator: Clone {
    /// An accumulator over the same target with no samples.
    fn empty(&self) -> Self;
    fn add(&mut self, sample: usize);
    fn remove(&mut self, sample: usize);
    fn count(&self) -> usize;
    fn impurity(&self) -> f64;
    /// Value stored in a leaf: class distribution, or `[mean]`.
    fn leaf_value(&self) -> Vec<f64>;
}

/// Class histogram over borrowed labels.
#[derive(Debug, Clone)]
pub(crate) struct ClassCounts<'a> {
    labels: &'a [usize],
    counts: Vec<usize>,
    n: usize,
    criterion: Criterion,
}

impl<'a> ClassCounts<'a> {
    pub(crate) fn new(labels: &'a [usize], n_classes: usize, criterion: Criterion) -> Self {
        Self {
            labels,
            counts: vec![0; n_classes],
            n: 0,
            criterion,
        }
    }
}

impl Accumulator for ClassCounts<'_> {
    fn empty(&self) -> Self {
        Self::new(self.labels, self.counts.len(), self.criterion)
    }

    fn add(&mut self, sample: usize) {
        self.counts[self.labels[sample]] += 1;
        self.n += 1;
    }

    fn remove(&mut self, sample: usize) {
        self.counts[self.labels[sample]] -= 1;
        self.n -= 1;
    }

    fn count(&self) -> usize {
        self.n
    }

    fn impurity(&self) -> f64 {
        self.criterion.class_impurity(&self.counts, self.n)
    }

    fn leaf_value(&self) -> Vec<f64> {
        let total = self.n.max(1) as f64;
        self.counts.iter().map(|&c| c as f64 / total).collect()
    }
}

/// First and second moments over borrowed regression values.
#[derive(Debug, Clone)]
pub(crate) struct Moments<'a> {
    values: &'a [f64],
    sum: f64,
    sum_sq: f64,
    n: usize,
}

impl<'a> Moments<'a> {
    pub(crate) fn new(values: &'a [f64]) -> Self {
        Self {
            values,
            sum: 0.0,
            sum_sq: 0.0,
            n: 0,
        }
    }
}

impl Accumulator for Moments<'_> {
    fn empty(&self) -> Self {
        Self::new(self.values)
    }

    fn add(&mut self, sample: usize) {
        let v = self.values[sample];
        self.sum += v;
        self.sum_sq += v * v;
        self.n += 1;
    }

    fn remove(&mut self, sample: usize) {
        let v = self.values[sample];
        self.sum -= v;
        self.sum_sq -= v * v;
        self.n -= 1;
    }

    fn count(&self) -> usize {
        self.n
    }

    fn impurity(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let n = self.n as f64;
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0)
    }

    fn leaf_value(&self) -> Vec<f64> {
        if self.n == 0 {
            return vec![0.0];
        }
        vec![self.sum / self.n as f64]
    }
}

/// Statistics for the target kind, dispatched once per tree.
#[derive(Debug, Clone)]
pub(crate) enum NodeStats<'a> {
    Classes(ClassCounts<'a>),
    Values(Moments<'a>),
}

impl<'a> NodeStats<'a> {
    pub(crate) fn for_target(target: &'a Target, criterion: Criterion) -> Self {
        match target {
            Target::Classes { labels, n_classes } => {
                NodeStats::Classes(ClassCounts::new(labels, *n_classes, criterion))
            }
            Target::Values(values) => NodeStats::Values(Moments::new(values)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gini_pure() {
        let imp = Criterion::Gini.class_impurity(&[10, 0, 0], 10);
        assert!(imp.abs() < f64::EPSILON);
    }

    #[test]
    fn gini_binary_balanced() {
        let imp = Criterion::Gini.class_impurity(&[5, 5], 10);
        assert!((imp - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn entropy_binary_balanced() {
        let imp = Criterion::Entropy.class_impurity(&[5, 5], 10);
        assert!((imp - 2.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn class_counts_move_between_sides() {
        let labels = [0, 1, 1, 0];
        let mut right = ClassCounts::new(&labels, 2, Criterion::Gini);
        for i in 0..4 {
            right.add(i);
        }
        let mut left = right.empty();
        left.add(0);
        right.remove(0);
        assert_eq!(left.count(), 1);
        assert_eq!(right.count(), 3);
        assert_eq!(left.leaf_value(), vec![1.0, 0.0]);
        assert!(left.impurity().abs() < f64::EPSILON);
    }

    #[test]
    fn moments_variance_and_mean() {
        let values = [1.0, 3.0];
        let mut m = Moments::new(&values);
        m.add(0);
        m.add(1);
        assert!((m.impurity() - 1.0).abs() < 1e-12);
        assert_eq!(m.leaf_value(), vec![2.0]);
        m.remove(1);
        assert!(m.impurity().abs() < 1e-12);
    }
}
