use ndarray::ArrayView2;
use rand::Rng;

use crate::criterion::Accumulator;

/// Strategy for choosing split thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitMethod {
    /// Exhaustive scan of every boundary between sorted values (CART).
    Best,
    /// One uniformly drawn threshold per candidate feature (extra-trees).
    Random,
}

/// A chosen split and the partition it induces.
#[derive(Debug, Clone)]
pub(crate) struct Split {
    pub(crate) feature: usize,
    pub(crate) threshold: f64,
    pub(crate) gain: f64,
    pub(crate) left: Vec<usize>,
    pub(crate) right: Vec<usize>,
}

/// Find the best split of `indices` among `max_features` randomly chosen features.
///
/// `parent` must already hold every sample in `indices`. Returns `None` when
/// no candidate feature admits a split that leaves at least
/// `min_samples_leaf` samples on each side.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_split<A: Accumulator>(
    x: ArrayView2<'_, f64>,
    indices: &[usize],
    parent: &A,
    method: SplitMethod,
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<Split> {
    let n_features = x.ncols();
    let n = indices.len();
    if n < 2 || n_features == 0 {
        return None;
    }
    let parent_cost = n as f64 * parent.impurity();

    // Partial Fisher-Yates over feature positions.
    let mut features: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        features.swap(i, j);
    }

    let mut best: Option<(usize, f64, f64)> = None;
    let mut consider = |feature: usize, threshold: f64, gain: f64| {
        if best.is_none_or(|(_, _, g)| gain > g) {
            best = Some((feature, threshold, gain));
        }
    };

    for &feature in &features[..take] {
        match method {
            SplitMethod::Best => {
                let mut sorted: Vec<(f64, usize)> =
                    indices.iter().map(|&i| (x[[i, feature]], i)).collect();
                sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

                let mut left = parent.empty();
                let mut right = parent.clone();
                for k in 0..n - 1 {
                    let (value, sample) = sorted[k];
                    left.add(sample);
                    right.remove(sample);

                    let next = sorted[k + 1].0;
                    if value == next {
                        continue;
                    }
                    let (n_left, n_right) = (k + 1, n - k - 1);
                    if n_left < min_samples_leaf || n_right < min_samples_leaf {
                        continue;
                    }
                    let gain = parent_cost
                        - n_left as f64 * left.impurity()
                        - n_right as f64 * right.impurity();
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    consider(feature, threshold, gain);
                }
            }
            SplitMethod::Random => {
                let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    let v = x[[i, feature]];
                    (lo.min(v), hi.max(v))
                });
                if hi <= lo {
                    continue;
                }
                let threshold = rng.gen_range(lo..hi);
                let mut left = parent.empty();
                let mut right = parent.empty();
                for &i in indices {
                    if x[[i, feature]] <= threshold {
                        left.add(i);
                    } else {
                        right.add(i);
                    }
                }
                if left.count() < min_samples_leaf || right.count() < min_samples_leaf {
                    continue;
                }
                let gain = parent_cost
                    - left.count() as f64 * left.impurity()
                    - right.count() as f64 * right.impurity();
                consider(feature, threshold, gain);
            }
        }
    }

    let (feature, threshold, gain) = best?;
    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

    Some(Split {
        feature,
        threshold,
        gain,
        left,
        right,
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::criterion::{ClassCounts, Criterion, Moments};

    fn full<A: Accumulator>(mut acc: A, n: usize) -> A {
        for i in 0..n {
            acc.add(i);
        }
        acc
    }

    #[test]
    fn separable_data_finds_correct_split() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let labels = [0, 0, 0, 1, 1, 1];
        let parent = full(ClassCounts::new(&labels, 2, Criterion::Gini), 6);
        let indices: Vec<usize> = (0..6).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let split = find_split(x.view(), &indices, &parent, SplitMethod::Best, 1, 1, &mut rng)
            .expect("should find a split");
        assert_eq!(split.feature, 0);
        assert!(split.threshold > 3.0 && split.threshold < 10.0);
        assert_eq!(split.left, vec![0, 1, 2]);
        assert_eq!(split.right, vec![3, 4, 5]);
    }

    #[test]
    fn constant_feature_returns_none() {
        let x = array![[5.0], [5.0], [5.0], [5.0]];
        let labels = [0, 0, 1, 1];
        let parent = full(ClassCounts::new(&labels, 2, Criterion::Gini), 4);
        let indices: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for method in [SplitMethod::Best, SplitMethod::Random] {
            assert!(find_split(x.view(), &indices, &parent, method, 1, 1, &mut rng).is_none());
        }
    }

    #[test]
    fn min_samples_leaf_enforced() {
        let x = array![[1.0], [10.0]];
        let labels = [0, 1];
        let parent = full(ClassCounts::new(&labels, 2, Criterion::Gini), 2);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let result = find_split(x.view(), &[0, 1], &parent, SplitMethod::Best, 1, 2, &mut rng);
        assert!(result.is_none());
    }

    #[test]
    fn random_threshold_lies_inside_range() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let values = [0.0, 0.0, 5.0, 5.0];
        let parent = full(Moments::new(&values), 4);
        let indices: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let split = find_split(x.view(), &indices, &parent, SplitMethod::Random, 1, 1, &mut rng)
            .expect("random split on a non-constant feature");
        assert!(split.threshold >= 0.0 && split.threshold < 3.0);
        assert_eq!(split.left.len() + split.right.len(), 4);
        assert!(split.gain >= 0.0);
    }
}
