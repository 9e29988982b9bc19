use ndarray::{ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::criterion::{Accumulator, Criterion, NodeStats};
use crate::error::TreeError;
use crate::node::Node;
use crate::split::{SplitMethod, find_split};
use crate::target::{Target, Task};

/// Configuration for a single CART decision tree.
///
/// Construct via [`TreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `criterion`         | `Gini`                |
/// | `split_method`      | `Best`                |
/// | `max_depth`         | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `min_samples_leaf`  | 1                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 42                    |
///
/// Regression targets always use [`Criterion::SquaredError`], whatever
/// `criterion` says.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeConfig {
    pub(crate) criterion: Criterion,
    pub(crate) split_method: SplitMethod,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: Option<usize>,
    pub(crate) seed: u64,
}

impl TreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            criterion: Criterion::Gini,
            split_method: SplitMethod::Best,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }

    /// Set the split quality criterion used for classification.
    #[must_use]
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the threshold selection strategy.
    #[must_use]
    pub fn with_split_method(mut self, split_method: SplitMethod) -> Self {
        self.split_method = split_method;
        self
    }

    /// Set the maximum depth (root is depth 0). `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the number of features examined per split. `None` means all.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the growth limits shared by every tree-based model.
    pub(crate) fn validate_limits(&self) -> Result<(), TreeError> {
        if self.max_depth == Some(0) {
            return Err(TreeError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.min_samples_split < 2 {
            return Err(TreeError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(TreeError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        Ok(())
    }

    /// Train a tree on every row of `x`.
    ///
    /// # Errors
    ///
    /// Input validation errors from [`validate_training`] and
    /// configuration errors ([`TreeError::InvalidMaxDepth`],
    /// [`TreeError::InvalidMinSamplesSplit`], [`TreeError::InvalidMinSamplesLeaf`],
    /// [`TreeError::InvalidMaxFeatures`]).
    #[instrument(skip_all, fields(n_samples = x.nrows(), n_features = x.ncols()))]
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: &Target) -> Result<DecisionTree, TreeError> {
        validate_training(x, y)?;
        self.validate_limits()?;
        let n_features = x.ncols();
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(TreeError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        Ok(grow(self, x, y, (0..x.nrows()).collect(), max_features, &mut rng))
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a training matrix against its target.
///
/// # Errors
///
/// | Variant                            | When                                   |
/// |------------------------------------|----------------------------------------|
/// | [`TreeError::EmptyDataset`]        | `x` has no rows                        |
/// | [`TreeError::ZeroFeatures`]        | `x` has no columns                     |
/// | [`TreeError::TargetLengthMismatch`]| `y.len() != x.nrows()`                 |
/// | [`TreeError::NonFiniteValue`]      | any feature value is NaN or infinite   |
/// | [`TreeError::LabelOutOfRange`]     | a label is `>= n_classes`              |
/// | [`TreeError::NonFiniteTarget`]     | a regression value is NaN or infinite  |
pub fn validate_training(x: ArrayView2<'_, f64>, y: &Target) -> Result<(), TreeError> {
    if x.nrows() == 0 {
        return Err(TreeError::EmptyDataset);
    }
    if x.ncols() == 0 {
        return Err(TreeError::ZeroFeatures);
    }
    if y.len() != x.nrows() {
        return Err(TreeError::TargetLengthMismatch {
            n_samples: x.nrows(),
            n_targets: y.len(),
        });
    }
    for (sample_index, row) in x.outer_iter().enumerate() {
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(TreeError::NonFiniteValue {
                sample_index,
                feature_index,
            });
        }
    }
    match y {
        Target::Classes { labels, n_classes } => {
            if let Some((sample_index, &label)) =
                labels.iter().enumerate().find(|(_, l)| **l >= *n_classes)
            {
                return Err(TreeError::LabelOutOfRange {
                    label,
                    sample_index,
                    n_classes: *n_classes,
                });
            }
        }
        Target::Values(values) => {
            if let Some(sample_index) = values.iter().position(|v| !v.is_finite()) {
                return Err(TreeError::NonFiniteTarget { sample_index });
            }
        }
    }
    Ok(())
}

/// Grow a tree on `indices` (repeats allowed) without validating inputs.
pub(crate) fn grow(
    config: &TreeConfig,
    x: ArrayView2<'_, f64>,
    y: &Target,
    indices: Vec<usize>,
    max_features: usize,
    rng: &mut ChaCha8Rng,
) -> DecisionTree {
    let nodes = match NodeStats::for_target(y, config.criterion) {
        NodeStats::Classes(acc) => grow_with(config, x, acc, indices, max_features, rng),
        NodeStats::Values(acc) => grow_with(config, x, acc, indices, max_features, rng),
    };
    debug!(n_nodes = nodes.len(), "decision tree built");
    DecisionTree {
        nodes,
        n_features: x.ncols(),
        n_outputs: y.n_outputs(),
        task: y.task(),
    }
}

/// Depth-first growth with an explicit stack of pending nodes.
fn grow_with<A: Accumulator>(
    config: &TreeConfig,
    x: ArrayView2<'_, f64>,
    template: A,
    indices: Vec<usize>,
    max_features: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<Node> {
    let mut nodes = vec![Node::placeholder()];
    let mut pending = vec![(0usize, indices, 0usize)];

    while let Some((slot, indices, depth)) = pending.pop() {
        let mut stats = template.empty();
        for &i in &indices {
            stats.add(i);
        }

        let at_limit = config.max_depth.is_some_and(|d| depth >= d)
            || indices.len() < config.min_samples_split
            || stats.impurity() <= f64::EPSILON;
        let split = if at_limit {
            None
        } else {
            find_split(
                x,
                &indices,
                &stats,
                config.split_method,
                max_features,
                config.min_samples_leaf,
                rng,
            )
        };

        match split {
            None => {
                nodes[slot] = Node::Leaf {
                    value: stats.leaf_value(),
                    n_samples: indices.len(),
                };
            }
            Some(split) => {
                let left = nodes.len();
                let right = left + 1;
                nodes.push(Node::placeholder());
                nodes.push(Node::placeholder());
                nodes[slot] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                    gain: split.gain,
                };
                pending.push((right, split.right, depth + 1));
                pending.push((left, split.left, depth + 1));
            }
        }
    }
    nodes
}

/// A fitted CART decision tree.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
    pub(crate) n_outputs: usize,
    pub(crate) task: Task,
}

impl DecisionTree {
    /// Leaf value reached by `row`: a class distribution or `[value]`.
    ///
    /// The caller guarantees `row.len() == n_features`.
    #[must_use]
    pub fn leaf_value(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => at = if row[*feature] <= *threshold { *left } else { *right },
                Node::Leaf { value, .. } => return value,
            }
        }
    }

    /// Leaf value for a single row, with a feature count check.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::PredictionFeatureMismatch`] when the row has the
    /// wrong length.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Result<&[f64], TreeError> {
        if row.len() != self.n_features {
            return Err(TreeError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        Ok(self.leaf_value(row))
    }

    /// Width of the leaf values.
    #[must_use]
    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// Task the tree was trained for.
    #[must_use]
    pub fn task(&self) -> Task {
        self.task
    }

    /// Total number of nodes (splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Maximum depth of the tree; a lone root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((at, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[at] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        deepest
    }
}
