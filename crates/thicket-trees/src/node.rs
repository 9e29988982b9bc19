/// A node in a decision tree arena.
///
/// Trees are stored as `Vec<Node>` with children referenced by position,
/// root at index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node. Samples with `row[feature] <= threshold` go left.
    Split {
        /// Feature column used for the split.
        feature: usize,
        /// Split threshold.
        threshold: f64,
        /// Arena index of the left child.
        left: usize,
        /// Arena index of the right child.
        right: usize,
        /// Weighted impurity decrease achieved by this split.
        gain: f64,
    },
    /// A terminal leaf node.
    Leaf {
        /// Class distribution for classification, `[mean]` for regression.
        value: Vec<f64>,
        /// Number of training samples that reached this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return true if this is a leaf node.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub(crate) fn placeholder() -> Self {
        Node::Leaf {
            value: Vec::new(),
            n_samples: 0,
        }
    }
}
