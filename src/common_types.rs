//! Value types shared by the tree builder and the query engine.

use crate::error::RbfError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a row in the training matrix.
pub type RowId = u32;

/// A single feature value. Features are small unsigned integers.
pub type FeatureValue = u8;

/// Number of distinct feature values, i.e. histogram bins per feature.
pub const NUM_BINS: usize = 256;

/// Bit that marks a packed tree slot as a leaf.
pub const HIGH_BIT: u32 = 31;

/// XOR mask that sets (encodes) or clears (decodes) the leaf bit.
pub const LEAF_MASK: u32 = 1 << HIGH_BIT;

/// Deepest tree we agree to allocate: `2^31` slots per array is already past
/// what the leaf encoding can address.
pub const MAX_TREE_DEPTH: usize = 31;

/// Decoded view of one slot of a packed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// Go left when `point[feature] <= threshold`, right otherwise.
    Internal { feature: usize, threshold: FeatureValue },
    /// Rows `row_index[start..end]` of the owning tree.
    Leaf { start: usize, end: usize },
}

impl Node {
    /// Decodes the `(first, second)` pair stored at one array position.
    ///
    /// The high bit of `first` is the discriminant; real feature numbers and
    /// row offsets stay below `2^31` so they never set it.
    #[inline]
    pub fn decode(first: u32, second: u32) -> Self {
        if first >> HIGH_BIT == 0 {
            Node::Internal {
                feature: first as usize,
                threshold: second as FeatureValue,
            }
        } else {
            Node::Leaf {
                start: (first ^ LEAF_MASK) as usize,
                end: (second ^ LEAF_MASK) as usize,
            }
        }
    }

    /// Packs the node back into its `(first, second)` pair.
    #[inline]
    pub fn encode(self) -> (u32, u32) {
        match self {
            Node::Internal { feature, threshold } => (feature as u32, threshold as u32),
            Node::Leaf { start, end } => ((start as u32) ^ LEAF_MASK, (end as u32) ^ LEAF_MASK),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

/// Training configuration. Immutable once a forest has been built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RbfConfig {
    pub num_trees: usize,
    /// Each tree is stored in arrays of `2^tree_depth` slots.
    pub tree_depth: usize,
    /// Ranges with fewer rows than this become leaves.
    pub leaf_size: usize,
    pub num_rows: usize,
    pub num_features: usize,
    /// Features sampled (without replacement) for every split decision.
    pub features_to_compare: usize,
    /// Seed of the master RNG; every tree derives its own generator from it.
    pub seed: u64,
}

impl RbfConfig {
    pub const DEFAULT_NUM_TREES: usize = 20;
    pub const DEFAULT_LEAF_SIZE: usize = 8;
    pub const DEFAULT_SEED: u64 = 2719;

    /// Builds a configuration for a `num_rows` x `num_features` matrix.
    /// `None` picks the default for that parameter:
    /// - `num_trees`: [`Self::DEFAULT_NUM_TREES`]
    /// - `leaf_size`: [`Self::DEFAULT_LEAF_SIZE`]
    /// - `features_to_compare`: `ceil(sqrt(num_features))`
    /// - `tree_depth`: `ceil(log2(ceil(num_rows / leaf_size))) + 2`, capped at
    ///   [`MAX_TREE_DEPTH`]: the levels needed for that many leaves, one for the
    ///   root and one spare
    ///
    /// The result is validated, so an unusable combination is an error here
    /// rather than a panic during training.
    pub fn new(
        num_rows: usize,
        num_features: usize,
        num_trees: Option<usize>,
        tree_depth: Option<usize>,
        leaf_size: Option<usize>,
        features_to_compare: Option<usize>,
    ) -> Result<Self, RbfError> {
        let leaf_size = leaf_size.unwrap_or(Self::DEFAULT_LEAF_SIZE);
        let config = RbfConfig {
            num_trees: num_trees.unwrap_or(Self::DEFAULT_NUM_TREES),
            tree_depth: tree_depth.unwrap_or_else(|| Self::default_tree_depth(num_rows, leaf_size)),
            leaf_size,
            num_rows,
            num_features,
            features_to_compare: features_to_compare
                .unwrap_or_else(|| Self::default_features_to_compare(num_features)),
            seed: Self::DEFAULT_SEED,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of slots in each of a tree's two packed arrays.
    pub fn tree_size(&self) -> usize {
        1usize << self.tree_depth
    }

    pub fn validate(&self) -> Result<(), RbfError> {
        if self.num_trees == 0 {
            return Err(RbfError::InvalidConfig("num_trees must be at least 1".into()));
        }
        if self.tree_depth == 0 || self.tree_depth > MAX_TREE_DEPTH {
            return Err(RbfError::InvalidConfig(format!(
                "tree_depth must be in 1..={}, got {}",
                MAX_TREE_DEPTH, self.tree_depth
            )));
        }
        if self.leaf_size == 0 {
            return Err(RbfError::InvalidConfig("leaf_size must be at least 1".into()));
        }
        if self.num_features == 0 {
            return Err(RbfError::InvalidConfig("num_features must be at least 1".into()));
        }
        if self.features_to_compare == 0 || self.features_to_compare > self.num_features {
            return Err(RbfError::InvalidConfig(format!(
                "features_to_compare must be in 1..={}, got {}",
                self.num_features, self.features_to_compare
            )));
        }
        // Offsets and feature numbers must leave the leaf bit clear.
        if self.num_rows >= LEAF_MASK as usize {
            return Err(RbfError::InvalidConfig(format!(
                "num_rows must be below 2^{}, got {}",
                HIGH_BIT, self.num_rows
            )));
        }
        if self.num_features >= LEAF_MASK as usize {
            return Err(RbfError::InvalidConfig(format!(
                "num_features must be below 2^{}, got {}",
                HIGH_BIT, self.num_features
            )));
        }
        Ok(())
    }

    fn default_tree_depth(num_rows: usize, leaf_size: usize) -> usize {
        let buckets = num_rows.div_ceil(leaf_size.max(1)).max(1);
        let leaf_levels = (usize::BITS - (buckets - 1).leading_zeros()) as usize;
        (leaf_levels + 2).min(MAX_TREE_DEPTH)
    }

    fn default_features_to_compare(num_features: usize) -> usize {
        ((num_features as f64).sqrt().ceil() as usize).clamp(1, num_features.max(1))
    }
}
