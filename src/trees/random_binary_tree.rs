//! One random binary tree, stored as two packed arrays.
//!
//! Slot `i` of `first`/`second` holds a node of a complete binary tree laid
//! out heap-style (children of `i` at `2i + 1` and `2i + 2`). A slot is either
//! - an internal node: `first` = feature number, `second` = split threshold, or
//! - a leaf: `first` = start and `second` = end offset into `row_index`, both
//!   XOR-ed with [`LEAF_MASK`].
//!
//! The high bit tells them apart (see [`Node::decode`]). Keeping both kinds in
//! the same two `u32` arrays avoids a second pair of large arrays.

use std::ops::Range;

use log::trace;
use rand::Rng;

use crate::common_types::{FeatureValue, LEAF_MASK, Node, RbfConfig, RowId};
use crate::error::{RbfError, try_filled_vec};
use crate::matrix::FeatureMatrix;
use super::partition::partition;
use super::splitter::{FeatureSampler, best_of_subset};

/// How many freshly sampled feature subsets we try before accepting a split
/// that leaves one child empty.
pub const MAX_SPLIT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct RandomBinaryTree {
    /// Permutation of row ids; every leaf is a window into it.
    row_index: Vec<RowId>,
    first: Vec<u32>,
    second: Vec<u32>,
    num_internal_nodes: usize,
    num_leaves: usize,
}

/// The chosen split for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSplit {
    pub feature: usize,
    pub threshold: FeatureValue,
    /// Offset (relative to the node's range) of the first row sent right.
    pub split_position: usize,
}

/// Chooses a feature and threshold for `rows` and partitions `rows` around it.
///
/// A split that leaves either side empty is retried with a new feature
/// sample, up to [`MAX_SPLIT_ATTEMPTS`] times; after that the last
/// (degenerate) split is accepted as is.
pub fn split_node<R: Rng + ?Sized>(
    matrix: &FeatureMatrix,
    rows: &mut [RowId],
    config: &RbfConfig,
    sampler: &mut FeatureSampler,
    rng: &mut R,
) -> NodeSplit {
    let mut split = NodeSplit { feature: 0, threshold: 0, split_position: 0 };
    for attempt in 1..=MAX_SPLIT_ATTEMPTS {
        let candidates = sampler.select_feature_subset(matrix, rows, config.features_to_compare, rng);
        let Some((winner, threshold)) = best_of_subset(&candidates, rows.len() as u32) else {
            break;
        };
        let feature = candidates[winner].feature;
        let split_position = partition(rows, matrix.column(feature), threshold);
        split = NodeSplit { feature, threshold, split_position };

        if split_position != 0 && split_position != rows.len() {
            return split;
        }
        trace!(
            "attempt {}/{}: feature {} at {} does not split {} rows",
            attempt,
            MAX_SPLIT_ATTEMPTS,
            feature,
            threshold,
            rows.len()
        );
    }
    split
}

/// Per-tree state threaded through the recursive build.
struct TreeBuilder<'a, R> {
    matrix: &'a FeatureMatrix,
    config: &'a RbfConfig,
    sampler: FeatureSampler,
    rng: R,
    first: Vec<u32>,
    second: Vec<u32>,
    num_internal_nodes: usize,
    num_leaves: usize,
}

impl<R: Rng> TreeBuilder<'_, R> {
    /// Materialises the node at `pos` for `rows`, which sit at
    /// `row_index[offset..offset + rows.len()]`.
    ///
    /// The two children get disjoint halves of `rows` via `split_at_mut` and
    /// write to distinct array positions.
    fn build_node(&mut self, rows: &mut [RowId], offset: usize, pos: usize, depth: usize) {
        let tree_size = self.first.len();
        if 2 * pos + 2 >= tree_size || rows.len() < self.config.leaf_size {
            let (first, second) = Node::Leaf { start: offset, end: offset + rows.len() }.encode();
            self.first[pos] = first;
            self.second[pos] = second;
            self.num_leaves += 1;
            trace!("leaf at {} (depth {}) holds {} rows", pos, depth, rows.len());
            return;
        }

        let split = split_node(self.matrix, rows, self.config, &mut self.sampler, &mut self.rng);
        let (first, second) = Node::Internal { feature: split.feature, threshold: split.threshold }.encode();
        self.first[pos] = first;
        self.second[pos] = second;
        self.num_internal_nodes += 1;

        let (left, right) = rows.split_at_mut(split.split_position);
        self.build_node(left, offset, 2 * pos + 1, depth + 1);
        self.build_node(right, offset + split.split_position, 2 * pos + 2, depth + 1);
    }
}

impl RandomBinaryTree {
    /// Trains one tree over every row of `matrix`.
    ///
    /// Only allocation can fail; the config is assumed to be validated.
    pub fn build<R: Rng>(matrix: &FeatureMatrix, config: &RbfConfig, rng: R) -> Result<Self, RbfError> {
        let tree_size = config.tree_size();
        let mut row_index = try_filled_vec("row index", config.num_rows, 0 as RowId)?;
        for (i, row) in row_index.iter_mut().enumerate() {
            *row = i as RowId;
        }

        let mut builder = TreeBuilder {
            matrix,
            config,
            sampler: FeatureSampler::new(config.num_features),
            rng,
            first: try_filled_vec("tree_first", tree_size, 0u32)?,
            second: try_filled_vec("tree_second", tree_size, 0u32)?,
            num_internal_nodes: 0,
            num_leaves: 0,
        };
        builder.build_node(&mut row_index, 0, 0, 0);

        Ok(RandomBinaryTree {
            row_index,
            first: builder.first,
            second: builder.second,
            num_internal_nodes: builder.num_internal_nodes,
            num_leaves: builder.num_leaves,
        })
    }

    /// Assembles a tree from already packed arrays, e.g. a hand-written
    /// fixture. Every node reachable from the root is checked: leaves must
    /// lie inside `row_index` and internal nodes must have both children and a
    /// threshold that fits a feature value.
    pub fn from_raw_parts(first: Vec<u32>, second: Vec<u32>, row_index: Vec<RowId>) -> Result<Self, RbfError> {
        if first.len() != second.len() {
            return Err(RbfError::InvalidTree(format!(
                "tree_first has {} slots but tree_second has {}",
                first.len(),
                second.len()
            )));
        }
        if first.is_empty() {
            return Err(RbfError::InvalidTree("a tree needs at least a root slot".into()));
        }

        let mut tree = RandomBinaryTree {
            row_index,
            first,
            second,
            num_internal_nodes: 0,
            num_leaves: 0,
        };
        let mut stack = vec![0usize];
        while let Some(pos) = stack.pop() {
            match tree.node(pos) {
                Node::Internal { .. } => {
                    if tree.second[pos] > FeatureValue::MAX as u32 {
                        return Err(RbfError::InvalidTree(format!(
                            "internal node at {} has threshold {} above {}",
                            pos,
                            tree.second[pos],
                            FeatureValue::MAX
                        )));
                    }
                    if 2 * pos + 2 >= tree.tree_size() {
                        return Err(RbfError::InvalidTree(format!(
                            "internal node at {} has no room for children",
                            pos
                        )));
                    }
                    tree.num_internal_nodes += 1;
                    stack.push(2 * pos + 2);
                    stack.push(2 * pos + 1);
                }
                Node::Leaf { start, end } => {
                    if start > end || end > tree.row_index.len() {
                        return Err(RbfError::InvalidTree(format!(
                            "leaf at {} covers {}..{} but the row index has {} entries",
                            pos,
                            start,
                            end,
                            tree.row_index.len()
                        )));
                    }
                    tree.num_leaves += 1;
                }
            }
        }
        Ok(tree)
    }

    /// Number of slots in each packed array.
    pub fn tree_size(&self) -> usize {
        self.first.len()
    }

    pub fn num_internal_nodes(&self) -> usize {
        self.num_internal_nodes
    }

    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    pub fn num_rows(&self) -> usize {
        self.row_index.len()
    }

    pub fn row_index(&self) -> &[RowId] {
        &self.row_index
    }

    /// Decoded node at array position `pos`.
    #[inline]
    pub fn node(&self, pos: usize) -> Node {
        Node::decode(self.first[pos], self.second[pos])
    }

    /// Descends from the root to the leaf that `point` falls into and returns
    /// its range of row-index positions.
    pub fn leaf_for(&self, point: &[FeatureValue]) -> Range<usize> {
        let mut pos = 0;
        let mut first = self.first[pos];
        while first & LEAF_MASK == 0 {
            pos = if point[first as usize] as u32 <= self.second[pos] {
                2 * pos + 1
            } else {
                2 * pos + 2
            };
            first = self.first[pos];
        }
        let start = (first ^ LEAF_MASK) as usize;
        let end = (self.second[pos] ^ LEAF_MASK) as usize;
        start..end
    }

    /// Row ids in the leaf that `point` falls into.
    #[inline]
    pub fn query(&self, point: &[FeatureValue]) -> &[RowId] {
        &self.row_index[self.leaf_for(point)]
    }

    /// Largest feature number used by a reachable internal node.
    pub(crate) fn max_split_feature(&self) -> Option<usize> {
        let mut max = None;
        let mut stack = vec![0usize];
        while let Some(pos) = stack.pop() {
            if let Node::Internal { feature, .. } = self.node(pos) {
                max = max.max(Some(feature));
                stack.push(2 * pos + 2);
                stack.push(2 * pos + 1);
            }
        }
        max
    }

    /// Every leaf reachable from the root as `(array position, range)`,
    /// left to right.
    pub fn leaves(&self) -> Vec<(usize, Range<usize>)> {
        let mut leaves = Vec::with_capacity(self.num_leaves);
        let mut stack = vec![0usize];
        while let Some(pos) = stack.pop() {
            match self.node(pos) {
                Node::Internal { .. } => {
                    stack.push(2 * pos + 2);
                    stack.push(2 * pos + 1);
                }
                Node::Leaf { start, end } => leaves.push((pos, start..end)),
            }
        }
        leaves
    }
}
