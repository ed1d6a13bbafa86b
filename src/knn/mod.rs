//! Approximate nearest-neighbor queries against a trained forest.
//!
//! A query point descends every tree to one leaf. The rows in those leaves
//! are the candidates; they can be returned per tree, merged without
//! duplicates, or merged and ranked against the training vectors.

pub mod distance;
pub mod heap_utils;

use std::cmp::Ordering;
use std::collections::HashSet;

use log::debug;
use rayon::prelude::*;

use crate::common_types::{FeatureValue, RowId};
use crate::matrix::FeatureMatrix;
use crate::trees::RandomBinaryForest;
use distance::{Candidate, squared_l2};
use heap_utils::KBestNeighbors;

/// Candidates for one query point, one slice per tree, borrowed straight from
/// the trees' row indexes. Order within a slice is leaf storage order.
#[derive(Debug, Clone)]
pub struct ForestResults<'a> {
    pub tree_results: Vec<&'a [RowId]>,
    /// Sum of the per-tree counts; rows found by several trees count each time.
    pub total_count: usize,
}

impl ForestResults<'_> {
    pub fn tree_counts(&self) -> Vec<usize> {
        self.tree_results.iter().map(|rows| rows.len()).collect()
    }

    /// All candidates, tree by tree.
    pub fn iter(&self) -> impl Iterator<Item = RowId> + '_ {
        self.tree_results.iter().flat_map(|rows| rows.iter().copied())
    }
}

fn assert_point_dimension(forest: &RandomBinaryForest, point: &[FeatureValue]) {
    assert_eq!(
        point.len(),
        forest.config().num_features,
        "query point has {} features but the forest was trained on {}",
        point.len(),
        forest.config().num_features
    );
}

fn assert_batch_dimension(forest: &RandomBinaryForest, points: &[FeatureValue]) -> usize {
    let dim = forest.config().num_features;
    assert_eq!(
        points.len() % dim,
        0,
        "batch of {} values is not a whole number of {}-feature points",
        points.len(),
        dim
    );
    debug!("batch query of {} points", points.len() / dim);
    dim
}

fn assert_reference(forest: &RandomBinaryForest, reference: &FeatureMatrix) {
    assert_eq!(
        (reference.num_rows(), reference.num_features()),
        (forest.config().num_rows, forest.config().num_features),
        "reference matrix shape does not match the training matrix"
    );
}

/// Leaf contents of every tree for `point`. Duplicates across trees are kept.
///
/// # Panics
/// Panics if `point` does not have `num_features` values.
pub fn query_all<'a>(forest: &'a RandomBinaryForest, point: &[FeatureValue]) -> ForestResults<'a> {
    assert_point_dimension(forest, point);
    let tree_results: Vec<&[RowId]> = forest.trees().iter().map(|tree| tree.query(point)).collect();
    let total_count = tree_results.iter().map(|rows| rows.len()).sum();
    ForestResults { tree_results, total_count }
}

/// Unique candidate rows for `point`, in first-seen order: first tree first,
/// leaf order within each tree.
///
/// # Panics
/// Panics if `point` does not have `num_features` values.
pub fn query_dedup(forest: &RandomBinaryForest, point: &[FeatureValue]) -> Vec<RowId> {
    let results = query_all(forest, point);
    let mut seen = HashSet::with_capacity(results.total_count);
    results.iter().filter(|&row| seen.insert(row)).collect()
}

/// [`query_dedup`], then a stable sort with `compare`, so rows that compare
/// equal keep their first-seen order. `reference` supplies each row's
/// feature vector and is normally the training matrix.
///
/// # Panics
/// Panics if `point` has the wrong dimension or `reference` is not shaped
/// like the training matrix.
pub fn query_dedup_sorted<F>(
    forest: &RandomBinaryForest,
    point: &[FeatureValue],
    reference: &FeatureMatrix,
    compare: F,
) -> Vec<RowId>
where
    F: Fn(&Candidate<'_>, &Candidate<'_>) -> Ordering,
{
    assert_reference(forest, reference);
    let mut candidates: Vec<Candidate<'_>> = query_dedup(forest, point)
        .into_iter()
        .map(|row| Candidate { row, reference: reference.row(row), query: point })
        .collect();
    candidates.sort_by(|a, b| compare(a, b));
    candidates.into_iter().map(|c| c.row).collect()
}

/// The `k` unique candidates closest to `point` by squared L2 distance,
/// nearest first. Same result as truncating
/// `query_dedup_sorted(.., l2_compare)` to `k` rows, without sorting them all.
///
/// # Panics
/// Same conditions as [`query_dedup_sorted`].
pub fn query_nearest(
    forest: &RandomBinaryForest,
    point: &[FeatureValue],
    reference: &FeatureMatrix,
    k: usize,
) -> Vec<RowId> {
    assert_reference(forest, reference);
    let mut best = KBestNeighbors::new(k);
    for row in query_dedup(forest, point) {
        best.add(squared_l2(point, &reference.row(row)), row);
    }
    best.into_sorted_points()
}

/// [`query_all`] for each point of a flattened batch, in parallel.
pub fn batch_query_all<'a>(forest: &'a RandomBinaryForest, points: &[FeatureValue]) -> Vec<ForestResults<'a>> {
    let dim = assert_batch_dimension(forest, points);
    points.par_chunks(dim).map(|point| query_all(forest, point)).collect()
}

/// [`query_dedup`] for each point of a flattened batch, in parallel.
pub fn batch_query_dedup(forest: &RandomBinaryForest, points: &[FeatureValue]) -> Vec<Vec<RowId>> {
    let dim = assert_batch_dimension(forest, points);
    points.par_chunks(dim).map(|point| query_dedup(forest, point)).collect()
}

/// [`query_dedup_sorted`] for each point of a flattened batch, in parallel.
pub fn batch_query_dedup_sorted<F>(
    forest: &RandomBinaryForest,
    points: &[FeatureValue],
    reference: &FeatureMatrix,
    compare: F,
) -> Vec<Vec<RowId>>
where
    F: Fn(&Candidate<'_>, &Candidate<'_>) -> Ordering + Sync,
{
    let dim = assert_batch_dimension(forest, points);
    points
        .par_chunks(dim)
        .map(|point| query_dedup_sorted(forest, point, reference, &compare))
        .collect()
}

/// [`query_nearest`] for each point of a flattened batch, in parallel.
pub fn batch_query_nearest(
    forest: &RandomBinaryForest,
    points: &[FeatureValue],
    reference: &FeatureMatrix,
    k: usize,
) -> Vec<Vec<RowId>> {
    let dim = assert_batch_dimension(forest, points);
    points
        .par_chunks(dim)
        .map(|point| query_nearest(forest, point, reference, k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common_types::{LEAF_MASK, RbfConfig};
    use crate::trees::RandomBinaryTree;
    use super::distance::l2_compare;

    /// Two rows, one feature; both trees split feature 0 at 1 and keep row 0
    /// in the right leaf.
    fn two_row_forest() -> RandomBinaryForest {
        // Depth 2: four slots, the root at 0 and its leaves at 1 and 2.
        let config = RbfConfig::new(2, 1, Some(2), Some(2), Some(1), Some(1)).unwrap();
        let tree = || {
            RandomBinaryTree::from_raw_parts(
                vec![0, LEAF_MASK, 1 ^ LEAF_MASK, 0],
                vec![1, 1 ^ LEAF_MASK, 2 ^ LEAF_MASK, 0],
                vec![1, 0],
            )
            .unwrap()
        };
        RandomBinaryForest::from_trees(config, vec![tree(), tree()]).unwrap()
    }

    /// 250 rows x 6 features, trained for real. Within each feature every
    /// row has a different value, so no split is ever degenerate.
    fn trained() -> (FeatureMatrix, RandomBinaryForest) {
        let num_rows = 250;
        let num_features = 6;
        let row_major: Vec<u8> = (0..num_rows * num_features)
            .map(|i| ((i / num_features) * (7 + i % num_features) % 251) as u8)
            .collect();
        let matrix = FeatureMatrix::from_row_major(&row_major, num_rows, num_features).unwrap();
        let config = RbfConfig::new(num_rows, num_features, Some(8), Some(8), Some(6), Some(3))
            .unwrap()
            .with_seed(2719);
        let forest = RandomBinaryForest::train(&matrix, config).unwrap();
        (matrix, forest)
    }

    #[test]
    fn test_two_row_forest_queries() {
        let forest = two_row_forest();

        let results = query_all(&forest, &[6]);
        assert_eq!(results.tree_counts(), vec![1, 1]);
        assert_eq!(results.total_count, 2);
        assert_eq!(results.tree_results, vec![&[0u32][..], &[0u32][..]]);
        assert_eq!(query_dedup(&forest, &[6]), vec![0]);

        assert_eq!(query_dedup(&forest, &[1]), vec![1]);
    }

    #[test]
    #[should_panic(expected = "query point has 2 features")]
    fn test_query_wrong_dimension_panics() {
        query_all(&two_row_forest(), &[1, 2]);
    }

    #[test]
    fn test_query_all_matches_tree_leaves() {
        let (matrix, forest) = trained();
        for row in [0u32, 17, 249] {
            let point = matrix.row(row);
            let results = query_all(&forest, &point);
            assert_eq!(results.tree_results.len(), 8);
            assert_eq!(results.total_count, results.iter().count());
            for (tree, rows) in forest.trees().iter().zip(&results.tree_results) {
                assert_eq!(*rows, &tree.row_index()[tree.leaf_for(&point)]);
            }
            // A training row always lands in its own leaf.
            assert!(results.tree_results.iter().all(|rows| rows.contains(&row)));
        }
    }

    #[test]
    fn test_query_dedup_unique_and_first_seen_order() {
        let (matrix, forest) = trained();
        let point = matrix.row(123);
        let results = query_all(&forest, &point);
        let deduped = query_dedup(&forest, &point);

        let unique: HashSet<RowId> = deduped.iter().copied().collect();
        assert_eq!(unique.len(), deduped.len());
        let all: HashSet<RowId> = results.iter().collect();
        assert_eq!(unique, all);

        let mut expected = Vec::new();
        for row in results.iter() {
            if !expected.contains(&row) {
                expected.push(row);
            }
        }
        assert_eq!(deduped, expected);
    }

    #[test]
    fn test_query_dedup_sorted_by_l2() {
        let (matrix, forest) = trained();
        let point = matrix.row(42);
        let sorted = query_dedup_sorted(&forest, &point, &matrix, l2_compare);

        let mut deduped = query_dedup(&forest, &point);
        assert_eq!(sorted.len(), deduped.len());
        assert_eq!(sorted[0], 42);
        let dists: Vec<u64> = sorted.iter().map(|&r| squared_l2(&point, &matrix.row(r))).collect();
        assert!(dists.windows(2).all(|w| w[0] <= w[1]));

        // Stable: equal keys keep dedup order.
        deduped.sort_by_key(|&r| squared_l2(&point, &matrix.row(r)));
        assert_eq!(sorted, deduped);
    }

    #[test]
    fn test_query_dedup_sorted_custom_comparator() {
        let (matrix, forest) = trained();
        let point = matrix.row(7);
        let by_row_desc = query_dedup_sorted(&forest, &point, &matrix, |a, b| b.row.cmp(&a.row));
        assert!(by_row_desc.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_query_nearest_matches_sorted_prefix() {
        let (matrix, forest) = trained();
        for row in [3u32, 200] {
            let point = matrix.row(row);
            let sorted = query_dedup_sorted(&forest, &point, &matrix, l2_compare);
            for k in [0, 1, 5, sorted.len() + 3] {
                let nearest = query_nearest(&forest, &point, &matrix, k);
                assert_eq!(nearest, sorted[..k.min(sorted.len())].to_vec());
            }
        }
    }

    #[test]
    fn test_batch_queries_match_single_queries() {
        let (matrix, forest) = trained();
        let ids = [5u32, 6, 200];
        let points: Vec<u8> = ids.iter().flat_map(|&r| matrix.row(r)).collect();

        let all = batch_query_all(&forest, &points);
        let dedup = batch_query_dedup(&forest, &points);
        let sorted = batch_query_dedup_sorted(&forest, &points, &matrix, l2_compare);
        let nearest = batch_query_nearest(&forest, &points, &matrix, 4);
        assert_eq!(all.len(), 3);

        for (i, point) in points.chunks(6).enumerate() {
            assert_eq!(all[i].tree_results, query_all(&forest, point).tree_results);
            assert_eq!(dedup[i], query_dedup(&forest, point));
            assert_eq!(sorted[i], query_dedup_sorted(&forest, point, &matrix, l2_compare));
            assert_eq!(nearest[i], query_nearest(&forest, point, &matrix, 4));
        }
    }

    #[test]
    #[should_panic(expected = "not a whole number")]
    fn test_batch_ragged_points_panics() {
        let (_, forest) = trained();
        batch_query_dedup(&forest, &[1, 2, 3, 4, 5, 6, 7]);
    }
}
