//! Random binary forest: an ensemble of space-partitioning trees over small
//! integer feature vectors, for approximate nearest-neighbor lookups.
//!
//! ```ignore
//! use random_binary_forest::{FeatureMatrix, RbfConfig, knn, train};
//!
//! let matrix = FeatureMatrix::from_row_major(&rows, num_rows, num_features)?;
//! let config = RbfConfig::new(num_rows, num_features, Some(64), Some(20), Some(4), None)?;
//! let forest = train(&matrix, config)?;
//! let neighbors = knn::query_nearest(&forest, &point, &matrix, 10);
//! ```

pub mod common_types;
pub mod error;
pub mod knn;
pub mod matrix;
pub mod trees;

#[cfg(feature = "python")]
mod python;

pub use common_types::{FeatureValue, HIGH_BIT, LEAF_MASK, MAX_TREE_DEPTH, NUM_BINS, Node, RbfConfig, RowId};
pub use error::RbfError;
pub use knn::distance::{Candidate, l2_compare, squared_l2};
pub use knn::{
    ForestResults, batch_query_all, batch_query_dedup, batch_query_dedup_sorted, batch_query_nearest, query_all,
    query_dedup, query_dedup_sorted, query_nearest,
};
pub use matrix::{FeatureMatrix, transpose};
pub use trees::{RandomBinaryForest, RandomBinaryTree};

/// Trains a forest over a column-major feature matrix.
/// Shorthand for [`RandomBinaryForest::train`].
pub fn train(matrix: &FeatureMatrix, config: RbfConfig) -> Result<RandomBinaryForest, RbfError> {
    RandomBinaryForest::train(matrix, config)
}

#[cfg(test)]
pub(crate) fn init_test_logger() {
    use std::sync::Once;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        let _ = env_logger::Builder::from_env(env).is_test(true).try_init();
    });
}
