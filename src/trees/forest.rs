//! An ensemble of independently trained random binary trees.

use std::time::Instant;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;

use crate::common_types::{FeatureValue, RbfConfig};
use crate::error::RbfError;
use crate::matrix::FeatureMatrix;
use super::random_binary_tree::RandomBinaryTree;

/// Trained forest. Read-only after construction, so any number of threads
/// may query it at once.
#[derive(Debug, Clone)]
pub struct RandomBinaryForest {
    config: RbfConfig,
    trees: Vec<RandomBinaryTree>,
}

impl RandomBinaryForest {
    /// Trains `config.num_trees` trees over `matrix`, one tree per rayon task.
    ///
    /// Each tree draws from its own RNG seeded from a master RNG, so the
    /// result only depends on `config.seed`, not on the thread count.
    pub fn train(matrix: &FeatureMatrix, config: RbfConfig) -> Result<Self, RbfError> {
        config.validate()?;
        if config.num_rows != matrix.num_rows() {
            return Err(RbfError::ConfigMismatch {
                field: "num_rows",
                config: config.num_rows,
                matrix: matrix.num_rows(),
            });
        }
        if config.num_features != matrix.num_features() {
            return Err(RbfError::ConfigMismatch {
                field: "num_features",
                config: config.num_features,
                matrix: matrix.num_features(),
            });
        }

        info!(
            "training {} trees (depth {}, leaf size {}, {} of {} features per split) over {} rows",
            config.num_trees,
            config.tree_depth,
            config.leaf_size,
            config.features_to_compare,
            config.num_features,
            config.num_rows
        );
        let started = Instant::now();

        let mut master = StdRng::seed_from_u64(config.seed);
        let seeds: Vec<u64> = (0..config.num_trees).map(|_| master.next_u64()).collect();

        let trees = seeds
            .into_par_iter()
            .enumerate()
            .map(|(tree_num, seed)| {
                let tree = RandomBinaryTree::build(matrix, &config, StdRng::seed_from_u64(seed))?;
                debug!(
                    "tree {}: {} internal nodes, {} leaves",
                    tree_num,
                    tree.num_internal_nodes(),
                    tree.num_leaves()
                );
                Ok(tree)
            })
            .collect::<Result<Vec<_>, RbfError>>()?;

        info!("finished training {} trees in {:.2?}", trees.len(), started.elapsed());
        Ok(RandomBinaryForest { config, trees })
    }

    /// Wraps trees built elsewhere (for instance by hand in a test). Each tree
    /// must have `config.tree_size()` slots and stay within the config's rows
    /// and features.
    pub fn from_trees(config: RbfConfig, trees: Vec<RandomBinaryTree>) -> Result<Self, RbfError> {
        config.validate()?;
        if trees.len() != config.num_trees {
            return Err(RbfError::ConfigMismatch {
                field: "num_trees",
                config: config.num_trees,
                matrix: trees.len(),
            });
        }
        for (tree_num, tree) in trees.iter().enumerate() {
            if tree.tree_size() != config.tree_size() {
                return Err(RbfError::InvalidTree(format!(
                    "tree {} has {} slots but tree_depth {} needs {}",
                    tree_num,
                    tree.tree_size(),
                    config.tree_depth,
                    config.tree_size()
                )));
            }
            if let Some(feature) = tree.max_split_feature() {
                if feature >= config.num_features {
                    return Err(RbfError::InvalidTree(format!(
                        "tree {} splits on feature {} but there are only {} features",
                        tree_num, feature, config.num_features
                    )));
                }
            }
            if tree.row_index().iter().any(|&row| row as usize >= config.num_rows) {
                return Err(RbfError::InvalidTree(format!(
                    "tree {} refers to rows beyond the {} training rows",
                    tree_num, config.num_rows
                )));
            }
        }
        Ok(RandomBinaryForest { config, trees })
    }

    pub fn config(&self) -> &RbfConfig {
        &self.config
    }

    pub fn trees(&self) -> &[RandomBinaryTree] {
        &self.trees
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Non-panicking version of the dimension check the queries assert.
    pub fn check_point(&self, point: &[FeatureValue]) -> Result<(), RbfError> {
        if point.len() != self.config.num_features {
            return Err(RbfError::DimensionMismatch {
                expected: self.config.num_features,
                got: point.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common_types::RowId;

    fn grid_matrix(num_rows: usize, num_features: usize) -> FeatureMatrix {
        let data = (0..num_rows * num_features)
            .map(|i| ((i * 131 + i / num_rows * 17) % 256) as u8)
            .collect();
        FeatureMatrix::from_column_major(data, num_rows, num_features).unwrap()
    }

    #[test]
    fn test_train_forest() {
        crate::init_test_logger();
        let matrix = grid_matrix(300, 5);
        let config = RbfConfig::new(300, 5, Some(4), Some(7), Some(5), Some(2)).unwrap();
        let forest = RandomBinaryForest::train(&matrix, config).unwrap();

        assert_eq!(forest.num_trees(), 4);
        assert_eq!(forest.config(), &config);
        for tree in forest.trees() {
            assert_eq!(tree.num_rows(), 300);
            assert_eq!(tree.tree_size(), 128);
            let mut next = 0;
            for (_, range) in tree.leaves() {
                assert_eq!(range.start, next);
                next = range.end;
            }
            assert_eq!(next, 300);
        }
    }

    #[test]
    fn test_train_is_deterministic_for_a_seed() {
        let matrix = grid_matrix(120, 4);
        let config = RbfConfig::new(120, 4, Some(3), Some(5), Some(4), Some(2)).unwrap().with_seed(99);
        let a = RandomBinaryForest::train(&matrix, config).unwrap();
        let b = RandomBinaryForest::train(&matrix, config).unwrap();
        for (ta, tb) in a.trees().iter().zip(b.trees()) {
            assert_eq!(ta.row_index(), tb.row_index());
            assert_eq!(ta.leaves(), tb.leaves());
        }
    }

    #[test]
    fn test_train_rejects_mismatched_matrix() {
        let matrix = grid_matrix(10, 3);
        let config = RbfConfig::new(11, 3, Some(1), Some(3), None, None).unwrap();
        assert_eq!(
            RandomBinaryForest::train(&matrix, config).unwrap_err(),
            RbfError::ConfigMismatch { field: "num_rows", config: 11, matrix: 10 }
        );

        let config = RbfConfig::new(10, 2, Some(1), Some(3), None, None).unwrap();
        assert!(matches!(
            RandomBinaryForest::train(&matrix, config),
            Err(RbfError::ConfigMismatch { field: "num_features", .. })
        ));

        let mut config = RbfConfig::new(10, 3, Some(1), Some(3), None, None).unwrap();
        config.features_to_compare = 4;
        assert!(matches!(RandomBinaryForest::train(&matrix, config), Err(RbfError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_trees_validation() {
        let leaf = |s: u32, e: u32| (s ^ crate::LEAF_MASK, e ^ crate::LEAF_MASK);
        let (l0, l1) = leaf(0, 1);
        let (r0, r1) = leaf(1, 2);
        let split_tree = |feature: u32, row_index: Vec<RowId>| {
            RandomBinaryTree::from_raw_parts(vec![feature, l0, r0, 0], vec![1, l1, r1, 0], row_index).unwrap()
        };
        let config = RbfConfig::new(2, 1, Some(1), Some(2), Some(1), Some(1)).unwrap();

        let ok = split_tree(0, vec![0, 1]);
        assert!(RandomBinaryForest::from_trees(config, vec![ok.clone()]).is_ok());
        assert!(matches!(
            RandomBinaryForest::from_trees(config, vec![ok.clone(), ok]),
            Err(RbfError::ConfigMismatch { field: "num_trees", .. })
        ));

        assert!(matches!(
            RandomBinaryForest::from_trees(config, vec![split_tree(3, vec![0, 1])]),
            Err(RbfError::InvalidTree(_))
        ));
        assert!(matches!(
            RandomBinaryForest::from_trees(config, vec![split_tree(0, vec![0, 7])]),
            Err(RbfError::InvalidTree(_))
        ));
    }

    #[test]
    fn test_from_trees_rejects_wrong_tree_size() {
        let (l0, l1) = (crate::LEAF_MASK, 1 ^ crate::LEAF_MASK);
        let (r0, r1) = (1 ^ crate::LEAF_MASK, 2 ^ crate::LEAF_MASK);
        let three_slots = RandomBinaryTree::from_raw_parts(vec![0, l0, r0], vec![1, l1, r1], vec![1, 0]).unwrap();

        let depth_one = RbfConfig::new(2, 1, Some(1), Some(1), Some(1), Some(1)).unwrap();
        assert_eq!(
            RandomBinaryForest::from_trees(depth_one, vec![three_slots.clone()]).unwrap_err(),
            RbfError::InvalidTree("tree 0 has 3 slots but tree_depth 1 needs 2".into())
        );
        let depth_two = RbfConfig::new(2, 1, Some(1), Some(2), Some(1), Some(1)).unwrap();
        assert!(RandomBinaryForest::from_trees(depth_two, vec![three_slots]).is_err());
    }

    #[test]
    fn test_check_point() {
        let config = RbfConfig::new(2, 3, Some(1), Some(1), Some(1), None).unwrap();
        let (f, s) = (crate::LEAF_MASK, 2 ^ crate::LEAF_MASK);
        let tree = RandomBinaryTree::from_raw_parts(vec![f, 0], vec![s, 0], vec![0, 1]).unwrap();
        let forest = RandomBinaryForest::from_trees(config, vec![tree]).unwrap();
        assert!(forest.check_point(&[1, 2, 3]).is_ok());
        assert_eq!(
            forest.check_point(&[1, 2]),
            Err(RbfError::DimensionMismatch { expected: 3, got: 2 })
        );
    }
}
