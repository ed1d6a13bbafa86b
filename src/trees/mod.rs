//! Training: split selection, partitioning and the packed tree builder.

pub mod forest;
pub mod partition;
pub mod random_binary_tree;
pub mod splitter;

pub use forest::RandomBinaryForest;
pub use random_binary_tree::{MAX_SPLIT_ATTEMPTS, NodeSplit, RandomBinaryTree, split_node};
