//! Ranking keys for query candidates.

use std::cmp::Ordering;

use num_traits::AsPrimitive;

use crate::common_types::{FeatureValue, RowId};

/// Squared Euclidean distance. Differences are taken in `i64` so unsigned
/// feature values cannot underflow. Only meant as a sort key.
pub fn squared_l2<T: AsPrimitive<i64>>(a: &[T], b: &[T]) -> u64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let diff = x.as_() - y.as_();
            (diff * diff) as u64
        })
        .sum()
}

/// A deduplicated query result waiting to be ranked: the row id, its
/// training feature vector and the query point it is ranked against.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub row: RowId,
    pub reference: Vec<FeatureValue>,
    pub query: &'a [FeatureValue],
}

impl Candidate<'_> {
    pub fn squared_l2(&self) -> u64 {
        squared_l2(self.query, &self.reference)
    }
}

/// Default comparator: ascending squared L2 distance to the query point.
pub fn l2_compare(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.squared_l2().cmp(&b.squared_l2())
}
