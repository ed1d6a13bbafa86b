//! Split selection: per-feature value histograms over a row range and a
//! near-median threshold picked from them.
//!
//! Binning first means choosing a threshold costs O(256) per feature no
//! matter how many rows the range holds.

use rand::Rng;

use crate::common_types::{FeatureValue, NUM_BINS, RowId};
use crate::matrix::FeatureMatrix;

/// Value counts of one feature over a set of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureHistogram {
    pub counts: [u32; NUM_BINS],
    /// `sum(value)` over the rows, equal to `sum(i * counts[i])`.
    pub weighted_sum: u64,
}

impl FeatureHistogram {
    pub fn count(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}

/// Histogram of `feature` over the rows listed in `rows`.
pub fn feature_histogram(matrix: &FeatureMatrix, rows: &[RowId], feature: usize) -> FeatureHistogram {
    let column = matrix.column(feature);
    let mut counts = [0u32; NUM_BINS];
    let mut weighted_sum = 0u64;
    for &row in rows {
        let value = column[row as usize];
        counts[value as usize] += 1;
        weighted_sum += value as u64;
    }
    FeatureHistogram { counts, weighted_sum }
}

/// Result of walking a histogram up to its median bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedianSplit {
    pub split_value: FeatureValue,
    /// Rows with value `<= split_value`.
    pub left_count: u32,
    /// Sum of `|value - (split_value + 0.5)|` over all rows. Not used by the
    /// balance-only heuristic in [`best_of_subset`].
    pub total_moment: f64,
}

/// Walks `bins` from 0 upward until more than `count / 2` rows lie at or
/// below the current bin; that bin is the split value.
///
/// The absolute moment about `split_value + 0.5` comes from the partial left
/// moment and the precomputed `weighted_sum`:
/// `weighted_sum - mid * count + 2 * (mid * left_count - left_moment)`.
pub fn find_median_split(bins: &[u32], weighted_sum: u64, count: u32) -> MedianSplit {
    let half = count / 2;
    let last = bins.len().saturating_sub(1);
    let mut pos = 0usize;
    let mut left_count = bins.first().copied().unwrap_or(0);
    let mut left_moment = 0u64;
    while left_count <= half && pos < last {
        pos += 1;
        left_count += bins[pos];
        left_moment += pos as u64 * bins[pos] as u64;
    }

    let mid = pos as f64 + 0.5;
    let total_moment = weighted_sum as f64 - mid * count as f64
        + 2.0 * (mid * left_count as f64 - left_moment as f64);
    MedianSplit {
        split_value: pos as FeatureValue,
        left_count,
        total_moment,
    }
}

/// A sampled feature together with its histogram over the current range.
#[derive(Debug, Clone)]
pub struct CandidateFeature {
    pub feature: usize,
    pub histogram: FeatureHistogram,
}

/// Picks the candidate whose median split is most balanced, i.e. minimises
/// `|left_count - right_count|`. Ties keep the earliest candidate.
///
/// Returns the index into `candidates` and the split value, or `None` when
/// there are no candidates.
pub fn best_of_subset(candidates: &[CandidateFeature], total_count: u32) -> Option<(usize, FeatureValue)> {
    let mut best: Option<(usize, FeatureValue, i64)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let split = find_median_split(
            &candidate.histogram.counts,
            candidate.histogram.weighted_sum,
            total_count,
        );
        let left = split.left_count as i64;
        let imbalance = (left - (total_count as i64 - left)).abs();
        match best {
            Some((_, _, best_imbalance)) if imbalance >= best_imbalance => {}
            _ => best = Some((i, split.split_value, imbalance)),
        }
    }
    best.map(|(i, value, _)| (i, value))
}

/// Draws distinct features for one split decision.
///
/// Owns the "already selected" markers so they are allocated once per tree
/// and only reset between calls.
#[derive(Debug, Clone)]
pub struct FeatureSampler {
    selected: Vec<bool>,
}

impl FeatureSampler {
    pub fn new(num_features: usize) -> Self {
        FeatureSampler { selected: vec![false; num_features] }
    }

    /// Samples `k` distinct features uniformly at random (rejection sampling
    /// against the markers) and computes each one's histogram over `rows`.
    ///
    /// # Panics
    /// Panics if `k` exceeds the number of features.
    pub fn select_feature_subset<R: Rng + ?Sized>(
        &mut self,
        matrix: &FeatureMatrix,
        rows: &[RowId],
        k: usize,
        rng: &mut R,
    ) -> Vec<CandidateFeature> {
        let num_features = self.selected.len();
        assert!(
            k <= num_features,
            "cannot sample {} distinct features out of {}",
            k,
            num_features
        );
        self.selected.fill(false);

        let mut candidates = Vec::with_capacity(k);
        while candidates.len() < k {
            let feature = rng.gen_range(0..num_features);
            if self.selected[feature] {
                continue;
            }
            self.selected[feature] = true;
            candidates.push(CandidateFeature {
                feature,
                histogram: feature_histogram(matrix, rows, feature),
            });
        }
        candidates
    }
}
