//! Column-major storage of the training features.

use crate::common_types::{FeatureValue, RowId};
use crate::error::RbfError;

/// Transposes a `rows` x `cols` matrix stored as one flat slice, i.e. converts
/// between row-major and column-major layouts.
///
/// # Panics
/// Panics if `input.len() != rows * cols`.
pub fn transpose<T: Copy>(input: &[T], rows: usize, cols: usize) -> Vec<T> {
    assert_eq!(
        input.len(),
        rows * cols,
        "transpose: expected {} x {} = {} values, got {}",
        rows,
        cols,
        rows * cols,
        input.len()
    );
    let mut output = Vec::with_capacity(input.len());
    for j in 0..cols {
        output.extend((0..rows).map(|i| input[i * cols + j]));
    }
    output
}

/// An N x M matrix of feature values stored column-major: all values of
/// feature 0, then all values of feature 1, and so on. Scanning one feature
/// over many rows is then a sequential read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMatrix {
    data: Vec<FeatureValue>,
    num_rows: usize,
    num_features: usize,
}

impl FeatureMatrix {
    pub fn from_column_major(
        data: Vec<FeatureValue>,
        num_rows: usize,
        num_features: usize,
    ) -> Result<Self, RbfError> {
        let expected = num_rows
            .checked_mul(num_features)
            .ok_or(RbfError::MatrixShape { expected: usize::MAX, got: data.len() })?;
        if data.len() != expected {
            return Err(RbfError::MatrixShape { expected, got: data.len() });
        }
        Ok(FeatureMatrix { data, num_rows, num_features })
    }

    /// Takes the usual one-row-after-another layout and transposes it once.
    pub fn from_row_major(
        data: &[FeatureValue],
        num_rows: usize,
        num_features: usize,
    ) -> Result<Self, RbfError> {
        let expected = num_rows
            .checked_mul(num_features)
            .ok_or(RbfError::MatrixShape { expected: usize::MAX, got: data.len() })?;
        if data.len() != expected {
            return Err(RbfError::MatrixShape { expected, got: data.len() });
        }
        Ok(FeatureMatrix {
            data: transpose(data, num_rows, num_features),
            num_rows,
            num_features,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// All values of one feature, indexed by row id.
    #[inline]
    pub fn column(&self, feature: usize) -> &[FeatureValue] {
        let start = feature * self.num_rows;
        &self.data[start..start + self.num_rows]
    }

    #[inline]
    pub fn value(&self, row: RowId, feature: usize) -> FeatureValue {
        self.data[feature * self.num_rows + row as usize]
    }

    /// Gathers the feature vector of one row. This is a strided read, so it
    /// is meant for the few rows that survive a query, not for scans.
    pub fn row(&self, row: RowId) -> Vec<FeatureValue> {
        (0..self.num_features).map(|f| self.value(row, f)).collect()
    }

    pub fn as_column_major(&self) -> &[FeatureValue] {
        &self.data
    }
}
