//! In-place two-pointer partition of a row range around a feature threshold.

use crate::common_types::{FeatureValue, RowId};

/// Reorders `rows` so that rows whose value in `column` is `<= threshold`
/// come first, and returns the position of the first row that is `>
/// threshold`.
///
/// A range that cannot be split (empty, every value `<= threshold`, or every
/// value `> threshold`) returns 0 and is left untouched. Callers must treat a
/// result of `0` or `rows.len()` as a failed split.
pub fn partition(rows: &mut [RowId], column: &[FeatureValue], threshold: FeatureValue) -> usize {
    if rows.is_empty() {
        return 0;
    }
    let value = |row: RowId| column[row as usize];

    let end = rows.len();
    let mut i = 0;
    let mut j = end - 1;
    loop {
        while i < end && value(rows[i]) <= threshold {
            i += 1;
        }
        while j > 0 && value(rows[j]) > threshold {
            j -= 1;
        }
        if i >= j {
            break;
        }
        rows.swap(i, j);
    }

    // Everything went left: report it as "no split" like the all-right case.
    if i == end { 0 } else { i }
}
