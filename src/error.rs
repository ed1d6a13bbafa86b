//! Error type shared by training, matrix construction and forest assembly.

/// Everything that can go wrong before a forest is ready to answer queries.
///
/// Query-time misuse (a point with the wrong number of features) is not in
/// here: the query functions treat it as a broken caller contract and panic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RbfError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("feature matrix has {got} values, expected {expected}")]
    MatrixShape { expected: usize, got: usize },

    #[error("config declares {field} = {config} but the feature matrix has {matrix}")]
    ConfigMismatch {
        field: &'static str,
        config: usize,
        matrix: usize,
    },

    #[error("dimension mismatch: expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Allocation failed. Callers may retry with a smaller `tree_depth` or
    /// fewer rows instead of taking the process down.
    #[error("could not allocate {requested} elements for {what}")]
    ResourceExhausted { what: &'static str, requested: usize },

    #[error("malformed tree: {0}")]
    InvalidTree(String),
}

/// Allocates a vector of `len` copies of `value`, reporting allocation
/// failure as [`RbfError::ResourceExhausted`].
pub(crate) fn try_filled_vec<T: Clone>(
    what: &'static str,
    len: usize,
    value: T,
) -> Result<Vec<T>, RbfError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| RbfError::ResourceExhausted { what, requested: len })?;
    v.resize(len, value);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RbfError::DimensionMismatch { expected: 784, got: 3 };
        assert_eq!(err.to_string(), "dimension mismatch: expected 784 features, got 3");

        let err = RbfError::ConfigMismatch { field: "num_rows", config: 10, matrix: 9 };
        assert_eq!(err.to_string(), "config declares num_rows = 10 but the feature matrix has 9");
    }

    #[test]
    fn test_try_filled_vec() {
        let v = try_filled_vec("test buffer", 4, 7u32).unwrap();
        assert_eq!(v, vec![7, 7, 7, 7]);

        let err = try_filled_vec("huge buffer", usize::MAX, 0u64).unwrap_err();
        assert!(matches!(err, RbfError::ResourceExhausted { what: "huge buffer", .. }));
    }
}
