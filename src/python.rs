// Python bindings, built with `--features python`.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::common_types::{FeatureValue, RbfConfig, RowId};
use crate::error::RbfError;
use crate::knn::{self, distance::l2_compare};
use crate::matrix::{self, FeatureMatrix};
use crate::trees::RandomBinaryForest;

impl From<RbfError> for PyErr {
    fn from(err: RbfError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// Squared L2 distance between two feature vectors.
#[pyfunction]
#[pyo3(name = "squared_l2")]
fn squared_l2_py(a: Vec<FeatureValue>, b: Vec<FeatureValue>) -> PyResult<u64> {
    if a.len() != b.len() {
        return Err(PyValueError::new_err("Input vectors must have the same length."));
    }
    Ok(crate::knn::distance::squared_l2(&a, &b))
}

/// Transposes a flattened `rows x cols` matrix.
#[pyfunction]
#[pyo3(name = "transpose")]
fn transpose_py(data: Vec<FeatureValue>, rows: usize, cols: usize) -> PyResult<Vec<FeatureValue>> {
    if rows.checked_mul(cols) != Some(data.len()) {
        return Err(PyValueError::new_err(format!(
            "{} values cannot be a {}x{} matrix",
            data.len(),
            rows,
            cols
        )));
    }
    Ok(matrix::transpose(&data, rows, cols))
}

/// A trained forest together with the matrix it was trained on, which the
/// sorted and nearest-neighbor queries use to rank candidates.
#[pyclass(name = "RandomBinaryForest")]
struct PyRandomBinaryForest {
    forest: RandomBinaryForest,
    reference: FeatureMatrix,
}

impl PyRandomBinaryForest {
    fn check_point(&self, point: &[FeatureValue]) -> PyResult<()> {
        Ok(self.forest.check_point(point)?)
    }

    fn check_batch(&self, points: &[FeatureValue]) -> PyResult<()> {
        let dim = self.forest.config().num_features;
        if points.len() % dim != 0 {
            return Err(PyValueError::new_err(format!(
                "batch of {} values is not a whole number of {}-feature points",
                points.len(),
                dim
            )));
        }
        Ok(())
    }
}

#[pymethods]
impl PyRandomBinaryForest {
    /// Trains a forest. `features` is row-major unless `row_major` is false.
    #[new]
    #[pyo3(signature = (
        features,
        num_rows,
        num_features,
        num_trees = None,
        tree_depth = None,
        leaf_size = None,
        features_to_compare = None,
        seed = None,
        row_major = true
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        py: Python<'_>,
        features: Vec<FeatureValue>,
        num_rows: usize,
        num_features: usize,
        num_trees: Option<usize>,
        tree_depth: Option<usize>,
        leaf_size: Option<usize>,
        features_to_compare: Option<usize>,
        seed: Option<u64>,
        row_major: bool,
    ) -> PyResult<Self> {
        let mut config =
            RbfConfig::new(num_rows, num_features, num_trees, tree_depth, leaf_size, features_to_compare)?;
        if let Some(seed) = seed {
            config = config.with_seed(seed);
        }
        let reference = if row_major {
            FeatureMatrix::from_row_major(&features, num_rows, num_features)?
        } else {
            FeatureMatrix::from_column_major(features, num_rows, num_features)?
        };
        let forest = py.allow_threads(|| RandomBinaryForest::train(&reference, config))?;
        Ok(PyRandomBinaryForest { forest, reference })
    }

    #[getter]
    fn num_trees(&self) -> usize {
        self.forest.num_trees()
    }

    #[getter]
    fn tree_depth(&self) -> usize {
        self.forest.config().tree_depth
    }

    #[getter]
    fn leaf_size(&self) -> usize {
        self.forest.config().leaf_size
    }

    #[getter]
    fn features_to_compare(&self) -> usize {
        self.forest.config().features_to_compare
    }

    /// Each tree's leaf contents, one list per tree.
    fn query_all(&self, point: Vec<FeatureValue>) -> PyResult<Vec<Vec<RowId>>> {
        self.check_point(&point)?;
        let results = knn::query_all(&self.forest, &point);
        Ok(results.tree_results.iter().map(|rows| rows.to_vec()).collect())
    }

    fn query_dedup(&self, point: Vec<FeatureValue>) -> PyResult<Vec<RowId>> {
        self.check_point(&point)?;
        Ok(knn::query_dedup(&self.forest, &point))
    }

    /// Unique candidates ordered by squared L2 distance to `point`.
    fn query_dedup_sorted(&self, point: Vec<FeatureValue>) -> PyResult<Vec<RowId>> {
        self.check_point(&point)?;
        Ok(knn::query_dedup_sorted(&self.forest, &point, &self.reference, l2_compare))
    }

    fn query_nearest(&self, point: Vec<FeatureValue>, k: usize) -> PyResult<Vec<RowId>> {
        self.check_point(&point)?;
        Ok(knn::query_nearest(&self.forest, &point, &self.reference, k))
    }

    fn batch_query_all(&self, py: Python<'_>, points: Vec<FeatureValue>) -> PyResult<Vec<Vec<Vec<RowId>>>> {
        self.check_batch(&points)?;
        Ok(py.allow_threads(|| {
            knn::batch_query_all(&self.forest, &points)
                .into_iter()
                .map(|results| results.tree_results.iter().map(|rows| rows.to_vec()).collect())
                .collect()
        }))
    }

    fn batch_query_dedup(&self, py: Python<'_>, points: Vec<FeatureValue>) -> PyResult<Vec<Vec<RowId>>> {
        self.check_batch(&points)?;
        Ok(py.allow_threads(|| knn::batch_query_dedup(&self.forest, &points)))
    }

    fn batch_query_dedup_sorted(&self, py: Python<'_>, points: Vec<FeatureValue>) -> PyResult<Vec<Vec<RowId>>> {
        self.check_batch(&points)?;
        Ok(py.allow_threads(|| knn::batch_query_dedup_sorted(&self.forest, &points, &self.reference, l2_compare)))
    }

    fn batch_query_nearest(&self, py: Python<'_>, points: Vec<FeatureValue>, k: usize) -> PyResult<Vec<Vec<RowId>>> {
        self.check_batch(&points)?;
        Ok(py.allow_threads(|| knn::batch_query_nearest(&self.forest, &points, &self.reference, k)))
    }
}

#[pymodule]
fn random_binary_forest(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(squared_l2_py, m)?)?;
    m.add_function(wrap_pyfunction!(transpose_py, m)?)?;
    m.add_class::<PyRandomBinaryForest>()?;
    Ok(())
}
