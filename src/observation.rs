use crate::error::KMeansError;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use std::path::Path;

/// An ordered, uniformly shaped collection of matrix-valued observations.
///
/// Stored as one contiguous `(n, rows, cols)` tensor so that backends can treat
/// each observation as a flat row of `rows * cols` values. Under that view the
/// Frobenius distance between two matrices is the Euclidean distance between
/// their rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSet {
    data: Array3<f32>,
}

impl ObservationSet {
    /// Stack individual matrices into a set.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty, a matrix is empty, shapes differ
    /// or any value is not finite.
    pub fn from_matrices(matrices: &[Array2<f32>]) -> Result<Self, KMeansError> {
        let first = matrices.first().ok_or_else(|| {
            KMeansError::InvalidInput("at least one observation is required".to_string())
        })?;
        let expected = first.dim();

        for (index, matrix) in matrices.iter().enumerate() {
            if matrix.dim() != expected {
                return Err(KMeansError::InvalidShape {
                    index,
                    expected,
                    found: matrix.dim(),
                });
            }
        }

        let views: Vec<ArrayView2<f32>> = matrices.iter().map(|m| m.view()).collect();
        let data = ndarray::stack(Axis(0), &views)
            .map_err(|e| KMeansError::InvalidInput(format!("Failed to stack observations: {}", e)))?;

        Self::from_array(data)
    }

    /// Wrap an existing `(n, rows, cols)` tensor.
    pub fn from_array(data: Array3<f32>) -> Result<Self, KMeansError> {
        let (n, rows, cols) = data.dim();
        if n == 0 {
            return Err(KMeansError::InvalidInput(
                "at least one observation is required".to_string(),
            ));
        }
        if rows == 0 || cols == 0 {
            return Err(KMeansError::InvalidInput(format!(
                "observations must not be empty, got shape ({}, {})",
                rows, cols
            )));
        }

        for (index, matrix) in data.outer_iter().enumerate() {
            if matrix.iter().any(|v| !v.is_finite()) {
                return Err(KMeansError::NonFiniteValue { index });
            }
        }

        // Backends rely on a row-major buffer for the flat view
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };

        Ok(Self { data })
    }

    /// Read a 3-D `f32` array from a `.npy` file.
    pub fn read_npy<P: AsRef<Path>>(path: P) -> Result<Self, KMeansError> {
        let data: Array3<f32> = ndarray_npy::read_npy(path)?;
        Self::from_array(data)
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Whether the set holds no observations
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape `(rows, cols)` shared by every observation
    pub fn shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.data.dim();
        (rows, cols)
    }

    /// Number of values in one observation
    pub fn features(&self) -> usize {
        let (rows, cols) = self.shape();
        rows * cols
    }

    /// The observation at `index`
    pub fn get(&self, index: usize) -> Option<ArrayView2<'_, f32>> {
        (index < self.len()).then(|| self.data.index_axis(Axis(0), index))
    }

    /// The full `(n, rows, cols)` tensor
    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Every observation flattened into one row of an `(n, rows * cols)` view
    pub fn flat(&self) -> ArrayView2<'_, f32> {
        flatten(self.data.view())
    }

    pub fn into_inner(self) -> Array3<f32> {
        self.data
    }
}

/// Flat `(n, rows * cols)` view of a standard-layout tensor.
pub(crate) fn flatten(data: ArrayView3<'_, f32>) -> ArrayView2<'_, f32> {
    let (n, rows, cols) = data.dim();
    match data.into_shape_with_order((n, rows * cols)) {
        Ok(view) => view,
        // Only reachable for non-contiguous input, which constructors rule out
        Err(_) => unreachable!("observation tensors are kept in standard layout"),
    }
}

/// Inverse of [`flatten`] for centroid buffers produced by the backends.
pub(crate) fn unflatten(
    flat: Array2<f32>,
    shape: (usize, usize),
) -> Result<Array3<f32>, KMeansError> {
    let n = flat.nrows();
    let flat = flat.as_standard_layout().into_owned();
    flat.into_shape_with_order((n, shape.0, shape.1))
        .map_err(|e| KMeansError::Backend(format!("Failed to reshape centroids: {}", e)))
}
