use crate::algorithm::{lloyd, predict_assignments, FitOutcome};
use crate::config::FitRequest;
use crate::device::Device;
use crate::error::KMeansError;
use crate::observation::{flatten, ObservationSet};
use crate::ops::{CpuOps, MatrixOps};
use ndarray::{Array1, Array3};

/// k-means clustering engine for matrix-valued observations.
///
/// Each observation is a `rows x cols` matrix; distances are Frobenius norms.
/// Computation runs on the device chosen at construction.
///
/// # Example
///
/// ```
/// use matkmeans_rs::{Device, MatrixKMeans, ObservationSet};
/// use ndarray::Array2;
///
/// let data = ObservationSet::from_matrices(&[
///     Array2::from_elem((2, 2), 1.0f32),
///     Array2::from_elem((2, 2), 1.1),
///     Array2::from_elem((2, 2), 9.0),
///     Array2::from_elem((2, 2), 9.1),
/// ])
/// .unwrap();
///
/// let mut kmeans = MatrixKMeans::new(2, 0.01, Device::Cpu).unwrap();
/// let (centroids, assignments) = kmeans.fit(&data).unwrap().into_parts();
///
/// assert_eq!(centroids.dim(), (2, 2, 2));
/// assert_eq!(assignments[0], assignments[1]);
/// assert_ne!(assignments[0], assignments[2]);
/// ```
pub struct MatrixKMeans {
    /// Configuration used by [`MatrixKMeans::fit`]
    request: FitRequest,

    /// Backend bound to the engine's device
    ops: Box<dyn MatrixOps>,
}

impl MatrixKMeans {
    /// Create an engine with default iteration bound and empty-cluster policy.
    ///
    /// # Arguments
    ///
    /// * `num_clusters` - Number of clusters
    /// * `tolerance` - Minimum distortion change that keeps the fit iterating
    /// * `device` - Where the computation runs
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be initialized.
    pub fn new(num_clusters: usize, tolerance: f64, device: Device) -> Result<Self, KMeansError> {
        Self::with_request(
            FitRequest::new(num_clusters).with_tolerance(tolerance),
            device,
        )
    }

    /// Create an engine from a full request.
    pub fn with_request(request: FitRequest, device: Device) -> Result<Self, KMeansError> {
        Ok(Self::with_backend(request, backend_for(device)?))
    }

    /// Create an engine over a caller-supplied backend.
    pub fn with_backend(request: FitRequest, ops: Box<dyn MatrixOps>) -> Self {
        Self { request, ops }
    }

    /// Cluster the observations.
    ///
    /// If there are fewer observations than clusters, the engine's cluster
    /// count is permanently reduced to the number of observations.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a cluster empties
    /// under [`EmptyClusterPolicy::Fail`](crate::EmptyClusterPolicy::Fail), or
    /// the backend fails.
    pub fn fit(&mut self, data: &ObservationSet) -> Result<FitOutcome, KMeansError> {
        let outcome = lloyd(self.ops.as_ref(), data, &self.request)?;
        self.request.num_clusters = outcome.request.num_clusters;
        Ok(outcome)
    }

    /// Cluster the observations with an explicit request.
    ///
    /// The engine is left untouched; any reduced cluster count is reported in
    /// `outcome.request`.
    pub fn fit_with(
        &self,
        request: &FitRequest,
        data: &ObservationSet,
    ) -> Result<FitOutcome, KMeansError> {
        lloyd(self.ops.as_ref(), data, request)
    }

    /// Assign observations to the nearest of the given centroids.
    ///
    /// # Errors
    ///
    /// Returns [`KMeansError::InvalidShape`] if the observations do not have
    /// the centroids' matrix shape, or [`KMeansError::InvalidK`] if there are
    /// no centroids.
    pub fn predict(
        &self,
        centroids: &Array3<f32>,
        data: &ObservationSet,
    ) -> Result<Array1<usize>, KMeansError> {
        let (k, rows, cols) = centroids.dim();
        if k == 0 {
            return Err(KMeansError::InvalidK("no centroids to predict with".to_string()));
        }
        if data.shape() != (rows, cols) {
            return Err(KMeansError::InvalidShape {
                index: 0,
                expected: (rows, cols),
                found: data.shape(),
            });
        }

        let centroids = centroids.as_standard_layout();
        predict_assignments(self.ops.as_ref(), &data.flat(), &flatten(centroids.view()))
    }

    /// Replace the convergence tolerance for subsequent fits
    pub fn adjust_tolerance(&mut self, tolerance: f64) {
        self.request.tolerance = tolerance;
    }

    /// Replace the requested cluster count for subsequent fits
    pub fn adjust_num_clusters(&mut self, num_clusters: usize) {
        self.request.num_clusters = num_clusters;
    }

    /// Replace the iteration bound for subsequent fits
    pub fn adjust_max_iters(&mut self, max_iters: usize) {
        self.request.max_iters = max_iters;
    }

    pub fn device(&self) -> Device {
        self.ops.device()
    }

    pub fn device_name(&self) -> String {
        self.ops.device_name()
    }

    pub fn tolerance(&self) -> f64 {
        self.request.tolerance
    }

    pub fn num_clusters(&self) -> usize {
        self.request.num_clusters
    }

    pub fn max_iters(&self) -> usize {
        self.request.max_iters
    }

    /// The request [`MatrixKMeans::fit`] runs with
    pub fn request(&self) -> &FitRequest {
        &self.request
    }
}

/// Build the backend for a device.
///
/// # Errors
///
/// Returns [`KMeansError::DeviceUnavailable`] for CUDA devices when the crate
/// is built without the `cuda` feature or the device fails to initialize.
pub fn backend_for(device: Device) -> Result<Box<dyn MatrixOps>, KMeansError> {
    match device {
        Device::Cpu => Ok(Box::new(CpuOps::new())),
        #[cfg(feature = "cuda")]
        Device::Cuda(ordinal) => Ok(Box::new(crate::cuda::CudaOps::new(ordinal)?)),
        #[cfg(not(feature = "cuda"))]
        Device::Cuda(_) => Err(KMeansError::DeviceUnavailable(format!(
            "{} requested but the crate was built without the `cuda` feature",
            device
        ))),
    }
}
