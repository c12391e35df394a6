//! Array operations the k-means loop is written against.
//!
//! Every backend works on flattened observations: an `(n, rows * cols)` view
//! where each row is one matrix. Frobenius distances between matrices are
//! then Euclidean distances between rows.

use crate::device::Device;
use crate::distance::{
    accumulate_clusters, argmin_rows, assigned_squared_distances, pairwise_squared_distances,
};
use crate::error::KMeansError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Per-cluster means together with the number of members behind each mean.
///
/// Rows of `means` whose count is zero are left at zero.
#[derive(Debug, Clone)]
pub struct ClusterMeans {
    pub means: Array2<f32>,
    pub counts: Vec<usize>,
}

impl ClusterMeans {
    /// Indices of clusters without members, in ascending order
    pub fn empty_clusters(&self) -> Vec<usize> {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == 0)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Bulk numeric operations dispatched to one compute device.
pub trait MatrixOps {
    /// Device the operations run on
    fn device(&self) -> Device;

    /// Squared Frobenius distance from every observation to every centroid,
    /// shape `(n_observations, n_centroids)`
    fn squared_distances(
        &self,
        data: &ArrayView2<f32>,
        centroids: &ArrayView2<f32>,
    ) -> Result<Array2<f64>, KMeansError>;

    /// Element-wise mean of the observations assigned to each of `k` clusters
    fn cluster_means(
        &self,
        data: &ArrayView2<f32>,
        assignments: &ArrayView1<usize>,
        k: usize,
    ) -> Result<ClusterMeans, KMeansError>;

    /// Squared distance of every observation to its assigned centroid
    fn assigned_distances(
        &self,
        data: &ArrayView2<f32>,
        centroids: &ArrayView2<f32>,
        assignments: &ArrayView1<usize>,
    ) -> Result<Vec<f64>, KMeansError>;

    /// Index of the nearest centroid per row of a distance matrix.
    /// Ties resolve to the lowest centroid index.
    fn argmin(&self, distances: &ArrayView2<f64>) -> Result<Array1<usize>, KMeansError> {
        Ok(argmin_rows(distances))
    }

    /// Sum of squared distances to the assigned centroids.
    ///
    /// Summed sequentially in f64 so that identical inputs always give the
    /// identical value.
    fn distortion(
        &self,
        data: &ArrayView2<f32>,
        centroids: &ArrayView2<f32>,
        assignments: &ArrayView1<usize>,
    ) -> Result<f64, KMeansError> {
        Ok(self
            .assigned_distances(data, centroids, assignments)?
            .iter()
            .sum())
    }

    /// Human readable device description for log output
    fn device_name(&self) -> String {
        self.device().to_string()
    }
}

/// CPU backend built on ndarray and rayon
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuOps;

impl CpuOps {
    pub fn new() -> Self {
        Self
    }
}

impl MatrixOps for CpuOps {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn squared_distances(
        &self,
        data: &ArrayView2<f32>,
        centroids: &ArrayView2<f32>,
    ) -> Result<Array2<f64>, KMeansError> {
        check_features(data, centroids)?;
        Ok(pairwise_squared_distances(data, centroids))
    }

    fn cluster_means(
        &self,
        data: &ArrayView2<f32>,
        assignments: &ArrayView1<usize>,
        k: usize,
    ) -> Result<ClusterMeans, KMeansError> {
        check_assignments(data, assignments, k)?;

        let (sums, counts) = accumulate_clusters(data, assignments, k);
        let mut means = Array2::<f32>::zeros(sums.dim());
        for (cluster, &count) in counts.iter().enumerate() {
            if count > 0 {
                let count = count as f64;
                means
                    .row_mut(cluster)
                    .iter_mut()
                    .zip(sums.row(cluster).iter())
                    .for_each(|(m, &s)| *m = (s / count) as f32);
            }
        }

        Ok(ClusterMeans { means, counts })
    }

    fn assigned_distances(
        &self,
        data: &ArrayView2<f32>,
        centroids: &ArrayView2<f32>,
        assignments: &ArrayView1<usize>,
    ) -> Result<Vec<f64>, KMeansError> {
        check_features(data, centroids)?;
        check_assignments(data, assignments, centroids.nrows())?;
        Ok(assigned_squared_distances(data, centroids, assignments))
    }
}

/// Observations and centroids must have the same flattened width
pub(crate) fn check_features(
    data: &ArrayView2<f32>,
    centroids: &ArrayView2<f32>,
) -> Result<(), KMeansError> {
    if data.ncols() != centroids.ncols() {
        return Err(KMeansError::InvalidInput(format!(
            "Expected {} values per observation, centroids have {}",
            data.ncols(),
            centroids.ncols()
        )));
    }
    Ok(())
}

/// One assignment per observation, each inside `[0, k)`
pub(crate) fn check_assignments(
    data: &ArrayView2<f32>,
    assignments: &ArrayView1<usize>,
    k: usize,
) -> Result<(), KMeansError> {
    if assignments.len() != data.nrows() {
        return Err(KMeansError::InvalidInput(format!(
            "Expected {} assignments, got {}",
            data.nrows(),
            assignments.len()
        )));
    }
    if let Some(&bad) = assignments.iter().find(|&&a| a >= k) {
        return Err(KMeansError::InvalidInput(format!(
            "Assignment {} is outside [0, {})",
            bad, k
        )));
    }
    Ok(())
}
