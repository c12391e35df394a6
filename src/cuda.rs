//! CUDA backend for matrix k-means
//!
//! Distances use the identity `||x - c||^2 = ||x||^2 + ||c||^2 - 2 x.c` on
//! flattened observations, with the dot products computed by a single cuBLAS
//! GEMM per call. The distance path runs in f64, so finite f32 observations
//! never produce infinite distances. Cluster sums and assigned distances run
//! as NVRTC-compiled kernels; cluster sizes are counted in `unsigned int`.
//! Device buffers live only for the duration of one backend call and
//! are released when their `CudaSlice` handles drop.
//!
//! Enable the `cuda` feature to use this functionality.
//!
//! # Example
//!
//! ```ignore
//! use matkmeans_rs::{Device, MatrixKMeans, ObservationSet};
//! use ndarray::Array3;
//!
//! let data = ObservationSet::from_array(Array3::ones((64, 8, 8))).unwrap();
//! let mut kmeans = MatrixKMeans::new(4, 1e-4, Device::Cuda(0)).unwrap();
//! let outcome = kmeans.fit(&data).unwrap();
//! ```

use crate::device::Device;
use crate::error::KMeansError;
use crate::ops::{check_assignments, check_features, ClusterMeans, MatrixOps};
use cudarc::cublas::sys::cublasOperation_t;
use cudarc::cublas::{CudaBlas, Gemm, GemmConfig};
use cudarc::driver::{
    CudaDevice, CudaFunction, CudaSlice, DeviceRepr, LaunchAsync, LaunchConfig, ValidAsZeroBits,
};
use cudarc::nvrtc::compile_ptx;
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::sync::Arc;

/// CUDA kernels for matrix k-means operations
const CUDA_KERNELS: &str = r#"
extern "C" __global__ void compute_squared_norms(
    const double* data,
    double* norms,
    int n_samples,
    int n_features
) {
    int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n_samples) {
        double sum = 0.0;
        const double* row = data + (long long)idx * n_features;
        for (int j = 0; j < n_features; j++) {
            double val = row[j];
            sum += val * val;
        }
        norms[idx] = sum;
    }
}

extern "C" __global__ void assemble_distances(
    const double* data_norms,
    const double* centroid_norms,
    double* dots,
    int n_samples,
    int n_centroids
) {
    long long idx = (long long)blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < (long long)n_samples * n_centroids) {
        int i = idx / n_centroids;
        int j = idx % n_centroids;
        double dist = data_norms[i] + centroid_norms[j] - 2.0 * dots[idx];
        dots[idx] = dist > 0.0 ? dist : 0.0;
    }
}

extern "C" __global__ void accumulate_cluster_sums(
    const float* data,
    const long long* labels,
    float* cluster_sums,
    unsigned int* cluster_counts,
    int n_samples,
    int n_features,
    int k
) {
    int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n_samples) {
        int cluster_id = (int)labels[idx];
        if (cluster_id >= 0 && cluster_id < k) {
            atomicAdd(&cluster_counts[cluster_id], 1u);
            const float* point = data + (long long)idx * n_features;
            float* centroid_sum = cluster_sums + (long long)cluster_id * n_features;
            for (int j = 0; j < n_features; j++) {
                atomicAdd(&centroid_sum[j], point[j]);
            }
        }
    }
}

extern "C" __global__ void assigned_squared_distances(
    const float* data,
    const float* centroids,
    const long long* labels,
    double* out,
    int n_samples,
    int n_features
) {
    int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n_samples) {
        const float* point = data + (long long)idx * n_features;
        const float* centroid = centroids + labels[idx] * n_features;
        double sum = 0.0;
        for (int j = 0; j < n_features; j++) {
            double d = (double)point[j] - (double)centroid[j];
            sum += d * d;
        }
        out[idx] = sum;
    }
}
"#;

const MODULE_NAME: &str = "matkmeans_kernels";

const KERNEL_NAMES: [&str; 4] = [
    "compute_squared_norms",
    "assemble_distances",
    "accumulate_cluster_sums",
    "assigned_squared_distances",
];

const BLOCK_SIZE: usize = 256;

/// GPU backend bound to one CUDA device
pub struct CudaOps {
    /// Ordinal of the CUDA device
    ordinal: usize,

    /// CUDA device
    device: Arc<CudaDevice>,

    /// cuBLAS handle
    blas: CudaBlas,
}

impl CudaOps {
    /// Initialize the device, compile the kernels and create a cuBLAS handle.
    ///
    /// # Errors
    ///
    /// Returns [`KMeansError::DeviceUnavailable`] if any of these steps fail.
    pub fn new(ordinal: usize) -> Result<Self, KMeansError> {
        let device = CudaDevice::new(ordinal).map_err(|e| {
            KMeansError::DeviceUnavailable(format!(
                "Failed to initialize CUDA device {}: {}",
                ordinal, e
            ))
        })?;

        let ptx = compile_ptx(CUDA_KERNELS).map_err(|e| {
            KMeansError::DeviceUnavailable(format!("Failed to compile CUDA kernels: {}", e))
        })?;

        device
            .load_ptx(ptx, MODULE_NAME, &KERNEL_NAMES)
            .map_err(|e| {
                KMeansError::DeviceUnavailable(format!("Failed to load CUDA module: {}", e))
            })?;

        let blas = CudaBlas::new(device.clone()).map_err(|e| {
            KMeansError::DeviceUnavailable(format!("Failed to create cuBLAS handle: {}", e))
        })?;

        Ok(Self {
            ordinal,
            device,
            blas,
        })
    }

    fn get_func(&self, name: &str) -> Result<CudaFunction, KMeansError> {
        self.device
            .get_func(MODULE_NAME, name)
            .ok_or_else(|| KMeansError::Backend(format!("Failed to get CUDA function: {}", name)))
    }

    fn launch_config(n: usize) -> LaunchConfig {
        let grid_size = n.div_ceil(BLOCK_SIZE).max(1);
        LaunchConfig {
            block_dim: (BLOCK_SIZE as u32, 1, 1),
            grid_dim: (grid_size as u32, 1, 1),
            shared_mem_bytes: 0,
        }
    }

    fn upload_matrix(&self, matrix: &ArrayView2<f32>) -> Result<CudaSlice<f32>, KMeansError> {
        let flat: Vec<f32> = matrix.as_standard_layout().iter().cloned().collect();
        self.device
            .htod_sync_copy(&flat)
            .map_err(|e| KMeansError::Backend(format!("Failed to copy matrix to GPU: {}", e)))
    }

    fn upload_matrix_f64(&self, matrix: &ArrayView2<f32>) -> Result<CudaSlice<f64>, KMeansError> {
        let flat: Vec<f64> = matrix.iter().map(|&v| f64::from(v)).collect();
        self.device
            .htod_sync_copy(&flat)
            .map_err(|e| KMeansError::Backend(format!("Failed to copy matrix to GPU: {}", e)))
    }

    fn upload_labels(&self, assignments: &ArrayView1<usize>) -> Result<CudaSlice<i64>, KMeansError> {
        let labels: Vec<i64> = assignments.iter().map(|&a| a as i64).collect();
        self.device
            .htod_sync_copy(&labels)
            .map_err(|e| KMeansError::Backend(format!("Failed to copy labels to GPU: {}", e)))
    }

    fn alloc_zeros<T: DeviceRepr + ValidAsZeroBits>(
        &self,
        len: usize,
    ) -> Result<CudaSlice<T>, KMeansError> {
        self.device
            .alloc_zeros(len)
            .map_err(|e| KMeansError::Backend(format!("Failed to allocate {} elements: {}", len, e)))
    }

    fn download<T: DeviceRepr>(&self, slice: &CudaSlice<T>) -> Result<Vec<T>, KMeansError> {
        self.device
            .dtoh_sync_copy(slice)
            .map_err(|e| KMeansError::Backend(format!("Failed to copy results from GPU: {}", e)))
    }

    fn squared_norms(
        &self,
        d_data: &CudaSlice<f64>,
        n_rows: usize,
        n_features: usize,
    ) -> Result<CudaSlice<f64>, KMeansError> {
        let mut d_norms = self.alloc_zeros::<f64>(n_rows)?;
        let func = self.get_func("compute_squared_norms")?;

        unsafe {
            func.launch(
                Self::launch_config(n_rows),
                (d_data, &mut d_norms, n_rows as i32, n_features as i32),
            )
        }
        .map_err(|e| KMeansError::Backend(format!("Failed to launch kernel: {}", e)))?;

        Ok(d_norms)
    }
}

impl MatrixOps for CudaOps {
    fn device(&self) -> Device {
        Device::Cuda(self.ordinal)
    }

    fn squared_distances(
        &self,
        data: &ArrayView2<f32>,
        centroids: &ArrayView2<f32>,
    ) -> Result<Array2<f64>, KMeansError> {
        check_features(data, centroids)?;
        let n_samples = data.nrows();
        let n_centroids = centroids.nrows();
        let n_features = data.ncols();

        let d_data = self.upload_matrix_f64(data)?;
        let d_centroids = self.upload_matrix_f64(centroids)?;
        let d_data_norms = self.squared_norms(&d_data, n_samples, n_features)?;
        let d_centroid_norms = self.squared_norms(&d_centroids, n_centroids, n_features)?;
        let mut d_dists = self.alloc_zeros::<f64>(n_samples * n_centroids)?;

        // cuBLAS is column-major: computing centroids^T-op * data gives an
        // (n_centroids x n_samples) column-major result, which is the
        // row-major (n_samples x n_centroids) dot product matrix.
        let gemm_cfg = GemmConfig {
            transa: cublasOperation_t::CUBLAS_OP_T,
            transb: cublasOperation_t::CUBLAS_OP_N,
            m: n_centroids as i32,
            n: n_samples as i32,
            k: n_features as i32,
            alpha: 1.0f64,
            lda: n_features as i32,
            ldb: n_features as i32,
            beta: 0.0f64,
            ldc: n_centroids as i32,
        };

        unsafe { self.blas.gemm(gemm_cfg, &d_centroids, &d_data, &mut d_dists) }
            .map_err(|e| KMeansError::Backend(format!("cuBLAS GEMM failed: {}", e)))?;

        let func = self.get_func("assemble_distances")?;
        unsafe {
            func.launch(
                Self::launch_config(n_samples * n_centroids),
                (
                    &d_data_norms,
                    &d_centroid_norms,
                    &mut d_dists,
                    n_samples as i32,
                    n_centroids as i32,
                ),
            )
        }
        .map_err(|e| KMeansError::Backend(format!("Failed to launch kernel: {}", e)))?;

        let distances = self.download(&d_dists)?;
        Array2::from_shape_vec((n_samples, n_centroids), distances)
            .map_err(|e| KMeansError::Backend(format!("Unexpected distance buffer: {}", e)))
    }

    fn cluster_means(
        &self,
        data: &ArrayView2<f32>,
        assignments: &ArrayView1<usize>,
        k: usize,
    ) -> Result<ClusterMeans, KMeansError> {
        check_assignments(data, assignments, k)?;
        let n_samples = data.nrows();
        let n_features = data.ncols();

        let d_data = self.upload_matrix(data)?;
        let d_labels = self.upload_labels(assignments)?;
        let mut d_sums = self.alloc_zeros::<f32>(k * n_features)?;
        let mut d_counts = self.alloc_zeros::<u32>(k)?;

        let func = self.get_func("accumulate_cluster_sums")?;
        unsafe {
            func.launch(
                Self::launch_config(n_samples),
                (
                    &d_data,
                    &d_labels,
                    &mut d_sums,
                    &mut d_counts,
                    n_samples as i32,
                    n_features as i32,
                    k as i32,
                ),
            )
        }
        .map_err(|e| KMeansError::Backend(format!("Failed to launch kernel: {}", e)))?;

        let sums = self.download(&d_sums)?;
        let counts: Vec<usize> = self
            .download(&d_counts)?
            .into_iter()
            .map(|c| c as usize)
            .collect();

        let mut means = Array2::from_shape_vec((k, n_features), sums)
            .map_err(|e| KMeansError::Backend(format!("Unexpected sums buffer: {}", e)))?;
        for (mut row, &count) in means.rows_mut().into_iter().zip(counts.iter()) {
            if count > 0 {
                row /= count as f32;
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
        let n_samples = data.nrows();

        let d_data = self.upload_matrix(data)?;
        let d_centroids = self.upload_matrix(centroids)?;
        let d_labels = self.upload_labels(assignments)?;
        let mut d_out = self.alloc_zeros::<f64>(n_samples)?;

        let func = self.get_func("assigned_squared_distances")?;
        unsafe {
            func.launch(
                Self::launch_config(n_samples),
                (
                    &d_data,
                    &d_centroids,
                    &d_labels,
                    &mut d_out,
                    n_samples as i32,
                    data.ncols() as i32,
                ),
            )
        }
        .map_err(|e| KMeansError::Backend(format!("Failed to launch kernel: {}", e)))?;

        self.download(&d_out)
    }
}
