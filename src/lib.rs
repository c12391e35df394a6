//! # matkmeans-rs
//!
//! Batched k-means clustering of matrix-valued observations, on the CPU or on
//! a CUDA GPU.
//!
//! Every data point is a `rows x cols` matrix. Observations are compared with
//! the Frobenius norm and grouped with Lloyd's algorithm until the total
//! distortion (sum of squared Frobenius distances to the assigned centroids)
//! stops changing by more than a tolerance.
//!
//! ## Features
//!
//! - **Deterministic initialization**: centroids start as the first
//!   `num_clusters` observations, so equal inputs give equal results
//! - **Pluggable backends**: the loop is written against [`MatrixOps`];
//!   [`CpuOps`] uses rayon, `CudaOps` uses cuBLAS and NVRTC kernels
//! - **Bounded iteration**: `max_iters` caps the loop and the outcome says
//!   whether the fit converged
//! - **Explicit empty-cluster policy**: reseed at the farthest observation or fail
//!
//! ## Example
//!
//! ```rust
//! use matkmeans_rs::{Device, MatrixKMeans, ObservationSet};
//! use ndarray::Array3;
//!
//! // 100 observations of 4x5 matrices
//! let data = Array3::from_shape_fn((100, 4, 5), |(i, j, k)| ((i % 3) * 10 + j + k) as f32);
//! let data = ObservationSet::from_array(data).unwrap();
//!
//! let mut kmeans = MatrixKMeans::new(3, 1e-4, Device::Cpu).unwrap();
//! let outcome = kmeans.fit(&data).unwrap();
//!
//! assert!(outcome.is_converged());
//! assert_eq!(outcome.centroids.dim(), (3, 4, 5));
//! assert_eq!(outcome.assignments.len(), 100);
//! ```
//!
//! ## Custom Configuration
//!
//! ```rust
//! use matkmeans_rs::{Device, EmptyClusterPolicy, FitRequest, MatrixKMeans, ObservationSet};
//! use ndarray::Array3;
//!
//! let data = ObservationSet::from_array(Array3::ones((20, 3, 3))).unwrap();
//!
//! let request = FitRequest::new(4)
//!     .with_tolerance(1e-6)
//!     .with_max_iters(50)
//!     .with_empty_cluster_policy(EmptyClusterPolicy::ReseedFarthest);
//!
//! let kmeans = MatrixKMeans::with_request(request.clone(), Device::Cpu).unwrap();
//! let outcome = kmeans.fit_with(&request, &data).unwrap();
//! assert_eq!(outcome.assignments.len(), 20);
//! ```
//!
//! ## CUDA
//!
//! ```toml
//! matkmeans-rs = { version = "0.1", features = ["cuda"] }
//! ```
//!
//! Then pass `Device::Cuda(0)` (or parse `"cuda:0"`) when building the engine.

mod algorithm;
mod config;
mod device;
mod distance;
mod error;
mod kmeans;
mod observation;
mod ops;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use algorithm::{Convergence, FitOutcome};
pub use config::{EmptyClusterPolicy, FitRequest};
pub use device::Device;
pub use distance::frobenius_distance;
pub use error::KMeansError;
pub use kmeans::{backend_for, MatrixKMeans};
pub use observation::ObservationSet;
pub use ops::{ClusterMeans, CpuOps, MatrixOps};
