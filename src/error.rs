use thiserror::Error;

/// Error types for the matkmeans-rs library
#[derive(Error, Debug)]
pub enum KMeansError {
    /// Input data or request parameters are unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An observation does not have the same shape as the first one
    #[error("Invalid shape at observation {index}: expected {expected:?}, got {found:?}")]
    InvalidShape {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// An observation contains NaN or infinity
    #[error("Observation {index} contains a non-finite value")]
    NonFiniteValue { index: usize },

    /// The number of clusters k is invalid (must be > 0)
    #[error("Invalid k value: {0}")]
    InvalidK(String),

    /// A cluster lost all of its observations and the policy forbids recovery
    #[error("Cluster {cluster} received no observations in iteration {iteration}")]
    EmptyCluster { cluster: usize, iteration: usize },

    /// The iteration bound was reached before the distortion settled
    #[error("No convergence after {iterations} iterations (distortion {distortion})")]
    ConvergenceTimeout { iterations: usize, distortion: f64 },

    /// The requested compute device cannot be used
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A device-side operation (allocation, copy, kernel launch) failed
    #[error("Backend failure: {0}")]
    Backend(String),

    /// Reading observations from a `.npy` file failed
    #[error("Failed to read array: {0}")]
    Read(#[from] ndarray_npy::ReadNpyError),

    /// Writing results to a `.npy` file failed
    #[error("Failed to write array: {0}")]
    Write(#[from] ndarray_npy::WriteNpyError),
}
