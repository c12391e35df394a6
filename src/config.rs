use crate::error::KMeansError;

/// What to do when a cluster ends an iteration without any observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyClusterPolicy {
    /// Move the empty centroid onto the observation farthest from its own
    /// centroid in the current iteration
    #[default]
    ReseedFarthest,

    /// Abort the fit with [`KMeansError::EmptyCluster`]
    Fail,
}

/// Per-call configuration for one k-means fit
///
/// A fit never mutates the request it is given. When the data holds fewer
/// observations than `num_clusters`, the outcome carries a copy with the
/// reduced cluster count.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRequest {
    /// Number of clusters
    pub num_clusters: usize,

    /// Convergence tolerance. The fit stops once the absolute change in
    /// distortion between two iterations is below this value.
    pub tolerance: f64,

    /// Maximum number of iterations before giving up on convergence
    pub max_iters: usize,

    /// Handling of clusters that receive no observations
    pub empty_cluster_policy: EmptyClusterPolicy,
}

impl Default for FitRequest {
    fn default() -> Self {
        Self {
            num_clusters: 8,
            tolerance: 1e-4,
            max_iters: 300,
            empty_cluster_policy: EmptyClusterPolicy::default(),
        }
    }
}

impl FitRequest {
    /// Create a new request with the specified number of clusters
    pub fn new(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            ..Default::default()
        }
    }

    /// Set the convergence tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the maximum number of iterations
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Set the empty cluster policy
    pub fn with_empty_cluster_policy(mut self, policy: EmptyClusterPolicy) -> Self {
        self.empty_cluster_policy = policy;
        self
    }

    /// Check the parameters that do not depend on the data
    pub fn validate(&self) -> Result<(), KMeansError> {
        if self.num_clusters == 0 {
            return Err(KMeansError::InvalidK(
                "num_clusters must be greater than 0".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(KMeansError::InvalidInput(format!(
                "tolerance must be a finite non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.max_iters == 0 {
            return Err(KMeansError::InvalidInput(
                "max_iters must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy of this request with the cluster count capped at `n_observations`
    pub(crate) fn capped_to(&self, n_observations: usize) -> Self {
        Self {
            num_clusters: self.num_clusters.min(n_observations),
            ..self.clone()
        }
    }
}
