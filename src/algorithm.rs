use crate::config::{EmptyClusterPolicy, FitRequest};
use crate::error::KMeansError;
use crate::observation::{unflatten, ObservationSet};
use crate::ops::MatrixOps;
use ndarray::{s, Array1, Array2, Array3, ArrayView2};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// How a fit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// The distortion changed by less than the tolerance
    Converged,
    /// `max_iters` iterations ran without meeting the tolerance
    IterationLimit,
}

/// Result of one k-means fit
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Centroids of shape `(num_clusters, rows, cols)`
    pub centroids: Array3<f32>,

    /// Cluster index per observation, in input order
    pub assignments: Array1<usize>,

    /// Number of iterations that ran
    pub iterations: usize,

    /// Distortion after the last iteration
    pub distortion: f64,

    /// Distortion after each iteration
    pub distortion_history: Vec<f64>,

    pub status: Convergence,

    /// The request that was actually run, with `num_clusters` capped at the
    /// number of observations
    pub request: FitRequest,
}

impl FitOutcome {
    pub fn is_converged(&self) -> bool {
        self.status == Convergence::Converged
    }

    /// Number of clusters in the result
    pub fn num_clusters(&self) -> usize {
        self.request.num_clusters
    }

    /// Split into centroids and assignments
    pub fn into_parts(self) -> (Array3<f32>, Array1<usize>) {
        (self.centroids, self.assignments)
    }

    /// Keep the outcome only if the fit converged.
    ///
    /// # Errors
    ///
    /// Returns [`KMeansError::ConvergenceTimeout`] when the iteration limit
    /// was reached.
    pub fn into_converged(self) -> Result<Self, KMeansError> {
        match self.status {
            Convergence::Converged => Ok(self),
            Convergence::IterationLimit => Err(KMeansError::ConvergenceTimeout {
                iterations: self.iterations,
                distortion: self.distortion,
            }),
        }
    }
}

/// Run Lloyd's algorithm on matrix-valued observations
///
/// Centroids start as the first `num_clusters` observations. Each iteration
/// assigns every observation to its nearest centroid under the Frobenius
/// distance, replaces each centroid by the mean of its members and
/// recomputes the distortion. The loop stops once the distortion moves by
/// less than `request.tolerance`, or after `request.max_iters` iterations.
#[instrument(
    skip_all,
    fields(
        n_observations = data.len(),
        num_clusters = request.num_clusters,
        device = %ops.device()
    )
)]
pub fn lloyd(
    ops: &dyn MatrixOps,
    data: &ObservationSet,
    request: &FitRequest,
) -> Result<FitOutcome, KMeansError> {
    let start = Instant::now();
    request.validate()?;

    let n_observations = data.len();
    if request.num_clusters > n_observations {
        debug!(
            requested = request.num_clusters,
            n_observations, "Cluster count capped at the number of observations"
        );
    }
    let request = request.capped_to(n_observations);
    let k = request.num_clusters;

    let flat = data.flat();
    let mut centroids: Array2<f32> = flat.slice(s![..k, ..]).to_owned();
    let mut assignments = Array1::<usize>::zeros(n_observations);
    let mut distortion = 0.0f64;
    let mut history = Vec::new();
    let mut status = Convergence::IterationLimit;

    for iteration in 1..=request.max_iters {
        let distortion_old = distortion;

        let distances = ops.squared_distances(&flat, &centroids.view())?;
        assignments = ops.argmin(&distances.view())?;

        let means = ops.cluster_means(&flat, &assignments.view(), k)?;
        let empty = means.empty_clusters();
        centroids = means.means;

        let reseeded = !empty.is_empty();
        if reseeded {
            match request.empty_cluster_policy {
                EmptyClusterPolicy::Fail => {
                    return Err(KMeansError::EmptyCluster {
                        cluster: empty[0],
                        iteration,
                    });
                }
                EmptyClusterPolicy::ReseedFarthest => {
                    reseed_farthest(&mut centroids, &flat, &distances.view(), &assignments, &empty);
                    warn!(
                        iteration,
                        n_empty = empty.len(),
                        "Reseeded empty clusters at the farthest observations"
                    );
                }
            }
        }

        distortion = ops.distortion(&flat, &centroids.view(), &assignments.view())?;
        history.push(distortion);
        debug!(iteration, distortion, "k-means iteration");

        // A reseeded centroid has no members yet, so this distortion does
        // not describe the returned centroids
        if !reseeded && (distortion - distortion_old).abs() < request.tolerance {
            status = Convergence::Converged;
            break;
        }
    }

    let iterations = history.len();
    let elapsed = start.elapsed().as_secs_f64();
    match status {
        Convergence::Converged => info!(
            iterations,
            elapsed_s = elapsed,
            device = %ops.device_name(),
            distortion,
            "k-means converged"
        ),
        Convergence::IterationLimit => warn!(
            iterations,
            elapsed_s = elapsed,
            device = %ops.device_name(),
            distortion,
            "k-means stopped at the iteration limit"
        ),
    }

    Ok(FitOutcome {
        centroids: unflatten(centroids, data.shape())?,
        assignments,
        iterations,
        distortion,
        distortion_history: history,
        status,
        request,
    })
}

/// Nearest-centroid assignment of `data` against fixed centroids
pub fn predict_assignments(
    ops: &dyn MatrixOps,
    data: &ArrayView2<f32>,
    centroids: &ArrayView2<f32>,
) -> Result<Array1<usize>, KMeansError> {
    let distances = ops.squared_distances(data, centroids)?;
    ops.argmin(&distances.view())
}

/// Move each empty centroid onto the observation that sat farthest from its
/// assigned centroid at the start of this iteration. Each observation is used
/// at most once; the reseeded centroids pick up members in the next
/// assignment step.
fn reseed_farthest(
    centroids: &mut Array2<f32>,
    flat: &ArrayView2<f32>,
    distances: &ArrayView2<f64>,
    assignments: &Array1<usize>,
    empty: &[usize],
) {
    let mut candidates: Vec<(usize, f64)> = assignments
        .iter()
        .enumerate()
        .map(|(i, &a)| (i, distances[[i, a]]))
        .collect();
    // Farthest first, lower index first among equals
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    for (&cluster, &(observation, _)) in empty.iter().zip(candidates.iter()) {
        centroids.row_mut(cluster).assign(&flat.row(observation));
    }
}
