//! Cluster a stack of matrices stored in a .npy file
//!
//! Reads a 3-D `f32` array of shape `(n, rows, cols)`, runs matrix k-means and
//! writes the centroids `(k, rows, cols)` and the assignments `(n,)` to .npy
//! files.
//!
//! Usage: `cluster-matrices <input.npy> <centroids.npy> <assignments.npy> <k> <tolerance> <device> [max_iters]`
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use matkmeans_rs::{Device, FitRequest, MatrixKMeans, ObservationSet};
use ndarray::Array1;
use std::env;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 7 && args.len() != 8 {
        eprintln!(
            "Usage: {} <input.npy> <centroids.npy> <assignments.npy> <k> <tolerance> <device> [max_iters]",
            args[0]
        );
        std::process::exit(1);
    }

    let input_path = &args[1];
    let centroids_path = &args[2];
    let assignments_path = &args[3];
    let k: usize = args[4].parse()?;
    let tolerance: f64 = args[5].parse()?;
    let device: Device = args[6].parse()?;

    let mut request = FitRequest::new(k).with_tolerance(tolerance);
    if let Some(max_iters) = args.get(7) {
        request = request.with_max_iters(max_iters.parse()?);
    }

    let data = ObservationSet::read_npy(input_path)?;
    let (rows, cols) = data.shape();
    tracing::info!(
        n_observations = data.len(),
        rows,
        cols,
        path = %input_path,
        "Loaded observations"
    );

    let mut kmeans = MatrixKMeans::with_request(request, device)?;
    let outcome = kmeans.fit(&data)?;

    if !outcome.is_converged() {
        tracing::warn!(
            iterations = outcome.iterations,
            "Writing results of a fit that did not converge"
        );
    }

    let assignments: Array1<u64> = outcome.assignments.mapv(|a| a as u64);
    ndarray_npy::write_npy(centroids_path, &outcome.centroids)?;
    ndarray_npy::write_npy(assignments_path, &assignments)?;

    tracing::info!(
        num_clusters = outcome.num_clusters(),
        distortion = outcome.distortion,
        centroids = %centroids_path,
        assignments = %assignments_path,
        "Saved results"
    );

    Ok(())
}
