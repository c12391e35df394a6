//! Basic example demonstrating matkmeans-rs usage
//!
//! Run with: cargo run --example basic --release
//! Add `-- cuda:0` together with `--features cuda` to run on a GPU.

use matkmeans_rs::{Device, FitRequest, MatrixKMeans, ObservationSet};
use ndarray::{Array3, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let device: Device = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "cpu".to_string())
        .parse()?;

    println!("=== matkmeans-rs example ===\n");

    // 300 observations of 3x4 matrices around three constant levels
    let n_observations = 300;
    let shape = (3, 4);
    let levels = [-5.0f32, 0.0, 5.0];

    let noise = Array3::random(
        (n_observations, shape.0, shape.1),
        Uniform::new(-1.0f32, 1.0),
    );
    let data = Array3::from_shape_fn((n_observations, shape.0, shape.1), |(i, j, k)| {
        levels[i % levels.len()] + noise[[i, j, k]]
    });
    let data = ObservationSet::from_array(data)?;

    println!(
        "Generated {} observations of shape {:?} on levels {:?}\n",
        data.len(),
        data.shape(),
        levels
    );

    let request = FitRequest::new(levels.len())
        .with_tolerance(1e-6)
        .with_max_iters(100);
    let mut kmeans = MatrixKMeans::with_request(request, device)?;

    println!("Running k-means on {}...\n", kmeans.device_name());
    let outcome = kmeans.fit(&data)?;

    println!(
        "\nStatus: {:?} after {} iterations, distortion {:.4}",
        outcome.status, outcome.iterations, outcome.distortion
    );

    println!("\nLearned centroids (mean entry):");
    for (i, centroid) in outcome.centroids.axis_iter(Axis(0)).enumerate() {
        println!("  Centroid {}: {:.4}", i, centroid.mean().unwrap_or(f32::NAN));
    }

    let mut counts = vec![0usize; outcome.num_clusters()];
    for &a in outcome.assignments.iter() {
        counts[a] += 1;
    }

    println!("\nCluster distribution:");
    for (i, count) in counts.iter().enumerate() {
        println!(
            "  Cluster {}: {} observations ({:.1}%)",
            i,
            count,
            (*count as f64 / n_observations as f64) * 100.0
        );
    }

    println!("\n=== Done! ===");
    Ok(())
}
