use approx::assert_relative_eq;
use matkmeans_rs::{
    frobenius_distance, Convergence, Device, EmptyClusterPolicy, FitRequest, KMeansError,
    MatrixKMeans, ObservationSet,
};
use ndarray::{array, Array2, Array3, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Generate matrix observations around `n_clusters` random centers.
///
/// Observation `i` belongs to center `i % n_clusters`, so the first
/// `n_clusters` observations cover every center once.
fn generate_clustered_matrices(
    n_observations: usize,
    shape: (usize, usize),
    n_clusters: usize,
    seed: u64,
) -> (ObservationSet, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let centers = Array3::random_using(
        (n_clusters, shape.0, shape.1),
        Uniform::new(-10.0f32, 10.0),
        &mut rng,
    );
    let noise = Array3::random_using(
        (n_observations, shape.0, shape.1),
        Uniform::new(-0.5f32, 0.5),
        &mut rng,
    );

    let mut data = Array3::zeros((n_observations, shape.0, shape.1));
    let mut truth = Vec::with_capacity(n_observations);
    for (i, mut observation) in data.outer_iter_mut().enumerate() {
        let cluster = i % n_clusters;
        observation.assign(&(&centers.index_axis(Axis(0), cluster) + &noise.index_axis(Axis(0), i)));
        truth.push(cluster);
    }

    (ObservationSet::from_array(data).unwrap(), truth)
}

fn random_matrices(n: usize, shape: (usize, usize), seed: u64) -> ObservationSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = Array3::random_using((n, shape.0, shape.1), Uniform::new(-1.0f32, 1.0), &mut rng);
    ObservationSet::from_array(data).unwrap()
}

// ============================================================================
// Basic Functionality Tests
// ============================================================================

#[test]
fn test_basic_fit() {
    let data = random_matrices(200, (4, 6), 1);
    let mut kmeans = MatrixKMeans::new(5, 1e-4, Device::Cpu).unwrap();

    let outcome = kmeans.fit(&data).unwrap();

    assert_eq!(outcome.centroids.dim(), (5, 4, 6), "Should have k centroids of observation shape");
    assert_eq!(outcome.assignments.len(), 200, "Should have one assignment per observation");
    for &label in outcome.assignments.iter() {
        assert!(label < 5, "Assignments should be in range [0, k)");
    }
    assert!(outcome.iterations >= 1);
    assert_eq!(outcome.distortion_history.len(), outcome.iterations);
}

#[test]
fn test_two_groups_of_two_by_two_matrices() {
    let data = ObservationSet::from_matrices(&[
        array![[1.0f32, 1.1], [0.9, 1.0]],
        array![[9.0f32, 9.1], [8.9, 9.0]],
        array![[1.1f32, 1.0], [1.0, 0.9]],
        array![[9.1f32, 9.0], [9.0, 8.9]],
    ])
    .unwrap();

    let mut kmeans = MatrixKMeans::new(2, 0.01, Device::Cpu).unwrap();
    let outcome = kmeans.fit(&data).unwrap();

    assert!(outcome.is_converged());
    assert_eq!(outcome.assignments.to_vec(), vec![0, 1, 0, 1]);

    let low = outcome.centroids.index_axis(Axis(0), 0);
    let high = outcome.centroids.index_axis(Axis(0), 1);
    let ones = Array2::from_elem((2, 2), 1.0f32);
    let nines = Array2::from_elem((2, 2), 9.0f32);
    assert!(frobenius_distance(&low, &ones.view()) < 0.2);
    assert!(frobenius_distance(&high, &nines.view()) < 0.2);
}

#[test]
fn test_recovers_synthetic_clusters() {
    let (data, truth) = generate_clustered_matrices(300, (3, 4), 5, 42);
    let mut kmeans = MatrixKMeans::new(5, 1e-6, Device::Cpu).unwrap();

    let outcome = kmeans.fit(&data).unwrap();

    assert!(outcome.is_converged());
    // Initial centroids sit in distinct true clusters, so labels line up
    assert_eq!(outcome.assignments.to_vec(), truth);
}

// ============================================================================
// Convergence Tests
// ============================================================================

#[test]
fn test_distortion_is_non_increasing() {
    let data = random_matrices(150, (3, 3), 7);
    let request = FitRequest::new(6).with_tolerance(1e-9).with_max_iters(200);
    let mut kmeans = MatrixKMeans::with_request(request, Device::Cpu).unwrap();

    let outcome = kmeans.fit(&data).unwrap();
    let history = &outcome.distortion_history;

    assert!(history.len() >= 2);
    for pair in history.windows(2) {
        assert!(
            pair[1] <= pair[0] * (1.0 + 1e-6) + 1e-9,
            "Distortion increased: {} -> {}",
            pair[0],
            pair[1]
        );
    }
    assert!(history.iter().all(|&d| d >= 0.0));
}

#[test]
fn test_single_cluster_converges_in_two_iterations() {
    let data = random_matrices(50, (2, 5), 3);
    let mut kmeans = MatrixKMeans::new(1, 1e-3, Device::Cpu).unwrap();

    let outcome = kmeans.fit(&data).unwrap();

    assert!(outcome.is_converged());
    assert!(outcome.assignments.iter().all(|&a| a == 0));
    // The first distortion is compared against zero, the second against itself
    assert_eq!(outcome.iterations, 2);
    assert_relative_eq!(
        outcome.distortion_history[0],
        outcome.distortion_history[1],
        epsilon = 1e-9
    );

    let mean = data.view().mean_axis(Axis(0)).unwrap();
    let centroid = outcome.centroids.index_axis(Axis(0), 0);
    assert!(frobenius_distance(&centroid, &mean.view()) < 1e-4);
}

#[test]
fn test_zero_tolerance_reaches_iteration_limit() {
    let data = random_matrices(40, (2, 2), 11);
    let request = FitRequest::new(3).with_tolerance(0.0).with_max_iters(15);
    let mut kmeans = MatrixKMeans::with_request(request, Device::Cpu).unwrap();

    let outcome = kmeans.fit(&data).unwrap();

    assert_eq!(outcome.status, Convergence::IterationLimit);
    assert_eq!(outcome.iterations, 15);
    assert!(matches!(
        outcome.into_converged(),
        Err(KMeansError::ConvergenceTimeout { iterations: 15, .. })
    ));
}

#[test]
fn test_high_tolerance_stops_after_first_iteration() {
    let data = random_matrices(60, (2, 2), 5);
    let mut kmeans = MatrixKMeans::new(3, f64::MAX, Device::Cpu).unwrap();

    let outcome = kmeans.fit(&data).unwrap();
    assert_eq!(outcome.iterations, 1);
    assert!(outcome.is_converged());
}

// ============================================================================
// Reproducibility Tests
// ============================================================================

#[test]
fn test_identical_fits_are_identical() {
    let data = random_matrices(120, (4, 4), 99);

    let mut first = MatrixKMeans::new(4, 1e-6, Device::Cpu).unwrap();
    let mut second = MatrixKMeans::new(4, 1e-6, Device::Cpu).unwrap();

    let a = first.fit(&data).unwrap();
    let b = second.fit(&data).unwrap();

    assert_eq!(a.centroids, b.centroids);
    assert_eq!(a.assignments, b.assignments);
    assert_eq!(a.distortion_history, b.distortion_history);
}

#[test]
fn test_initial_centroids_are_leading_observations() {
    let data = random_matrices(30, (2, 3), 8);
    let request = FitRequest::new(4).with_max_iters(1);
    let kmeans = MatrixKMeans::with_request(request.clone(), Device::Cpu).unwrap();

    let outcome = kmeans.fit_with(&request, &data).unwrap();

    // After one iteration each leading observation sits closest to its own seed
    for i in 0..4 {
        assert_eq!(outcome.assignments[i], i);
    }
}

// ============================================================================
// Cluster Count Tests
// ============================================================================

#[test]
fn test_more_clusters_than_observations() {
    let data = random_matrices(3, (2, 2), 21);
    let mut kmeans = MatrixKMeans::new(10, 0.01, Device::Cpu).unwrap();

    let outcome = kmeans.fit(&data).unwrap();

    assert_eq!(outcome.num_clusters(), 3);
    assert_eq!(kmeans.num_clusters(), 3, "Reduction is kept by the engine");
    assert_eq!(outcome.centroids, data.view().to_owned());
    assert_eq!(outcome.assignments.to_vec(), vec![0, 1, 2]);
    assert_eq!(outcome.distortion_history, vec![0.0]);
}

#[test]
fn test_adjust_num_clusters_after_reduction() {
    let small = random_matrices(3, (2, 2), 21);
    let large = random_matrices(50, (2, 2), 22);
    let mut kmeans = MatrixKMeans::new(10, 0.01, Device::Cpu).unwrap();

    kmeans.fit(&small).unwrap();
    assert_eq!(kmeans.num_clusters(), 3);

    kmeans.adjust_num_clusters(6);
    let outcome = kmeans.fit(&large).unwrap();
    assert_eq!(outcome.centroids.dim(), (6, 2, 2));
}

// ============================================================================
// Empty Cluster Tests
// ============================================================================

#[test]
fn test_duplicate_seeds_fail_under_fail_policy() {
    let mut matrices = vec![Array2::from_elem((3, 3), 2.0f32); 2];
    matrices.push(Array2::from_elem((3, 3), 8.0f32));
    matrices.push(Array2::from_elem((3, 3), 8.5f32));
    let data = ObservationSet::from_matrices(&matrices).unwrap();

    let request = FitRequest::new(2).with_empty_cluster_policy(EmptyClusterPolicy::Fail);
    let mut kmeans = MatrixKMeans::with_request(request, Device::Cpu).unwrap();

    assert!(matches!(
        kmeans.fit(&data),
        Err(KMeansError::EmptyCluster { cluster: 1, .. })
    ));
}

#[test]
fn test_duplicate_seeds_recover_under_reseed_policy() {
    let mut matrices = vec![Array2::from_elem((3, 3), 2.0f32); 2];
    matrices.push(Array2::from_elem((3, 3), 8.0f32));
    matrices.push(Array2::from_elem((3, 3), 8.5f32));
    let data = ObservationSet::from_matrices(&matrices).unwrap();

    let mut kmeans = MatrixKMeans::new(2, 1e-6, Device::Cpu).unwrap();
    let outcome = kmeans.fit(&data).unwrap();

    let mut counts = [0usize; 2];
    for &a in outcome.assignments.iter() {
        counts[a] += 1;
    }
    assert_eq!(counts, [2, 2], "Both clusters should end up populated");
}

#[test]
fn test_reseed_when_first_distortion_is_within_tolerance() {
    let matrices: Vec<Array2<f32>> = [1.0f32, 1.0, 1.001, 1.001]
        .iter()
        .map(|&v| Array2::from_elem((1, 1), v))
        .collect();
    let data = ObservationSet::from_matrices(&matrices).unwrap();

    let mut kmeans = MatrixKMeans::new(2, 1e-4, Device::Cpu).unwrap();
    let outcome = kmeans.fit(&data).unwrap();

    assert_eq!(outcome.status, Convergence::Converged);
    assert_eq!(outcome.assignments.to_vec(), vec![0, 0, 1, 1]);

    let labels = kmeans.predict(&outcome.centroids, &data).unwrap();
    assert_eq!(labels, outcome.assignments, "Assignments should match the returned centroids");
}

// ============================================================================
// Numeric Range Tests
// ============================================================================

#[test]
fn test_distances_beyond_f32_range_assign_correctly() {
    let matrices: Vec<Array2<f32>> = [-2e19f32, 2e19, 1e18]
        .iter()
        .map(|&v| Array2::from_elem((1, 1), v))
        .collect();
    let data = ObservationSet::from_matrices(&matrices).unwrap();

    let request = FitRequest::new(2).with_tolerance(0.0).with_max_iters(1);
    let kmeans = MatrixKMeans::with_request(request.clone(), Device::Cpu).unwrap();
    let outcome = kmeans.fit_with(&request, &data).unwrap();

    assert_eq!(outcome.assignments.to_vec(), vec![0, 1, 1]);
    assert!(outcome.distortion.is_finite());
}

// ============================================================================
// Input Validation Tests
// ============================================================================

#[test]
fn test_invalid_k_zero() {
    let data = random_matrices(10, (2, 2), 1);
    let mut kmeans = MatrixKMeans::new(0, 0.01, Device::Cpu).unwrap();
    assert!(matches!(kmeans.fit(&data), Err(KMeansError::InvalidK(_))));
}

#[test]
fn test_negative_tolerance_rejected() {
    let data = random_matrices(10, (2, 2), 1);
    let mut kmeans = MatrixKMeans::new(2, -1.0, Device::Cpu).unwrap();
    assert!(matches!(kmeans.fit(&data), Err(KMeansError::InvalidInput(_))));
}

#[test]
fn test_empty_input_rejected() {
    assert!(matches!(
        ObservationSet::from_array(Array3::zeros((0, 2, 2))),
        Err(KMeansError::InvalidInput(_))
    ));
}

#[test]
fn test_mismatched_shapes_rejected() {
    let result = ObservationSet::from_matrices(&[
        Array2::zeros((2, 2)),
        Array2::zeros((2, 3)),
    ]);
    assert!(matches!(
        result,
        Err(KMeansError::InvalidShape { index: 1, .. })
    ));
}

#[test]
fn test_predict_on_training_data() {
    let (data, _) = generate_clustered_matrices(90, (2, 2), 3, 5);
    let mut kmeans = MatrixKMeans::new(3, 1e-6, Device::Cpu).unwrap();

    let outcome = kmeans.fit(&data).unwrap();
    let labels = kmeans.predict(&outcome.centroids, &data).unwrap();

    assert_eq!(labels, outcome.assignments);
}

// ============================================================================
// File IO Tests
// ============================================================================

#[test]
fn test_read_npy() {
    let path = std::env::temp_dir().join(format!("matkmeans-read-{}.npy", std::process::id()));
    let data = Array3::from_shape_fn((5, 2, 3), |(i, j, k)| (i * 6 + j * 3 + k) as f32);
    ndarray_npy::write_npy(&path, &data).unwrap();

    let set = ObservationSet::read_npy(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(set.len(), 5);
    assert_eq!(set.shape(), (2, 3));
    assert_eq!(set.view(), data.view());
}

#[test]
fn test_read_npy_missing_file() {
    let result = ObservationSet::read_npy("/nonexistent/matkmeans/input.npy");
    assert!(matches!(result, Err(KMeansError::Read(_))));
}
