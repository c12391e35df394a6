use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use rayon::prelude::*;

/// Squared Frobenius distance between two flattened matrices, accumulated in f64
#[inline]
pub fn squared_frobenius(a: &ArrayView1<f32>, b: &ArrayView1<f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum()
}

/// Frobenius distance between two matrices of the same shape
pub fn frobenius_distance(a: &ArrayView2<f32>, b: &ArrayView2<f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Squared distances from every observation row to every centroid row
///
/// Returns an `(n_observations, n_centroids)` matrix in f64, so finite
/// observations never produce infinite distances. Rows are computed in
/// parallel, one observation per task.
pub fn pairwise_squared_distances(
    data: &ArrayView2<f32>,
    centroids: &ArrayView2<f32>,
) -> Array2<f64> {
    let mut distances = Array2::<f64>::zeros((data.nrows(), centroids.nrows()));

    Zip::from(distances.rows_mut())
        .and(data.rows())
        .par_for_each(|mut out, x| {
            for (slot, c) in out.iter_mut().zip(centroids.rows()) {
                *slot = squared_frobenius(&x, &c);
            }
        });

    distances
}

/// Index of the smallest value in each row; ties go to the lowest index
pub fn argmin_rows(distances: &ArrayView2<f64>) -> Array1<usize> {
    distances
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (j, &d) in row.iter().enumerate() {
                if d < best_dist {
                    best_dist = d;
                    best = j;
                }
            }
            best
        })
        .collect()
}

/// Per-cluster element-wise sums and member counts
pub fn accumulate_clusters(
    data: &ArrayView2<f32>,
    assignments: &ArrayView1<usize>,
    k: usize,
) -> (Array2<f64>, Vec<usize>) {
    let mut sums = Array2::<f64>::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];

    for (row, &cluster) in data.rows().into_iter().zip(assignments.iter()) {
        if cluster < k {
            counts[cluster] += 1;
            sums.row_mut(cluster)
                .iter_mut()
                .zip(row.iter())
                .for_each(|(s, &v)| *s += v as f64);
        }
    }

    (sums, counts)
}

/// Squared distance of each observation to its assigned centroid
pub fn assigned_squared_distances(
    data: &ArrayView2<f32>,
    centroids: &ArrayView2<f32>,
    assignments: &ArrayView1<usize>,
) -> Vec<f64> {
    (0..data.nrows())
        .into_par_iter()
        .map(|i| squared_frobenius(&data.row(i), &centroids.row(assignments[i])))
        .collect()
}
