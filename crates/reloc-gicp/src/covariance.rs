use glam::{DMat3, DVec3};
use rayon::prelude::*;
use reloc_3d::pointcloud::{Covariance, PointCloud};

use crate::{error::GicpError, kdtree::PointCloudTree};

/// Neighbourhoods smaller than this get an identity covariance.
pub const MIN_NEIGHBORS_FOR_COVARIANCE: usize = 5;

/// Eigenvalues a regularized covariance is rebuilt with, smallest first.
///
/// The smallest one flattens the neighbourhood to a plane along its normal.
const PLANE_EIGENVALUES: [f64; 3] = [1e-3, 1.0, 1.0];

/// Estimate the local shape covariance of every point in `pointcloud`.
///
/// For each point, the `num_neighbors` nearest points of the same cloud
/// (itself included) are gathered through `tree`, their sample covariance is
/// computed and then regularized to a plane. When the cloud has fewer than
/// `num_neighbors` points every point is used.
///
/// # Arguments
///
/// * `pointcloud` - The (already downsampled) cloud.
/// * `tree` - A tree built over the points of `pointcloud`.
/// * `num_neighbors` - Size of the neighbourhood, at least 1.
///
/// # Returns
///
/// A new cloud with the same points and one covariance per point.
///
/// Runs on the rayon thread pool of the caller.
pub fn estimate_covariances(
    pointcloud: &PointCloud,
    tree: &PointCloudTree,
    num_neighbors: usize,
) -> Result<PointCloud, GicpError> {
    if num_neighbors == 0 {
        return Err(GicpError::InvalidNumNeighbors(num_neighbors));
    }
    if tree.len() != pointcloud.len() {
        return Err(GicpError::IndexMismatch {
            points: pointcloud.len(),
            indexed: tree.len(),
        });
    }

    let points = pointcloud.points();
    let covariances = points
        .par_iter()
        .map(|query| {
            let neighbors = tree.knn(query, num_neighbors);
            if neighbors.len() < MIN_NEIGHBORS_FOR_COVARIANCE {
                return DMat3::IDENTITY.to_cols_array_2d();
            }
            let neighborhood = neighbors
                .iter()
                .map(|n| DVec3::from_array(points[n.index]))
                .collect::<Vec<_>>();
            regularize_plane(&sample_covariance(&neighborhood))
        })
        .collect::<Vec<_>>();

    Ok(pointcloud.clone().with_covariances(covariances)?)
}

/// Sample covariance of a set of points (normalized by the number of points).
pub fn sample_covariance(points: &[DVec3]) -> DMat3 {
    if points.is_empty() {
        return DMat3::ZERO;
    }

    let inv_count = 1.0 / points.len() as f64;
    let mean = points.iter().fold(DVec3::ZERO, |acc, p| acc + *p) * inv_count;

    let mut cov = DMat3::ZERO;
    for p in points {
        let d = *p - mean;
        cov += DMat3::from_cols(d * d.x, d * d.y, d * d.z);
    }
    cov * inv_count
}

/// Rebuild a symmetric covariance with plane-like eigenvalues.
///
/// The eigenvectors are kept and the eigenvalues replaced by
/// `(1e-3, 1, 1)`, the smallest one going to the direction of least spread.
fn regularize_plane(cov: &DMat3) -> Covariance {
    let mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| cov.col(j)[i]);
    let evd = mat.selfadjoint_eigendecomposition(faer::Side::Lower);
    let u = evd.u();

    let eigenvectors = [0, 1, 2].map(|k| DVec3::new(u.read(0, k), u.read(1, k), u.read(2, k)));

    // order the eigenvectors by their rayleigh quotient, smallest first
    let mut order = [0usize, 1, 2];
    let eigenvalues = eigenvectors.map(|v| v.dot(*cov * v));
    order.sort_by(|&a, &b| eigenvalues[a].total_cmp(&eigenvalues[b]));

    let regularized = order
        .iter()
        .zip(PLANE_EIGENVALUES)
        .fold(DMat3::ZERO, |acc, (&k, lambda)| {
            let v = eigenvectors[k];
            acc + DMat3::from_cols(v * v.x, v * v.y, v * v.z) * lambda
        });

    // symmetric, so the column layout is also the row layout
    regularized.to_cols_array_2d()
}
