use glam::{DMat3, DVec3};
use rayon::prelude::*;
use reloc_3d::{
    pointcloud::Covariance,
    transforms::{skew, Isometry3},
};

use crate::kdtree::PointCloudTree;

/// A source point matched to its nearest target point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Correspondence {
    pub source: usize,
    pub target: usize,
}

/// Points and covariances of one side of the registration.
#[derive(Clone, Copy)]
pub(crate) struct CloudView<'a> {
    pub points: &'a [[f64; 3]],
    pub covariances: &'a [Covariance],
}

/// The normal equations `H delta = -g` of a linearized GICP problem.
///
/// `h` and `g` follow the `[rotation, translation]` parameter order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LinearSystem {
    pub h: [[f64; 6]; 6],
    pub g: [f64; 6],
    pub error: f64,
    pub num_inliers: usize,
}

impl Default for LinearSystem {
    fn default() -> Self {
        Self {
            h: [[0.0; 6]; 6],
            g: [0.0; 6],
            error: 0.0,
            num_inliers: 0,
        }
    }
}

impl LinearSystem {
    fn merge(mut self, other: Self) -> Self {
        for (row, other_row) in self.h.iter_mut().zip(other.h.iter()) {
            for (v, o) in row.iter_mut().zip(other_row.iter()) {
                *v += o;
            }
        }
        for (v, o) in self.g.iter_mut().zip(other.g.iter()) {
            *v += o;
        }
        self.error += other.error;
        self.num_inliers += other.num_inliers;
        self
    }

    fn add_block(&mut self, row: usize, col: usize, block: &DMat3) {
        for i in 0..3 {
            for j in 0..3 {
                self.h[row + i][col + j] += block.col(j)[i];
            }
        }
    }

    fn add_gradient(&mut self, row: usize, v: DVec3) {
        self.g[row] += v.x;
        self.g[row + 1] += v.y;
        self.g[row + 2] += v.z;
    }
}

/// Match every source point, moved by `target_from_source`, to its nearest target point.
///
/// Pairs farther apart than `max_dist_sq` (squared distance) are rejected.
pub(crate) fn find_correspondences(
    source_points: &[[f64; 3]],
    target_tree: &PointCloudTree,
    target_from_source: &Isometry3,
    max_dist_sq: f64,
) -> Vec<Correspondence> {
    source_points
        .par_iter()
        .enumerate()
        .filter_map(|(source, p)| {
            let moved = target_from_source.transform_point(DVec3::from_array(*p));
            let nn = target_tree.nearest(&moved.to_array())?;
            (nn.distance_sq <= max_dist_sq).then_some(Correspondence {
                source,
                target: nn.index,
            })
        })
        .collect()
}

/// Residual and weight of one correspondence under `target_from_source`.
///
/// `r = b - T a` and `M = (C_b + R C_a R^T)^-1`.
#[inline]
fn residual(
    target: &CloudView,
    source: &CloudView,
    pair: &Correspondence,
    target_from_source: &Isometry3,
    rotation: &DMat3,
) -> (DVec3, DMat3) {
    let a = DVec3::from_array(source.points[pair.source]);
    let b = DVec3::from_array(target.points[pair.target]);
    // covariances are symmetric, the row-major storage reads the same by columns
    let cov_a = DMat3::from_cols_array_2d(&source.covariances[pair.source]);
    let cov_b = DMat3::from_cols_array_2d(&target.covariances[pair.target]);

    let r = b - target_from_source.transform_point(a);
    let mahalanobis = (cov_b + *rotation * cov_a * rotation.transpose()).inverse();
    (r, mahalanobis)
}

/// Linearize the GICP cost around `target_from_source`.
///
/// Each pair contributes `J = [R [a]x, -R]` with the perturbation applied on
/// the right, `T' = T * exp(delta)`.
pub(crate) fn linearize(
    target: &CloudView,
    source: &CloudView,
    correspondences: &[Correspondence],
    target_from_source: &Isometry3,
) -> LinearSystem {
    let rotation = target_from_source.rotation_matrix();

    correspondences
        .par_iter()
        .fold(LinearSystem::default, |mut acc, pair| {
            let (r, m) = residual(target, source, pair, target_from_source, &rotation);
            let a = DVec3::from_array(source.points[pair.source]);

            let j_rot = rotation * skew(a);
            let j_trans = -rotation;
            let m_j_rot = m * j_rot;
            let m_j_trans = m * j_trans;

            acc.add_block(0, 0, &(j_rot.transpose() * m_j_rot));
            acc.add_block(0, 3, &(j_rot.transpose() * m_j_trans));
            acc.add_block(3, 0, &(j_trans.transpose() * m_j_rot));
            acc.add_block(3, 3, &(j_trans.transpose() * m_j_trans));

            let m_r = m * r;
            acc.add_gradient(0, j_rot.transpose() * m_r);
            acc.add_gradient(3, j_trans.transpose() * m_r);

            acc.error += 0.5 * r.dot(m_r);
            acc.num_inliers += 1;
            acc
        })
        .reduce(LinearSystem::default, LinearSystem::merge)
}

/// GICP cost of `correspondences` under `target_from_source`.
pub(crate) fn compute_error(
    target: &CloudView,
    source: &CloudView,
    correspondences: &[Correspondence],
    target_from_source: &Isometry3,
) -> f64 {
    let rotation = target_from_source.rotation_matrix();
    correspondences
        .par_iter()
        .map(|pair| {
            let (r, m) = residual(target, source, pair, target_from_source, &rotation);
            0.5 * r.dot(m * r)
        })
        .sum()
}
