use rayon::prelude::*;

use crate::pointcloud::PointCloud;

/// Error types for the voxel grid.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VoxelGridError {
    /// The leaf size is zero, negative or not finite.
    #[error("Leaf size must be positive and finite. Got: {0}")]
    InvalidLeafSize(f64),
}

/// A uniform 3D voxel grid used to downsample point clouds.
///
/// Every occupied cube of side `leaf_size` collapses to the centroid of the
/// points it contains.
#[derive(Debug, Clone, Copy)]
pub struct VoxelGrid {
    leaf_size: f64,
    inv_leaf_size: f64,
}

impl VoxelGrid {
    /// Create a new voxel grid with cubic voxels of side `leaf_size`.
    pub fn new(leaf_size: f64) -> Result<Self, VoxelGridError> {
        if !leaf_size.is_finite() || leaf_size <= 0.0 {
            return Err(VoxelGridError::InvalidLeafSize(leaf_size));
        }
        Ok(Self {
            leaf_size,
            inv_leaf_size: 1.0 / leaf_size,
        })
    }

    /// The side length of a voxel.
    pub fn leaf_size(&self) -> f64 {
        self.leaf_size
    }

    /// Compute the voxel index for a given point.
    #[inline]
    fn voxel_key(&self, point: &[f64; 3]) -> [i64; 3] {
        [
            (point[0] * self.inv_leaf_size).floor() as i64,
            (point[1] * self.inv_leaf_size).floor() as i64,
            (point[2] * self.inv_leaf_size).floor() as i64,
        ]
    }

    /// Downsample the point cloud by averaging the points in each voxel.
    ///
    /// The output is sorted by voxel index, so it only depends on which voxels
    /// are occupied and not on the order of the input points. Points with
    /// non-finite coordinates are dropped. Covariances are not carried over.
    ///
    /// Runs on the rayon thread pool of the caller.
    pub fn downsample(&self, pointcloud: &PointCloud) -> PointCloud {
        let mut keyed = pointcloud
            .points()
            .par_iter()
            .filter(|p| p.iter().all(|v| v.is_finite()))
            .map(|p| (self.voxel_key(p), *p))
            .collect::<Vec<_>>();

        keyed.par_sort_by_key(|(key, _)| *key);

        let points = keyed
            .chunk_by(|a, b| a.0 == b.0)
            .map(|voxel| {
                let sum = voxel.iter().fold([0.0; 3], |mut acc, (_, p)| {
                    acc[0] += p[0];
                    acc[1] += p[1];
                    acc[2] += p[2];
                    acc
                });
                let inv_count = 1.0 / voxel.len() as f64;
                [sum[0] * inv_count, sum[1] * inv_count, sum[2] * inv_count]
            })
            .collect::<Vec<_>>();

        PointCloud::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_invalid_leaf_size() {
        assert_eq!(
            VoxelGrid::new(0.0).err(),
            Some(VoxelGridError::InvalidLeafSize(0.0))
        );
        assert!(VoxelGrid::new(-0.5).is_err());
        assert!(VoxelGrid::new(f64::NAN).is_err());
    }

    #[test]
    fn test_downsample_empty() -> Result<(), VoxelGridError> {
        let grid = VoxelGrid::new(0.25)?;
        let downsampled = grid.downsample(&PointCloud::default());
        assert!(downsampled.is_empty());
        Ok(())
    }

    #[test]
    fn test_downsample_coincident_points() -> Result<(), VoxelGridError> {
        let grid = VoxelGrid::new(0.25)?;
        let pointcloud = PointCloud::new(vec![[0.1, 0.1, 0.1]; 17]);
        let downsampled = grid.downsample(&pointcloud);
        assert_eq!(downsampled.len(), 1);
        assert_relative_eq!(downsampled.points()[0][0], 0.1, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_downsample_centroids() -> Result<(), VoxelGridError> {
        let grid = VoxelGrid::new(1.0)?;
        let pointcloud = PointCloud::new(vec![
            [0.0, 0.0, 0.0],
            [0.1, 0.1, 0.1],
            [1.0, 1.0, 1.0],
            [1.1, 1.1, 1.1],
            [-0.5, 0.2, 0.2],
        ]);
        let downsampled = grid.downsample(&pointcloud);

        // sorted by voxel index: (-1, 0, 0), (0, 0, 0), (1, 1, 1)
        assert_eq!(downsampled.len(), 3);
        let expected = [[-0.5, 0.2, 0.2], [0.05, 0.05, 0.05], [1.05, 1.05, 1.05]];
        for (p, e) in downsampled.points().iter().zip(expected.iter()) {
            for i in 0..3 {
                assert_relative_eq!(p[i], e[i], epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_downsample_order_independent() -> Result<(), VoxelGridError> {
        let grid = VoxelGrid::new(0.3)?;
        let points = (0..500)
            .map(|_| {
                [
                    rand::random::<f64>() * 3.0,
                    rand::random::<f64>() * 3.0,
                    rand::random::<f64>() * 3.0,
                ]
            })
            .collect::<Vec<_>>();
        let mut reversed = points.clone();
        reversed.reverse();

        let a = grid.downsample(&PointCloud::new(points));
        let b = grid.downsample(&PointCloud::new(reversed));

        assert_eq!(a.len(), b.len());
        for (pa, pb) in a.points().iter().zip(b.points().iter()) {
            for i in 0..3 {
                assert_relative_eq!(pa[i], pb[i], epsilon = 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn test_downsample_drops_non_finite() -> Result<(), VoxelGridError> {
        let grid = VoxelGrid::new(1.0)?;
        let pointcloud = PointCloud::new(vec![[f64::NAN, 0.0, 0.0], [0.5, 0.5, 0.5]]);
        assert_eq!(grid.downsample(&pointcloud).len(), 1);
        Ok(())
    }
}
