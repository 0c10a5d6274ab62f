use glam::{DMat3, DVec3};

use crate::transforms::Isometry3;

/// A 3x3 covariance matrix stored row by row.
pub type Covariance = [[f64; 3]; 3];

/// Error returned when a point cloud is assembled from inconsistent parts.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PointCloudError {
    /// The number of covariances does not match the number of points.
    #[error("Expected {expected} covariances, got {actual}")]
    CovarianceCountMismatch {
        /// Number of points in the cloud.
        expected: usize,
        /// Number of covariances given.
        actual: usize,
    },
}

/// A point cloud with points and, once processed, per-point covariances.
///
/// The cloud is immutable: processing steps build a new cloud instead of
/// editing this one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The local shape covariance of every point.
    covariances: Option<Vec<Covariance>>,
}

impl PointCloud {
    /// Create a new point cloud from raw points.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            covariances: None,
        }
    }

    /// Consume the cloud and return a copy carrying one covariance per point.
    pub fn with_covariances(self, covariances: Vec<Covariance>) -> Result<Self, PointCloudError> {
        if covariances.len() != self.points.len() {
            return Err(PointCloudError::CovarianceCountMismatch {
                expected: self.points.len(),
                actual: covariances.len(),
            });
        }
        Ok(Self {
            points: self.points,
            covariances: Some(covariances),
        })
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the covariances of the points, if estimated.
    pub fn covariances(&self) -> Option<&[Covariance]> {
        self.covariances.as_deref()
    }

    /// Get the point at `index` as a vector.
    #[inline]
    pub fn point(&self, index: usize) -> DVec3 {
        DVec3::from_array(self.points[index])
    }

    /// Get the covariance at `index` as a matrix, if covariances are present.
    #[inline]
    pub fn covariance(&self, index: usize) -> Option<DMat3> {
        self.covariances
            .as_ref()
            .map(|covs| DMat3::from_cols_array_2d(&covs[index]).transpose())
    }

    /// Return a new cloud with every point mapped through `transform`.
    ///
    /// Covariances are rotated along with the points.
    pub fn transformed(&self, transform: &Isometry3) -> Self {
        let points = self
            .points
            .iter()
            .map(|p| transform.transform_point(DVec3::from_array(*p)).to_array())
            .collect();

        let rotation = transform.rotation_matrix();
        let covariances = self.covariances.as_ref().map(|covs| {
            covs.iter()
                .map(|c| {
                    let c = DMat3::from_cols_array_2d(c).transpose();
                    (rotation * c * rotation.transpose()).transpose().to_cols_array_2d()
                })
                .collect()
        });

        Self {
            points,
            covariances,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pointcloud() {
        let pointcloud = PointCloud::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);

        assert_eq!(pointcloud.len(), 2);
        assert!(pointcloud.covariances().is_none());

        if let Some(p1) = pointcloud.points().last() {
            assert_eq!(p1[0], 1.0);
            assert_eq!(p1[1], 0.0);
            assert_eq!(p1[2], 0.0);
        }
    }

    #[test]
    fn test_with_covariances() -> Result<(), PointCloudError> {
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let pointcloud = PointCloud::new(vec![[0.0; 3], [1.0; 3]]);

        let mismatched = pointcloud.clone().with_covariances(vec![identity]);
        assert_eq!(
            mismatched,
            Err(PointCloudError::CovarianceCountMismatch {
                expected: 2,
                actual: 1
            })
        );

        let pointcloud = pointcloud.with_covariances(vec![identity; 2])?;
        assert_eq!(pointcloud.covariances().map(|c| c.len()), Some(2));
        assert_eq!(pointcloud.covariance(1), Some(DMat3::IDENTITY));
        Ok(())
    }

    #[test]
    fn test_transformed_rotates_covariances() -> Result<(), PointCloudError> {
        // elongated along x, rotated by 90 degrees around z ends up along y
        let cov = [[4.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let pointcloud = PointCloud::new(vec![[1.0, 0.0, 0.0]]).with_covariances(vec![cov])?;

        let transform = Isometry3::from_axis_angle(
            DVec3::Z,
            std::f64::consts::FRAC_PI_2,
            DVec3::new(0.0, 0.0, 1.0),
        );
        let moved = pointcloud.transformed(&transform);

        let p = moved.point(0);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 1.0, epsilon = 1e-12);

        let c = moved.covariance(0).unwrap_or(DMat3::ZERO);
        assert_relative_eq!(c.x_axis.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.y_axis.y, 4.0, epsilon = 1e-12);
        Ok(())
    }
}
