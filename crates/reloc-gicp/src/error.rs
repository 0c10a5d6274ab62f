use reloc_3d::{pointcloud::PointCloudError, voxelgrid::VoxelGridError};

/// Errors raised while preparing clouds or setting up a registration.
#[derive(Debug, thiserror::Error)]
pub enum GicpError {
    /// The covariance neighbourhood must hold at least one point.
    #[error("Number of neighbors must be at least 1. Got: {0}")]
    InvalidNumNeighbors(usize),

    /// At least one worker thread is needed.
    #[error("Number of threads must be at least 1. Got: {0}")]
    InvalidNumThreads(usize),

    /// The correspondence distance threshold must be positive and finite.
    #[error("Maximum correspondence distance must be positive. Got: {0}")]
    InvalidMaxDistSq(f64),

    /// The solver needs at least one iteration.
    #[error("Maximum number of iterations must be at least 1. Got: {0}")]
    InvalidMaxIterations(usize),

    /// The tree was not built over the given cloud.
    #[error("Tree indexes {indexed} points but the cloud has {points}")]
    IndexMismatch {
        /// Number of points in the cloud.
        points: usize,
        /// Number of points in the tree.
        indexed: usize,
    },

    /// A cloud used for registration carries no covariances.
    #[error("Point cloud has no covariances")]
    MissingCovariances,

    /// Invalid voxel grid parameters.
    #[error(transparent)]
    VoxelGrid(#[from] VoxelGridError),

    /// Inconsistent point cloud parts.
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),

    /// The worker pool could not be created.
    #[error("Failed to build thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
