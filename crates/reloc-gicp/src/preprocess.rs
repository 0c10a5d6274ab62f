use reloc_3d::{pointcloud::PointCloud, voxelgrid::VoxelGrid};

use crate::{covariance::estimate_covariances, error::GicpError, kdtree::PointCloudTree};

/// A downsampled cloud with covariances, bundled with the tree built over it.
///
/// The bundle is only produced whole by [`Preprocessor::process`] or
/// [`PreprocessedCloud::new`], so the tree always indexes exactly these points.
#[derive(Debug)]
pub struct PreprocessedCloud {
    cloud: PointCloud,
    tree: PointCloudTree,
}

impl PreprocessedCloud {
    /// Bundle a cloud carrying covariances with a freshly built tree.
    pub fn new(cloud: PointCloud) -> Result<Self, GicpError> {
        if cloud.covariances().is_none() {
            return Err(GicpError::MissingCovariances);
        }
        let tree = PointCloudTree::new(cloud.points());
        Ok(Self { cloud, tree })
    }

    /// The processed cloud.
    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    /// The tree over the processed cloud.
    pub fn tree(&self) -> &PointCloudTree {
        &self.tree
    }

    /// Number of points after downsampling.
    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    /// Check if no point survived downsampling.
    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }
}

/// Downsamples clouds, estimates their covariances and indexes them.
///
/// Owns a worker pool of `num_threads` threads which bounds the parallelism
/// of every step.
pub struct Preprocessor {
    voxel_grid: VoxelGrid,
    num_neighbors: usize,
    pool: rayon::ThreadPool,
}

impl Preprocessor {
    /// Create a new preprocessor.
    ///
    /// # Arguments
    ///
    /// * `leaf_size` - Side of the downsampling voxels in meters.
    /// * `num_neighbors` - Covariance neighbourhood size.
    /// * `num_threads` - Number of worker threads.
    pub fn new(leaf_size: f64, num_neighbors: usize, num_threads: usize) -> Result<Self, GicpError> {
        if num_neighbors == 0 {
            return Err(GicpError::InvalidNumNeighbors(num_neighbors));
        }
        if num_threads == 0 {
            return Err(GicpError::InvalidNumThreads(num_threads));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("reloc-preprocess-{i}"))
            .build()?;

        Ok(Self {
            voxel_grid: VoxelGrid::new(leaf_size)?,
            num_neighbors,
            pool,
        })
    }

    /// Downsample `cloud`, index it and estimate its covariances.
    pub fn process(&self, cloud: &PointCloud) -> Result<PreprocessedCloud, GicpError> {
        self.pool.install(|| {
            let downsampled = self.voxel_grid.downsample(cloud);
            let tree = PointCloudTree::new(downsampled.points());
            let processed = estimate_covariances(&downsampled, &tree, self.num_neighbors)?;

            log::debug!(
                "Preprocessed cloud: {} -> {} points (leaf size {})",
                cloud.len(),
                processed.len(),
                self.voxel_grid.leaf_size()
            );

            Ok(PreprocessedCloud {
                cloud: processed,
                tree,
            })
        })
    }
}
