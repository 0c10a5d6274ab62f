use std::path::{Path, PathBuf};

use reloc_3d::{
    io::pcd::{read_pcd, PcdError},
    pointcloud::PointCloud,
};
use reloc_gicp::{GicpError, PreprocessedCloud, Preprocessor};

/// Errors raised while loading the prior map.
#[derive(Debug, thiserror::Error)]
pub enum MapLoadError {
    /// No file at the given path.
    #[error("Couldn't read PCD file: {} does not exist", .0.display())]
    NotFound(PathBuf),

    /// The file exists but is not a readable PCD file.
    #[error("Couldn't read PCD file {}", .path.display())]
    Parse {
        /// The map file.
        path: PathBuf,
        /// The reader error.
        #[source]
        source: PcdError,
    },

    /// The file holds no points.
    #[error("PCD file {} holds no points", .0.display())]
    Empty(PathBuf),

    /// The map could not be preprocessed.
    #[error(transparent)]
    Preprocess(#[from] GicpError),
}

/// Read the prior map from a PCD file.
pub fn load_map(path: impl AsRef<Path>) -> Result<PointCloud, MapLoadError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MapLoadError::NotFound(path.to_path_buf()));
    }

    let cloud = read_pcd(path).map_err(|source| MapLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if cloud.is_empty() {
        return Err(MapLoadError::Empty(path.to_path_buf()));
    }

    log::info!("Loaded global map with {} points", cloud.len());

    Ok(cloud)
}

/// Read the prior map and preprocess it into the registration target.
pub fn load_target(
    path: impl AsRef<Path>,
    preprocessor: &Preprocessor,
) -> Result<PreprocessedCloud, MapLoadError> {
    let cloud = load_map(path)?;
    let target = preprocessor.process(&cloud)?;
    log::info!("Global map downsampled to {} points", target.len());
    Ok(target)
}
