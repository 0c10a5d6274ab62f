#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// I/O utilities for reading point cloud files.
pub mod io;

/// Point cloud container.
pub mod pointcloud;

/// Rigid body transforms.
pub mod transforms;

/// Voxel grid downsampling.
pub mod voxelgrid;
