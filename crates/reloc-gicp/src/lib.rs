#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Per-point covariance estimation.
pub mod covariance;

/// Error types for the registration crate.
pub mod error;

/// Generalized ICP solver.
pub mod gicp;

/// Spatial index over point clouds.
pub mod kdtree;

mod ops;

/// Downsampling, indexing and covariance estimation in one step.
pub mod preprocess;

pub use error::GicpError;
pub use gicp::{GicpParams, GicpRegistration, GicpResult};
pub use preprocess::{PreprocessedCloud, Preprocessor};
