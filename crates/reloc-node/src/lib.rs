#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Sinks for the published transform.
pub mod broadcaster;

/// Node configuration.
pub mod config;

/// Error types for the node.
pub mod error;

/// Scan ingestion task.
pub mod ingest_node;

/// Prior map loading.
pub mod map_loader;

/// Message types exchanged with the outside world.
pub mod messages;

/// Transform publishing task.
pub mod publish_node;

/// Alignment task.
pub mod register_node;

/// Scan replay from a directory of PCD files.
pub mod replay;

/// Lock-free holders of the latest scan and result.
pub mod store;

pub use error::RelocError;
