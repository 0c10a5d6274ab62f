use std::path::PathBuf;

use reloc_gicp::GicpError;

use crate::{broadcaster::BroadcastError, config::ConfigError, map_loader::MapLoadError};

/// Errors surfaced by the relocalization node.
#[derive(Debug, thiserror::Error)]
pub enum RelocError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The prior map could not be loaded.
    #[error(transparent)]
    MapLoad(#[from] MapLoadError),

    /// Preprocessing or registration failure.
    #[error(transparent)]
    Gicp(#[from] GicpError),

    /// The transform could not be sent.
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    /// The scan directory could not be listed.
    #[error("Failed to read scan directory {}", .path.display())]
    ScanDirectory {
        /// The directory.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A blocking worker task panicked or was cancelled.
    #[error("Worker task failed")]
    Join(#[from] tokio::task::JoinError),
}
