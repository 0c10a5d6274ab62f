use std::sync::Arc;

use reloc_3d::pointcloud::PointCloud;
use reloc_gicp::Preprocessor;
use tokio::sync::mpsc;

use crate::{
    error::RelocError,
    messages::PointCloudMsg,
    store::{SourceSlot, SourceSnapshot},
};

/// Number of scans buffered between the driver and the ingestion node.
pub const SCAN_QUEUE_DEPTH: usize = 10;

/// Create the bounded scan channel feeding an [`IngestNode`].
pub fn scan_channel() -> (mpsc::Sender<PointCloudMsg>, mpsc::Receiver<PointCloudMsg>) {
    mpsc::channel(SCAN_QUEUE_DEPTH)
}

/// Preprocesses every incoming scan and installs it as the current source.
pub struct IngestNode {
    preprocessor: Arc<Preprocessor>,
    source: Arc<SourceSlot>,
    scans: mpsc::Receiver<PointCloudMsg>,
}

impl IngestNode {
    /// Create a new ingestion node reading from `scans`.
    pub fn new(
        preprocessor: Preprocessor,
        source: Arc<SourceSlot>,
        scans: mpsc::Receiver<PointCloudMsg>,
    ) -> Self {
        Self {
            preprocessor: Arc::new(preprocessor),
            source,
            scans,
        }
    }

    /// Preprocess one scan off the async runtime and install it.
    pub async fn ingest(&self, msg: PointCloudMsg) -> Result<(), RelocError> {
        let PointCloudMsg { header, points } = msg;

        let preprocessor = self.preprocessor.clone();
        let cloud =
            tokio::task::spawn_blocking(move || preprocessor.process(&PointCloud::new(points)))
                .await??;

        log::debug!(
            "Ingested scan {}.{:09} from '{}' with {} points",
            header.stamp.sec,
            header.stamp.nanosec,
            header.frame_id,
            cloud.len()
        );

        self.source.install(SourceSnapshot {
            cloud,
            stamp: header.stamp,
            frame_id: header.frame_id,
        });

        Ok(())
    }

    /// Run until shutdown is requested or the scan stream closes.
    pub async fn run(mut self, shutdown_tx: tokio::sync::watch::Sender<()>) -> Result<(), RelocError> {
        let mut shutdown_rx = shutdown_tx.subscribe();

        log::info!("Ingest node started");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                msg = self.scans.recv() => {
                    let Some(msg) = msg else {
                        log::info!("Scan stream closed");
                        break;
                    };
                    if let Err(e) = self.ingest(msg).await {
                        log::error!("Dropping scan: {}", e);
                    }
                }
            }
        }

        log::info!("Ingest node stopped");
        Ok(())
    }
}
