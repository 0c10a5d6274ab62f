use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use reloc_3d::io::pcd::read_pcd;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    error::RelocError,
    messages::{Header, PointCloudMsg, Stamp},
};

/// Plays a directory of PCD scans into the scan channel at a fixed rate.
#[derive(Debug, Clone)]
pub struct ScanReplayer {
    files: Vec<PathBuf>,
    period: Duration,
    frame_id: String,
}

impl ScanReplayer {
    /// Collect the `.pcd` files of `dir`, sorted by file name.
    pub fn from_dir(
        dir: impl AsRef<Path>,
        rate_hz: f64,
        frame_id: impl Into<String>,
    ) -> Result<Self, RelocError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| RelocError::ScanDirectory {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "pcd"))
            .collect::<Vec<_>>();
        files.sort();

        let period = if rate_hz.is_finite() && rate_hz > 0.0 {
            Duration::from_secs_f64(1.0 / rate_hz)
        } else {
            Duration::from_millis(100)
        };

        Ok(Self {
            files,
            period,
            frame_id: frame_id.into(),
        })
    }

    /// The scans that will be played, in order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Play every scan once, then return.
    ///
    /// Scans that do not fit in the channel are dropped.
    pub async fn run(
        self,
        scans: mpsc::Sender<PointCloudMsg>,
        shutdown_tx: tokio::sync::watch::Sender<()>,
    ) -> Result<(), RelocError> {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let mut ticker = tokio::time::interval(self.period);

        log::info!("Replaying {} scans", self.files.len());

        for path in self.files {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            let cloud = {
                let path = path.clone();
                tokio::task::spawn_blocking(move || read_pcd(path)).await?
            };
            let cloud = match cloud {
                Ok(cloud) => cloud,
                Err(e) => {
                    log::error!("Skipping scan {}: {}", path.display(), e);
                    continue;
                }
            };

            let msg = PointCloudMsg {
                header: Header {
                    stamp: Stamp::now(),
                    frame_id: self.frame_id.clone(),
                },
                points: cloud.points().to_vec(),
            };

            match scans.try_send(msg) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::warn!("Scan queue full, dropping {}", path.display());
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }

        log::info!("Scan replay finished");
        Ok(())
    }
}
