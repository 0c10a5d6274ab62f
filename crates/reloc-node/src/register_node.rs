use std::{sync::Arc, time::Duration};

use reloc_3d::transforms::Isometry3;
use reloc_gicp::{GicpRegistration, GicpResult, PreprocessedCloud};
use tokio::time::{Instant, MissedTickBehavior};

use crate::{
    error::RelocError,
    messages::{Header, TransformStamped},
    store::{ResultStore, SourceSlot},
};

/// What a single alignment cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// No target map or no scan yet.
    Skipped,
    /// The solve converged and its result was stored.
    Converged(GicpResult),
    /// The solve did not converge, the stored result is unchanged.
    NotConverged(GicpResult),
}

/// Periodically aligns the latest scan to the prior map.
pub struct RegisterNode {
    gicp: Arc<GicpRegistration>,
    target: Option<Arc<PreprocessedCloud>>,
    source: Arc<SourceSlot>,
    results: Arc<ResultStore>,
    map_frame_id: String,
    odom_frame_id: String,
    period: Duration,
}

impl RegisterNode {
    /// Create a new register node.
    ///
    /// # Arguments
    ///
    /// * `gicp` - The solver.
    /// * `target` - The preprocessed prior map, `None` if it failed to load.
    /// * `source` - Slot holding the latest scan.
    /// * `results` - Store receiving convergent results.
    /// * `map_frame_id` - Parent frame of the stored transform.
    /// * `odom_frame_id` - Child frame of the stored transform.
    /// * `period` - Time between two alignment cycles.
    pub fn new(
        gicp: GicpRegistration,
        target: Option<Arc<PreprocessedCloud>>,
        source: Arc<SourceSlot>,
        results: Arc<ResultStore>,
        map_frame_id: impl Into<String>,
        odom_frame_id: impl Into<String>,
        period: Duration,
    ) -> Self {
        Self {
            gicp: Arc::new(gicp),
            target,
            source,
            results,
            map_frame_id: map_frame_id.into(),
            odom_frame_id: odom_frame_id.into(),
            period,
        }
    }

    /// Run one alignment cycle against the scan current at call time.
    pub async fn register_once(&self) -> Result<RegisterOutcome, RelocError> {
        let Some(target) = self.target.clone() else {
            log::debug!("No target map, skipping alignment");
            return Ok(RegisterOutcome::Skipped);
        };
        let Some(snapshot) = self.source.current() else {
            log::debug!("No scan received yet, skipping alignment");
            return Ok(RegisterOutcome::Skipped);
        };

        // always seeded with identity
        let gicp = self.gicp.clone();
        let aligned = snapshot.clone();
        let result = tokio::task::spawn_blocking(move || {
            gicp.align(&target, &aligned.cloud, &Isometry3::IDENTITY)
        })
        .await??;

        if !result.converged {
            log::warn!("GICP did not converge.");
            return Ok(RegisterOutcome::NotConverged(result));
        }

        log::debug!(
            "GICP converged in {} iterations with {} inliers, error {:.6}",
            result.num_iterations,
            result.num_inliers,
            result.error
        );

        let header = Header {
            stamp: snapshot.stamp,
            frame_id: self.map_frame_id.clone(),
        };
        self.results.set(TransformStamped::new(
            header,
            self.odom_frame_id.clone(),
            &result.t_target_source,
        ));

        Ok(RegisterOutcome::Converged(result))
    }

    /// Run alignment cycles every period until shutdown is requested.
    pub async fn run(self, shutdown_tx: tokio::sync::watch::Sender<()>) -> Result<(), RelocError> {
        let mut shutdown_rx = shutdown_tx.subscribe();

        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("Register node started, period {:?}", self.period);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.register_once().await {
                        log::error!("Alignment cycle failed: {}", e);
                    }
                }
            }
        }

        log::info!("Register node stopped");
        Ok(())
    }
}
