use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, MissedTickBehavior};

use crate::{broadcaster::TransformBroadcaster, error::RelocError, store::ResultStore};

/// Re-sends the latest stored transform at a fixed rate.
pub struct PublishNode<B: TransformBroadcaster> {
    results: Arc<ResultStore>,
    broadcaster: B,
    period: Duration,
}

impl<B: TransformBroadcaster> PublishNode<B> {
    /// Create a new publish node.
    pub fn new(results: Arc<ResultStore>, broadcaster: B, period: Duration) -> Self {
        Self {
            results,
            broadcaster,
            period,
        }
    }

    /// Send the stored transform, if any.
    ///
    /// Returns whether a transform was sent.
    pub fn publish_once(&mut self) -> Result<bool, RelocError> {
        let Some(transform) = self.results.get() else {
            return Ok(false);
        };
        self.broadcaster.send(&transform)?;
        Ok(true)
    }

    /// Publish every period until shutdown is requested.
    pub async fn run(mut self, shutdown_tx: tokio::sync::watch::Sender<()>) -> Result<(), RelocError> {
        let mut shutdown_rx = shutdown_tx.subscribe();

        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("Publish node started, period {:?}", self.period);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_once() {
                        log::error!("Failed to publish transform: {}", e);
                    }
                }
            }
        }

        log::info!("Publish node stopped");
        Ok(())
    }
}
