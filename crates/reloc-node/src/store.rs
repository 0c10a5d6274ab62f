use std::sync::Arc;

use arc_swap::ArcSwapOption;
use reloc_gicp::PreprocessedCloud;

use crate::messages::{Stamp, TransformStamped};

/// The most recent preprocessed scan with the metadata of the message it came from.
#[derive(Debug)]
pub struct SourceSnapshot {
    /// Downsampled scan, its covariances and its tree.
    pub cloud: PreprocessedCloud,
    /// Stamp of the originating scan.
    pub stamp: Stamp,
    /// Sensor frame of the originating scan.
    pub frame_id: String,
}

/// Holder of the latest [`SourceSnapshot`].
///
/// Readers get the whole snapshot that was current when they loaded it, even
/// if a newer one is installed while they still use it.
#[derive(Debug, Default)]
pub struct SourceSlot {
    inner: ArcSwapOption<SourceSnapshot>,
}

impl SourceSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot.
    pub fn install(&self, snapshot: SourceSnapshot) {
        self.inner.store(Some(Arc::new(snapshot)));
    }

    /// The current snapshot, if a scan was ever installed.
    pub fn current(&self) -> Option<Arc<SourceSnapshot>> {
        self.inner.load_full()
    }
}

/// Holder of the latest convergent registration result.
///
/// Starts empty and is never cleared once set, so "no result yet" stays
/// distinct from any transform, identity included.
#[derive(Debug, Default)]
pub struct ResultStore {
    inner: ArcSwapOption<TransformStamped>,
}

impl ResultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored result.
    pub fn set(&self, result: TransformStamped) {
        self.inner.store(Some(Arc::new(result)));
    }

    /// The stored result, without blocking.
    pub fn get(&self) -> Option<Arc<TransformStamped>> {
        self.inner.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Header;
    use reloc_3d::{pointcloud::PointCloud, transforms::Isometry3};

    fn snapshot(points: Vec<[f64; 3]>, sec: i64) -> Result<SourceSnapshot, reloc_gicp::GicpError> {
        let covariances = vec![[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]; points.len()];
        let cloud = PointCloud::new(points).with_covariances(covariances)?;
        Ok(SourceSnapshot {
            cloud: PreprocessedCloud::new(cloud)?,
            stamp: Stamp { sec, nanosec: 0 },
            frame_id: "lidar".to_string(),
        })
    }

    #[test]
    fn test_absent_is_not_identity() {
        let store = ResultStore::new();
        assert!(store.get().is_none());

        let identity = TransformStamped::new(Header::default(), "odom", &Isometry3::IDENTITY);
        store.set(identity.clone());
        assert_eq!(store.get().as_deref(), Some(&identity));
    }

    #[test]
    fn test_result_replaced_whole() {
        let store = ResultStore::new();
        let first = TransformStamped::new(Header::default(), "odom", &Isometry3::IDENTITY);
        store.set(first.clone());

        let held = store.get();
        let second = TransformStamped::new(
            Header::default(),
            "odom",
            &Isometry3::new(glam::DQuat::IDENTITY, glam::DVec3::X),
        );
        store.set(second.clone());

        assert_eq!(held.as_deref(), Some(&first));
        assert_eq!(store.get().as_deref(), Some(&second));
    }

    #[test]
    fn test_in_flight_snapshot_survives_replacement() -> Result<(), Box<dyn std::error::Error>> {
        let slot = SourceSlot::new();
        assert!(slot.current().is_none());

        slot.install(snapshot(vec![[0.0; 3]; 3], 1)?);
        let in_flight = slot.current().ok_or("no snapshot")?;

        slot.install(snapshot(vec![[1.0, 2.0, 3.0]], 2)?);

        // the reader keeps a consistent cloud and tree from the first scan
        assert_eq!(in_flight.stamp.sec, 1);
        assert_eq!(in_flight.cloud.len(), 3);
        assert_eq!(in_flight.cloud.tree().len(), 3);

        let latest = slot.current().ok_or("no snapshot")?;
        assert_eq!(latest.stamp.sec, 2);
        assert_eq!(latest.cloud.tree().len(), latest.cloud.len());
        Ok(())
    }

    #[test]
    fn test_concurrent_readers_see_whole_results() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(ResultStore::new());

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    let x = i as f64;
                    let transform = Isometry3::new(glam::DQuat::IDENTITY, glam::DVec3::splat(x));
                    let header = Header {
                        stamp: Stamp { sec: i, nanosec: 0 },
                        frame_id: "map".to_string(),
                    };
                    store.set(TransformStamped::new(header, "odom", &transform));
                }
            })
        };

        for _ in 0..1000 {
            if let Some(result) = store.get() {
                // stamp and payload always come from the same write
                let x = result.header.stamp.sec as f64;
                assert_eq!(result.translation, [x, x, x]);
            }
        }

        writer.join().map_err(|_| "writer panicked")?;
        Ok(())
    }
}
