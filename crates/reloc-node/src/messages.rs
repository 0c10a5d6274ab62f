use glam::{DQuat, DVec3};
use reloc_3d::transforms::Isometry3;
use serde::{Deserialize, Serialize};

/// A point in time, seconds and nanoseconds since the unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stamp {
    /// Whole seconds.
    pub sec: i64,
    /// Nanoseconds within the second.
    pub nanosec: u32,
}

impl Stamp {
    /// The current wall clock time.
    pub fn now() -> Self {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| Self {
                sec: d.as_secs() as i64,
                nanosec: d.subsec_nanos(),
            })
            .unwrap_or_default()
    }
}

/// Metadata attached to every message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Acquisition time.
    pub stamp: Stamp,
    /// Coordinate frame the payload is expressed in.
    pub frame_id: String,
}

/// A scan as delivered by the sensor driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloudMsg {
    /// Scan stamp and sensor frame.
    pub header: Header,
    /// The scan points.
    pub points: Vec<[f64; 3]>,
}

/// A transform between two named frames at a given time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    /// Stamp and parent frame.
    pub header: Header,
    /// Child frame.
    pub child_frame_id: String,
    /// Translation of the child origin in the parent frame.
    pub translation: [f64; 3],
    /// Rotation quaternion as `[x, y, z, w]`.
    pub rotation: [f64; 4],
}

impl TransformStamped {
    /// Build a message from a rigid transform.
    pub fn new(header: Header, child_frame_id: impl Into<String>, transform: &Isometry3) -> Self {
        let q = transform.rotation;
        Self {
            header,
            child_frame_id: child_frame_id.into(),
            translation: transform.translation.to_array(),
            rotation: [q.x, q.y, q.z, q.w],
        }
    }

    /// The rigid transform carried by the message.
    pub fn isometry(&self) -> Isometry3 {
        let [x, y, z, w] = self.rotation;
        Isometry3::new(
            DQuat::from_xyzw(x, y, z, w),
            DVec3::from_array(self.translation),
        )
    }
}
