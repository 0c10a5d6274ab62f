#![allow(dead_code)]

use glam::DVec3;
use reloc_3d::{pointcloud::PointCloud, transforms::Isometry3};
use reloc_gicp::{GicpError, PreprocessedCloud, Preprocessor};
use reloc_node::{
    messages::{Header, Stamp, TransformStamped},
    store::SourceSnapshot,
};

/// A floor and two walls meeting at the origin, sampled every 10 cm.
pub fn box_corner() -> Vec<[f64; 3]> {
    let mut points = Vec::new();
    for i in 0..20 {
        for j in 0..20 {
            let (u, v) = (i as f64 * 0.1, j as f64 * 0.1);
            points.push([u, v, 0.0]);
            points.push([0.0, u, v + 0.1]);
            points.push([u + 0.1, 0.0, v + 0.1]);
        }
    }
    points
}

pub fn move_points(points: &[[f64; 3]], transform: &Isometry3) -> Vec<[f64; 3]> {
    PointCloud::new(points.to_vec())
        .transformed(transform)
        .points()
        .to_vec()
}

pub fn preprocess(points: Vec<[f64; 3]>) -> Result<PreprocessedCloud, GicpError> {
    Preprocessor::new(0.05, 20, 2)?.process(&PointCloud::new(points))
}

pub fn snapshot(points: Vec<[f64; 3]>, sec: i64) -> Result<SourceSnapshot, GicpError> {
    Ok(SourceSnapshot {
        cloud: preprocess(points)?,
        stamp: Stamp { sec, nanosec: 0 },
        frame_id: "velodyne".to_string(),
    })
}

pub fn transform(sec: i64, x: f64) -> TransformStamped {
    let header = Header {
        stamp: Stamp { sec, nanosec: 0 },
        frame_id: "map".to_string(),
    };
    TransformStamped::new(
        header,
        "odom",
        &Isometry3::new(glam::DQuat::IDENTITY, DVec3::new(x, 0.0, 0.0)),
    )
}
