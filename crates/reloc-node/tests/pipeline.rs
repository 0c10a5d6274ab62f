mod common;

use std::{sync::Arc, time::Duration};

use glam::DVec3;
use reloc_3d::transforms::Isometry3;
use reloc_gicp::{GicpParams, GicpRegistration, Preprocessor};
use reloc_node::{
    broadcaster::ChannelBroadcaster,
    ingest_node::{scan_channel, IngestNode},
    messages::{Header, PointCloudMsg, Stamp},
    publish_node::PublishNode,
    register_node::RegisterNode,
    store::{ResultStore, SourceSlot},
};

use common::{box_corner, move_points, preprocess};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scan_to_published_transform() -> Result<(), Box<dyn std::error::Error>> {
    let target_points = box_corner();
    let t_map_odom = Isometry3::from_axis_angle(DVec3::Z, 0.01, DVec3::new(0.015, 0.01, -0.01));
    let scan = move_points(&target_points, &t_map_odom.inverse());

    let source = Arc::new(SourceSlot::new());
    let results = Arc::new(ResultStore::new());
    let (scan_tx, scan_rx) = scan_channel();
    let (broadcaster, mut transforms) = ChannelBroadcaster::new(1024);

    let ingest = IngestNode::new(Preprocessor::new(0.05, 20, 2)?, source.clone(), scan_rx);
    let register = RegisterNode::new(
        GicpRegistration::new(GicpParams::default())?,
        Some(Arc::new(preprocess(target_points)?)),
        source.clone(),
        results.clone(),
        "map",
        "odom",
        Duration::from_millis(20),
    );
    let publish = PublishNode::new(results.clone(), broadcaster, Duration::from_millis(5));

    let shutdown_tx = tokio::sync::watch::Sender::new(());
    let nodes = vec![
        tokio::spawn(ingest.run(shutdown_tx.clone())),
        tokio::spawn(register.run(shutdown_tx.clone())),
        tokio::spawn(publish.run(shutdown_tx.clone())),
    ];

    scan_tx
        .send(PointCloudMsg {
            header: Header {
                stamp: Stamp { sec: 100, nanosec: 5 },
                frame_id: "velodyne".to_string(),
            },
            points: scan,
        })
        .await?;

    let published = tokio::time::timeout(Duration::from_secs(30), transforms.recv())
        .await?
        .ok_or("broadcaster closed")?;

    assert_eq!(published.header.stamp, Stamp { sec: 100, nanosec: 5 });
    assert_eq!(published.header.frame_id, "map");
    assert_eq!(published.child_frame_id, "odom");
    let error = published.isometry().inverse() * t_map_odom;
    assert!(error.angle() < 1e-3);
    assert!(error.translation.length() < 5e-3);

    shutdown_tx.send(())?;
    for node in nodes {
        node.await??;
    }
    Ok(())
}
