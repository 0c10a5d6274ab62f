use std::{path::PathBuf, sync::Arc};

use argh::FromArgs;
use reloc_gicp::{GicpRegistration, Preprocessor};

use reloc_node::{
    broadcaster::JsonLinesBroadcaster,
    config::RelocConfig,
    ingest_node::{scan_channel, IngestNode},
    map_loader::load_target,
    publish_node::PublishNode,
    register_node::RegisterNode,
    replay::ScanReplayer,
    store::{ResultStore, SourceSlot},
};

#[derive(FromArgs)]
/// Relocalize a scan stream against a prior point cloud map with generalized ICP
struct Args {
    /// path to a JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// path to the prior map, overrides the configuration
    #[argh(option, short = 'm')]
    prior_pcd_file: Option<PathBuf>,

    /// directory of PCD scans to replay
    #[argh(option, short = 's')]
    scans_dir: Option<PathBuf>,

    /// scan replay rate in Hz
    #[argh(option, default = "10.0")]
    scan_rate: f64,

    /// frame id of the replayed scans
    #[argh(option, default = "String::from(\"velodyne\")")]
    scan_frame_id: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => RelocConfig::from_json_file(path)?,
        None => RelocConfig::default(),
    };
    if let Some(path) = args.prior_pcd_file {
        config.prior_pcd_file = path;
    }
    config.validate()?;

    // create the cancellation token
    let shutdown_tx = tokio::sync::watch::Sender::new(());

    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    // a missing map keeps the node alive but idle
    let map_preprocessor = Preprocessor::new(
        config.global_leaf_size,
        config.num_neighbors,
        config.num_threads,
    )?;
    let target = match load_target(&config.prior_pcd_file, &map_preprocessor) {
        Ok(target) => Some(Arc::new(target)),
        Err(e) => {
            log::error!("{}", e);
            None
        }
    };
    drop(map_preprocessor);

    let source = Arc::new(SourceSlot::new());
    let results = Arc::new(ResultStore::new());
    let (scan_tx, scan_rx) = scan_channel();

    let ingest_node = IngestNode::new(
        Preprocessor::new(
            config.registered_leaf_size,
            config.num_neighbors,
            config.num_threads,
        )?,
        source.clone(),
        scan_rx,
    );
    let register_node = RegisterNode::new(
        GicpRegistration::new(config.gicp_params())?,
        target,
        source.clone(),
        results.clone(),
        config.map_frame_id.clone(),
        config.odom_frame_id.clone(),
        config.register_period(),
    );
    let publish_node = PublishNode::new(
        results.clone(),
        JsonLinesBroadcaster::new(std::io::stdout()),
        config.publish_period(),
    );

    let mut nodes = vec![
        tokio::spawn(ingest_node.run(shutdown_tx.clone())),
        tokio::spawn(register_node.run(shutdown_tx.clone())),
        tokio::spawn(publish_node.run(shutdown_tx.clone())),
    ];

    match args.scans_dir {
        Some(dir) => {
            let replayer = ScanReplayer::from_dir(dir, args.scan_rate, args.scan_frame_id)?;
            nodes.push(tokio::spawn(replayer.run(scan_tx, shutdown_tx.clone())));
        }
        None => {
            log::warn!("No scan source given, waiting for Ctrl+C");
            drop(scan_tx);
        }
    }

    for node in nodes {
        node.await??;
    }

    Ok(())
}
