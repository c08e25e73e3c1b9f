// SPDX-License-Identifier: Apache-2.0

use config::Config;
use frr::{FrrModule, FRR_COMPONENT};
use infradb::actionbus::ActionBus;
use infradb::eventbus::EventBus;
use infradb::objects::{VrfSpec, GRD_VRF};
use infradb::store::RedbStore;
use infradb::taskmanager::TaskManager;
use infradb::InfraDb;
use mgmt::grpc::vrf::ListVrfsRequest;
use mgmt::grpc::{
    BridgePortService, LogicalBridgeService, Pagination, SviService, VrfService,
};
use std::sync::Arc;
use tracing::{error, info, warn};

mod args;

use args::{CmdArgs, Parser};

/// The management services the wire transport (gRPC server and its
/// HTTP/JSON gateway) is built on.
#[allow(unused)]
struct Services {
    vrfs: VrfService,
    bridges: LogicalBridgeService,
    ports: BridgePortService,
    svis: SviService,
}

fn load_config(args: &CmdArgs) -> Config {
    let mut config = if args.config.exists() {
        match Config::from_file(&args.config) {
            Ok(config) => config,
            Err(e) => {
                error!("Invalid configuration: {e}");
                std::process::exit(1);
            }
        }
    } else {
        warn!(
            "Config file '{}' not found, using defaults",
            args.config.display()
        );
        Config::default()
    };
    args.apply(&mut config);
    config
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .init();

    let args = CmdArgs::parse();
    let config = load_config(&args);

    let store = match RedbStore::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Could not open object store at '{}': {e}", config.db_path.display());
            std::process::exit(1);
        }
    };

    let bus = Arc::new(EventBus::new());
    let actions = Arc::new(ActionBus::new());
    let tasks = Arc::new(TaskManager::new());
    let db = Arc::new(InfraDb::new(store, bus.clone(), actions.clone(), tasks.clone()));

    // wire the back-end modules the configuration names
    for sub in &config.subscribers {
        if sub.name != FRR_COMPONENT {
            error!("No module provides subscriber '{}'", sub.name);
            std::process::exit(1);
        }
    }
    if config.linux_frr.enabled {
        let (priority, channel_size) = config
            .subscribers
            .iter()
            .find(|s| s.name == FRR_COMPONENT)
            .map(|s| (s.priority, s.channel_size))
            .unwrap_or((2, 32));
        FrrModule::register(
            db.clone(),
            &bus,
            &actions,
            config.linux_frr.local_as,
            priority,
            channel_size,
        );
    }
    if bus.subscribers("vrf").is_empty() {
        error!("No back end subscribed for vrf objects; refusing to start");
        std::process::exit(1);
    }

    tasks.set_driver(db.clone());
    let worker = tasks.start();

    // the default routing domain exists from the first boot onwards
    if let Err(e) = db.create_vrf(GRD_VRF, VrfSpec::default()) {
        error!("Could not create the GRD VRF: {e}");
    }

    let pagination = Arc::new(Pagination::new());
    let services = Services {
        vrfs: VrfService::new(db.clone(), pagination.clone()),
        bridges: LogicalBridgeService::new(
            db.clone(),
            pagination.clone(),
            config.linux_frr.default_vtep,
        ),
        ports: BridgePortService::new(db.clone(), pagination.clone()),
        svis: SviService::new(db.clone(), pagination),
    };

    match services.vrfs.list_vrfs(ListVrfsRequest::default()).await {
        Ok(listing) => info!(
            "Management services ready (grpc port {}, http port {}); {} VRF(s) persisted",
            config.grpc_port,
            config.http_port,
            listing.vrfs.len()
        ),
        Err(e) => warn!("Store readiness check failed: {e}"),
    }

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    let mut stop_tx = Some(stop_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        if let Some(tx) = stop_tx.take() {
            let _ = tx.send(());
        }
    }) {
        error!("Could not install the signal handler: {e}");
        std::process::exit(1);
    }

    let _ = stop_rx.await;
    info!("Shutting down gateway");
    bus.unsubscribe_module(FRR_COMPONENT).await;
    worker.abort();
    std::process::exit(0);
}
