//! Gatehouse - multi-tenant front door for per-team sandboxed instances

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatehouse::{
    config::Args,
    orchestrator::{ControlPlaneOrchestrator, MemoryOrchestrator, Orchestrator},
    server,
    store::{MemoryTeamStore, MongoTeamStore, TeamStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gatehouse={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Gatehouse - team instance front door");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("Control plane: {}", args.control_plane_url);
    info!("Backend template: {}", args.backend_url_template);
    info!("Join UI: {}", args.ui_url);
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Max instances: {}", args.max_instances);
    info!(
        "Readiness budget: {} polls x {}s",
        args.ready_poll_attempts, args.ready_poll_interval_secs
    );
    info!("======================================");

    // Team store: MongoDB in production, in-memory fallback in dev mode
    let store: Arc<dyn TeamStore> =
        match MongoTeamStore::connect(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(store) => {
                info!("MongoDB connected successfully");
                Arc::new(store)
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                    Arc::new(MemoryTeamStore::new())
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    // Orchestrator: REST control plane in production, in-memory in dev mode
    let orchestrator: Arc<dyn Orchestrator> = if args.dev_mode {
        warn!("Dev mode: using in-memory orchestrator, instances are simulated");
        Arc::new(MemoryOrchestrator::new(&args.backend_url_template))
    } else {
        match ControlPlaneOrchestrator::new(&args.control_plane_url, &args.backend_url_template) {
            Ok(orchestrator) => Arc::new(orchestrator),
            Err(e) => {
                error!("Failed to build control plane client: {}", e);
                std::process::exit(1);
            }
        }
    };

    let state = match server::AppState::new(args, store, orchestrator) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to build application state: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
