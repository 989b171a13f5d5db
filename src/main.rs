//! RPC Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                   RPC GATEWAY                     │
//!                         │                                                   │
//!   JSON-RPC request      │  ┌─────────┐    ┌──────────┐    ┌─────────────┐  │
//!   ──────────────────────┼─▶│  http   │───▶│ registry │───▶│   router    │  │
//!   POST /rpc/{chain_id}  │  │ server  │    │ (chain)  │    │ (failover)  │  │
//!                         │  └─────────┘    └──────────┘    └──────┬──────┘  │
//!                         │                                        │         │
//!                         │                                        ▼         │
//!   JSON-RPC response     │                                 ┌─────────────┐  │      Upstream
//!   ◀─────────────────────┼─────────────────────────────────│   health    │◀─┼────  endpoints
//!                         │                                 │  trackers   │  │
//!                         │                                 └──────┬──────┘  │
//!                         │                                        │         │
//!                         │  ┌───────────────┐            ┌────────▼──────┐  │
//!                         │  │ observability │            │ sync service  │──┼──▶ Shared store
//!                         │  │ logs/metrics  │            │ (timer)       │  │    (memory/SQLite)
//!                         │  └───────────────┘            └───────────────┘  │
//!                         └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use rpc_gateway::config::{load_config, StoreBackend};
use rpc_gateway::observability::{logging, metrics};
use rpc_gateway::sync::{HealthStateStore, MemoryStateStore, SqliteStateStore, SyncService};
use rpc_gateway::{GatewayRegistry, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "rpc-gateway")]
#[command(about = "Health-aware JSON-RPC endpoint gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_tracing(&config.observability.log_level);
    tracing::info!("rpc-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        groups = config.groups.len(),
        sync_enabled = config.sync.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(GatewayRegistry::from_config(&config)?);
    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let sync_task = if config.sync.enabled {
        let store: Arc<dyn HealthStateStore> = match config.sync.store {
            StoreBackend::Memory => Arc::new(MemoryStateStore::new(config.sync.record_ttl())),
            StoreBackend::Sqlite => Arc::new(SqliteStateStore::open(
                &config.sync.sqlite_path,
                config.sync.record_ttl(),
            )?),
        };
        tracing::info!(store = ?config.sync.store, "Shared health sync enabled");
        let service = SyncService::new(&registry, store, &config.sync);
        Some(tokio::spawn(service.run(shutdown.subscribe())))
    } else {
        None
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config.listener, Arc::clone(&registry));
    server.run(listener, shutdown.clone()).await?;

    // The server also stops on its own errors; make sure background tasks follow.
    shutdown.trigger();
    if let Some(task) = sync_task {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Sync service task ended abnormally");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
