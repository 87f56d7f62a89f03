//! # fabric-cli
//!
//! Run a demo state-fabric node.
//!
//! ```bash
//! # Start a hub
//! fabric-cli --node-id hub hub --listen 127.0.0.1:7400
//!
//! # Follow it from other terminals
//! fabric-cli --node-id node-a follow --hub 127.0.0.1:7400
//! fabric-cli --node-id node-b follow --hub 127.0.0.1:7400
//! ```
//!
//! Every node registers a heartbeat reporter and a logging receiver on the
//! resource-manager component, so snapshots visibly flow across the cluster.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fabric_sync::transport::tcp::{TcpAcceptor, TcpConnector};
use fabric_sync::{serve, NodeId, SyncConfig, Syncer};

mod demo;

/// Demo node runner for the state fabric.
#[derive(Parser, Debug)]
#[command(name = "fabric-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Node id (defaults to a random id).
    #[arg(long, global = true)]
    node_id: Option<String>,

    /// Path to a TOML config file with fabric tunables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seconds between diagnostic dumps (0 disables them).
    #[arg(long, global = true, default_value_t = 10)]
    dump_interval: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Accept followers on a listen address.
    Hub {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:7400")]
        listen: String,
    },

    /// Follow a hub.
    Follow {
        /// Address of the hub.
        #[arg(long)]
        hub: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    let node_id = match &cli.node_id {
        Some(name) => NodeId::from_name(name).context("node id must be non-empty")?,
        None => NodeId::random(),
    };

    let syncer = Arc::new(Syncer::new(node_id, config));
    demo::register(&syncer);
    spawn_dump_loop(syncer.clone(), cli.dump_interval);

    match cli.command {
        Commands::Hub { listen } => run_hub(&syncer, &listen).await?,
        Commands::Follow { hub } => run_follower(&syncer, &hub).await?,
    }

    tracing::info!("shutting down");
    syncer.shutdown().await;
    Ok(())
}

async fn run_hub(syncer: &Arc<Syncer>, listen: &str) -> Result<()> {
    let acceptor = TcpAcceptor::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    tracing::info!(
        node = %syncer.node_id(),
        addr = %acceptor.local_addr()?,
        "hub listening"
    );

    let serve_task = tokio::spawn(serve(syncer.clone(), acceptor));
    tokio::signal::ctrl_c().await?;
    serve_task.abort();
    Ok(())
}

async fn run_follower(syncer: &Arc<Syncer>, hub: &str) -> Result<()> {
    let connector = TcpConnector::new(hub);
    let hub_id = syncer
        .follow(&connector)
        .await
        .with_context(|| format!("failed to follow hub at {hub}"))?;
    tracing::info!(node = %syncer.node_id(), hub = %hub_id, "following");

    tokio::signal::ctrl_c().await?;
    Ok(())
}

fn spawn_dump_loop(syncer: Arc<Syncer>, interval_secs: u64) {
    if interval_secs == 0 {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await; // the first tick fires immediately
        loop {
            interval.tick().await;
            let peers = syncer.peers().await;
            tracing::info!(peers = peers.len(), "fabric status");
            for line in syncer.diagnostics().await.to_string().lines() {
                tracing::info!("{line}");
            }
        }
    });
}
