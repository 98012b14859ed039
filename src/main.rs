//! Build master binary.
//!
//! Startup order matters: configuration is loaded and validated first,
//! the metrics recorder is installed, then the route tree is compiled —
//! a duplicate pattern aborts here, before the listener is bound — and
//! only then does the server accept connections.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use build_master::api::ApiContext;
use build_master::cluster::InMemoryCluster;
use build_master::config::{load_config, MasterConfig};
use build_master::http::HttpServer;
use build_master::observability::{default_env_filter, metrics};

#[derive(Parser, Debug)]
#[command(name = "build-master", about = "Distributed build-execution master")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => MasterConfig::default(),
    };

    // Initialize tracing subscriber; the configured level is the
    // fallback when RUST_LOG is unset.
    tracing_subscriber::registry()
        .with(default_env_filter(&config.observability.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        bind_address = %config.listener.bind_address,
        results_directory = %config.storage.results_directory,
        "Configuration loaded"
    );

    let metrics_handle = if config.observability.metrics_enabled {
        metrics::install_recorder()
    } else {
        None
    };

    let cluster = Arc::new(InMemoryCluster::new(&config.storage.results_directory));
    let context = ApiContext::from_cluster(cluster, config.clone(), metrics_handle);

    // Route ambiguity is fatal here, before any request is accepted.
    let server = HttpServer::new(config.clone(), context)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
