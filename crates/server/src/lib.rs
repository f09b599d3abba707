use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

pub mod client;
pub mod command;
pub mod config;
pub mod db;
pub mod net;
pub mod tracing_config;

use crate::config::ServerProperties;
use crate::db::MultiDb;
use crate::tracing_config::TracingConfig;

const BANNER: &str = r"
 ██████╗ ███████╗██████╗ ██╗███████╗
██╔════╝ ██╔════╝██╔══██╗██║██╔════╝
██║  ███╗█████╗  ██║  ██║██║███████╗
██║   ██║██╔══╝  ██║  ██║██║╚════██║
╚██████╔╝███████╗██████╔╝██║███████║
 ╚═════╝ ╚══════╝╚═════╝ ╚═╝╚══════╝
";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration (overrides the CONFIG environment
    /// variable)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Use JSON format for logs (recommended for production)
    #[arg(long)]
    log_json: bool,
}

pub async fn run() -> Result<()> {
    let args = Args::parse();
    println!("{BANNER}");

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    TracingConfig {
        level,
        json_format: args.log_json,
        ..TracingConfig::default()
    }
    .init();

    let props = ServerProperties::resolve(args.config.as_deref())?;
    info!(
        bind = %props.bind,
        port = props.port,
        databases = props.databases,
        maxclients = props.maxclients,
        auth = !props.requirepass.is_empty(),
        "starting gedis"
    );
    if !props.peers.is_empty() {
        warn!(
            peers = props.peers.len(),
            "peers are configured but replication is not supported; ignoring"
        );
    }

    let db = Arc::new(MultiDb::new(&props));
    let server = net::Server::new(db, &props);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    let addr = format!("{}:{}", props.bind, props.port);
    server.run_with_shutdown(&addr, shutdown_rx).await?;
    info!("server shutdown complete");
    Ok(())
}
