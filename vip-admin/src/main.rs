//! VIP Stats API
//!
//! Standalone dashboard statistics server. The controller pushes one
//! `/update` per forwarding decision; the dashboard polls `/stats`.

#![deny(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vip_core::config::{load_config_with_env, ENV_LOG_LEVEL};
use vip_core::stats::SharedStats;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "vip-stats", version, about = "Dashboard statistics API for the VIP load balancer")]
struct Args {
    /// Configuration file (backend list and window sizes); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

/// Starts the stats API and serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config loading logs through a bootstrap subscriber; the configured
    // level only applies once the config is known.
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(log_filter(&bootstrap_level()))
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || {
        load_config_with_env(args.config.as_deref())
    })
    .context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&config.log.level))
        .init();

    let backends = config.backend_table().context("building backend table")?;
    let stats = SharedStats::new(config.stats_store(&backends));

    info!("{}", "=".repeat(60));
    info!("VIP Load Balancer Stats API");
    info!("Stats endpoint: http://{}/stats", args.listen);
    info!("Update endpoint: http://{}/update (POST)", args.listen);
    for (i, backend) in backends.iter().enumerate() {
        info!("  {}. {}", i + 1, backend.address);
    }
    info!("{}", "=".repeat(60));

    vip_admin::start_server(args.listen, stats, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .context("running stats API")?;

    info!("Shutting down gracefully.");
    Ok(())
}

/// `RUST_LOG` when set, otherwise `level`.
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn bootstrap_level() -> String {
    std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string())
}
