//! VIP Load Balancer Controller
//!
//! The Tokio engine that answers ARP for the virtual address, picks a backend
//! for every new flow, installs the forward/reverse rewrite rules and keeps
//! the distribution statistics the dashboard shows.

#![deny(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use vip_core::config::{default_config_json, load_config_with_env, ENV_LOG_LEVEL};
use vip_core::stats::SharedStats;

mod engine;
mod notifier;
mod reporter;
mod transport;

use engine::LoadBalancingEngine;
use notifier::StatsNotifier;
use transport::ChannelSink;

/// Inbound events buffered between the transport reader and the engine.
const EVENT_QUEUE_DEPTH: usize = 1024;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "vip-controller", version, about = "Software-defined load balancer controller")]
struct Args {
    /// Configuration file path; built-in defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Selection policy (round_robin or least_connections), overrides the config
    #[arg(short, long)]
    policy: Option<String>,

    /// Check configuration and exit
    #[arg(long)]
    check: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_default_config: bool,
}

/// The primary entrypoint for the controller.
///
/// Packet events are read from stdin and rule/reply messages written to
/// stdout, one JSON object per line; logs go to stderr.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_default_config {
        println!("{}", default_config_json()?);
        return Ok(());
    }

    // Config loading logs through a bootstrap subscriber; the configured
    // level only applies once the config is known.
    let bootstrap = bootstrap_subscriber(std::io::stderr, &bootstrap_level());
    let mut config = tracing::subscriber::with_default(bootstrap, || {
        load_config_with_env(args.config.as_deref())
    })
    .context("loading configuration")?;
    if let Some(policy) = args.policy {
        config.policy = policy;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(&config.log.level))
        .init();

    let backends = Arc::new(config.backend_table().context("building backend table")?);
    let policy = config.selection_policy();

    if args.check {
        info!("Configuration OK: {} backends, policy {}", backends.len(), policy);
        return Ok(());
    }

    info!("{}", "=".repeat(60));
    info!("Load Balancer Controller initialized");
    info!("Algorithm: {}", policy);
    info!(
        "Virtual IP: {} (MAC: {})",
        config.virtual_service.address, config.virtual_service.mac
    );
    info!("Backend Servers:");
    for (i, backend) in backends.iter().enumerate() {
        info!("  {}. {}", i + 1, backend);
    }
    match config.notification_url() {
        Some(url) => info!("Dashboard API: {}", url),
        None => info!("Dashboard API: Disabled"),
    }
    info!("{}", "=".repeat(60));

    if let (Some(addr), Some(url)) = (config.stats.listen, &config.dashboard.url) {
        info!("Stats API embedded on {}; not pushing decisions to {}", addr, url);
    }

    let stats = SharedStats::new(config.stats_store(&backends));

    let api = config.stats.listen.map(|addr| {
        let stats = stats.clone();
        tokio::spawn(async move {
            if let Err(err) = vip_admin::start_server(addr, stats, std::future::pending()).await {
                warn!("Embedded stats API stopped: {}", err);
            }
        })
    });

    let (notifier, notifier_worker) = StatsNotifier::from_config(&config)
        .with_context(|| format!("invalid dashboard URL {:?}", config.dashboard.url))?
        .unzip();

    let reporter = reporter::spawn_stats_reporter(stats.clone(), config.stats.report_interval());

    let (sink, outbound) = ChannelSink::new();
    let writer = transport::spawn_stdout_writer(outbound);
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let reader = transport::spawn_stdin_reader(event_tx);

    let engine = LoadBalancingEngine::new(
        config.virtual_service,
        backends,
        policy,
        config.flow,
        stats,
        sink,
    )
    .with_notifier(notifier);

    tokio::select! {
        _ = engine.run(event_rx) => info!("Event stream closed"),
        _ = tokio::signal::ctrl_c() => info!("Interrupt received"),
    }

    reader.abort();
    reporter.abort();
    if let Some(worker) = notifier_worker {
        worker.abort();
    }
    if let Some(api) = api {
        api.abort();
    }
    // The engine (and its sink) is gone, so the writer drains and exits.
    let _ = writer.await;

    info!("Shutting down gracefully.");
    Ok(())
}

/// `RUST_LOG` when set, otherwise `level`.
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Subscriber active while the configuration itself is being loaded.
fn bootstrap_subscriber<W>(writer: W, level: &str) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(log_filter(level))
        .finish()
}

fn bootstrap_level() -> String {
    std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string())
}
