//! # tally-agent
//!
//! Samples this process and the host, and reports to a collector.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tally_app::agent_scheduler::{AgentScheduler, AgentSchedulerConfig};
use tally_app::lifecycle::LifecycleManager;
use tally_app::{init_tracing, resolve_config_path};
use tally_core::config::AgentConfig;
use tally_core::protocol::SyncCodec;
use tally_core::store::MetricStore;
use tally_monitor::process::RuntimeSource;
use tally_monitor::system::SystemSource;
use tally_network::compression::GzipCodec;
use tally_network::http_client::HttpTransport;
use tracing::info;

/// tally metrics agent
#[derive(Parser, Debug)]
#[command(name = "tally-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Collector address (host:port or URL)
    #[arg(long, short = 'a')]
    address: Option<String>,

    /// Poll interval (seconds)
    #[arg(long, short = 'p')]
    poll_interval: Option<u64>,

    /// Report interval (seconds)
    #[arg(long, short = 'r')]
    report_interval: Option<u64>,

    /// Integrity key for signing records
    #[arg(long, short = 'k')]
    key: Option<String>,

    /// Per-request timeout (milliseconds)
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Send uncompressed request bodies
    #[arg(long)]
    no_compress: bool,

    /// Skip host-wide memory/CPU metrics
    #[arg(long)]
    no_system_metrics: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

/// defaults → file → environment → flags
fn load_config(args: &Args) -> Result<AgentConfig> {
    let mut config = match resolve_config_path(args.config.as_deref(), "agent.json") {
        Some(path) => AgentConfig::from_file(&path)?,
        None => AgentConfig::default_config(),
    };
    config.apply_env()?;

    if let Some(address) = &args.address {
        config.server_address = address.clone();
    }
    if let Some(secs) = args.poll_interval {
        config.poll_interval_secs = secs;
    }
    if let Some(secs) = args.report_interval {
        config.report_interval_secs = secs;
    }
    if let Some(key) = &args.key {
        config.key = Some(key.clone());
    }
    if let Some(ms) = args.request_timeout_ms {
        config.request_timeout_ms = ms;
    }
    if args.no_compress {
        config.compress = false;
    }
    if args.no_system_metrics {
        config.system_metrics = false;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = load_config(&args).context("invalid agent configuration")?;
    info!(
        "tally-agent v{} → {}",
        env!("CARGO_PKG_VERSION"),
        config.base_url()
    );

    let mut transport = HttpTransport::new(&config.base_url(), config.request_timeout())?;
    if config.compress {
        transport = transport.with_codec(Arc::new(GzipCodec::new()));
    }

    let mut scheduler = AgentScheduler::new(
        AgentSchedulerConfig::from(&config),
        Arc::new(MetricStore::new()),
        Arc::new(transport),
        SyncCodec::from_secret(config.key.as_deref()),
    )
    .with_source(Arc::new(RuntimeSource::new()?));
    if config.system_metrics {
        scheduler = scheduler.with_source(Arc::new(SystemSource::new()));
    }

    let lifecycle = LifecycleManager::new();
    let shutdown_rx = lifecycle.subscribe();
    let scheduler_task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    // tasks are shut down even when the handlers fail to install
    let signalled = lifecycle.wait_for_signal().await;
    scheduler_task.await?;
    signalled.context("failed to install signal handlers")?;

    info!("tally-agent stopped");
    Ok(())
}
