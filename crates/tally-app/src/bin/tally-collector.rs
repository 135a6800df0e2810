//! # tally-collector
//!
//! Receives agent reports over HTTP and keeps them in memory, a snapshot
//! file or SQLite.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tally_app::collector::Collector;
use tally_app::lifecycle::LifecycleManager;
use tally_app::{init_tracing, resolve_config_path};
use tally_core::config::CollectorConfig;
use tally_web::CollectorServer;
use tracing::info;

/// tally metrics collector
#[derive(Parser, Debug)]
#[command(name = "tally-collector")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Listen address (host:port)
    #[arg(long, short = 'a')]
    address: Option<String>,

    /// Snapshot flush interval (seconds); 0 flushes on every write
    #[arg(long, short = 'i')]
    store_interval: Option<u64>,

    /// Snapshot file path
    #[arg(long, short = 'f')]
    file_storage_path: Option<PathBuf>,

    /// Load the snapshot at startup
    #[arg(long, short = 'r')]
    restore: Option<bool>,

    /// Delete a snapshot file that fails to parse
    #[arg(long)]
    remove_broken: Option<bool>,

    /// SQLite database (path, sqlite://path or :memory:)
    #[arg(long, short = 'd')]
    database_dsn: Option<String>,

    /// Integrity key for verifying records
    #[arg(long, short = 'k')]
    key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

/// defaults → file → environment → flags
fn load_config(args: &Args) -> Result<CollectorConfig> {
    let mut config = match resolve_config_path(args.config.as_deref(), "collector.json") {
        Some(path) => CollectorConfig::from_file(&path)?,
        None => CollectorConfig::default_config(),
    };
    config.apply_env()?;

    if let Some(address) = &args.address {
        config.address = address.clone();
    }
    if let Some(secs) = args.store_interval {
        config.store_interval_secs = secs;
    }
    if let Some(path) = &args.file_storage_path {
        config.file_storage_path = Some(path.clone());
    }
    if let Some(restore) = args.restore {
        config.restore = restore;
    }
    if let Some(remove) = args.remove_broken {
        config.remove_broken = remove;
    }
    if let Some(dsn) = &args.database_dsn {
        config.database_dsn = Some(dsn.clone());
    }
    if let Some(key) = &args.key {
        config.key = Some(key.clone());
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = load_config(&args).context("invalid collector configuration")?;
    info!("tally-collector v{}", env!("CARGO_PKG_VERSION"));

    // restore completes before the port is bound
    let collector = Collector::from_config(&config).await?;
    let listener = CollectorServer::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;

    let lifecycle = LifecycleManager::new();
    let server_task = tokio::spawn(collector.run(listener, lifecycle.subscribe()));

    // tasks are shut down even when the handlers fail to install
    let signalled = lifecycle.wait_for_signal().await;
    server_task.await??;
    signalled.context("failed to install signal handlers")?;

    info!("tally-collector stopped");
    Ok(())
}
