//! Agent and collector configuration.
//!
//! Layering, lowest priority first: built-in defaults, an optional JSON
//! config file, `TALLY_*` environment variables, then CLI flags (applied by
//! the binaries). `validate()` runs once on the merged result before any
//! component is wired.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;

/// Environment variable prefix shared by both binaries
pub const ENV_PREFIX: &str = "TALLY_";

// ============================================================
// Agent
// ============================================================

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Collector address, `host:port` or full URL
    #[serde(default = "default_server_address")]
    pub server_address: String,
    /// Sampling period (seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Reporting period (seconds)
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    /// Per-request timeout (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Shared integrity secret; records are signed when set
    #[serde(default)]
    pub key: Option<String>,
    /// Gzip request bodies
    #[serde(default = "default_true")]
    pub compress: bool,
    /// Also sample host-wide memory and per-core CPU
    #[serde(default = "default_true")]
    pub system_metrics: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl AgentConfig {
    /// Built-in defaults
    pub fn default_config() -> Self {
        Self {
            server_address: default_server_address(),
            poll_interval_secs: default_poll_interval_secs(),
            report_interval_secs: default_report_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            key: None,
            compress: true,
            system_metrics: true,
        }
    }

    /// Read a JSON config file; absent fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        load_json(path)
    }

    /// Overlay `TALLY_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), CoreError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay variables from an arbitrary lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(lookup);
        if let Some(v) = env.string("ADDRESS") {
            self.server_address = v;
        }
        if let Some(v) = env.parsed("POLL_INTERVAL")? {
            self.poll_interval_secs = v;
        }
        if let Some(v) = env.parsed("REPORT_INTERVAL")? {
            self.report_interval_secs = v;
        }
        if let Some(v) = env.parsed("REQUEST_TIMEOUT_MS")? {
            self.request_timeout_ms = v;
        }
        if let Some(v) = env.string("KEY") {
            self.key = Some(v);
        }
        if let Some(v) = env.parsed("COMPRESS")? {
            self.compress = v;
        }
        if let Some(v) = env.parsed("SYSTEM_METRICS")? {
            self.system_metrics = v;
        }
        Ok(())
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.server_address.trim().is_empty() {
            return Err(CoreError::Config("server_address is empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(CoreError::Config(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.report_interval_secs == 0 {
            return Err(CoreError::Config(
                "report_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(CoreError::Config(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Collector base URL with a scheme
    pub fn base_url(&self) -> String {
        let addr = self.server_address.trim().trim_end_matches('/');
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        }
    }

    /// Sampling period as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Reporting period as a `Duration`
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ============================================================
// Collector
// ============================================================

/// Collector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Listen address `host:port`
    #[serde(default = "default_listen_address")]
    pub address: String,
    /// Snapshot flush period (seconds); 0 flushes on every write
    #[serde(default = "default_store_interval_secs")]
    pub store_interval_secs: u64,
    /// Snapshot file; `None` disables file persistence
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: Option<PathBuf>,
    /// Load the snapshot file into the store at startup
    #[serde(default = "default_true")]
    pub restore: bool,
    /// Delete a snapshot file that fails to parse
    #[serde(default)]
    pub remove_broken: bool,
    /// SQLite database path; takes precedence over the file snapshot
    #[serde(default)]
    pub database_dsn: Option<String>,
    /// Shared integrity secret; hashed records are verified when set
    #[serde(default)]
    pub key: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl CollectorConfig {
    /// Built-in defaults
    pub fn default_config() -> Self {
        Self {
            address: default_listen_address(),
            store_interval_secs: default_store_interval_secs(),
            file_storage_path: default_file_storage_path(),
            restore: true,
            remove_broken: false,
            database_dsn: None,
            key: None,
        }
    }

    /// Read a JSON config file; absent fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        load_json(path)
    }

    /// Overlay `TALLY_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), CoreError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay variables from an arbitrary lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(lookup);
        if let Some(v) = env.string("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = env.parsed("STORE_INTERVAL")? {
            self.store_interval_secs = v;
        }
        if let Some(v) = env.raw("FILE_STORAGE_PATH") {
            // An explicitly empty path turns file persistence off.
            self.file_storage_path = if v.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        if let Some(v) = env.parsed("RESTORE")? {
            self.restore = v;
        }
        if let Some(v) = env.parsed("REMOVE_BROKEN")? {
            self.remove_broken = v;
        }
        if let Some(v) = env.string("DATABASE_DSN") {
            self.database_dsn = Some(v);
        }
        if let Some(v) = env.string("KEY") {
            self.key = Some(v);
        }
        Ok(())
    }

    /// Reject settings the collector cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.address.trim().is_empty() {
            return Err(CoreError::Config("address is empty".to_string()));
        }
        if let Some(path) = &self.file_storage_path {
            if path.as_os_str().is_empty() {
                return Err(CoreError::Config(
                    "file_storage_path is empty; omit it to disable".to_string(),
                ));
            }
        }
        if matches!(&self.database_dsn, Some(dsn) if dsn.trim().is_empty()) {
            return Err(CoreError::Config(
                "database_dsn is empty; omit it to disable".to_string(),
            ));
        }
        Ok(())
    }

    /// Flush period as a `Duration` (zero means synchronous mode)
    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    /// `true` when every write should be flushed immediately
    pub fn is_synchronous_flush(&self) -> bool {
        self.store_interval_secs == 0
    }
}

// ============================================================
// Loading helpers
// ============================================================

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, CoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CoreError::Config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    let parsed = serde_json::from_str(&content).map_err(|e| {
        CoreError::Config(format!(
            "failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;
    debug!("config loaded: {}", path.display());
    Ok(parsed)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self { lookup }
    }

    fn raw(&self, suffix: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{suffix}"))
    }

    fn string(&self, suffix: &str) -> Option<String> {
        self.raw(suffix).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T>(&self, suffix: &str) -> Result<Option<T>, CoreError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(suffix) {
            None => Ok(None),
            Some(v) => v.trim().parse::<T>().map(Some).map_err(|e| {
                CoreError::Config(format!("{ENV_PREFIX}{suffix}={v:?} is invalid: {e}"))
            }),
        }
    }
}

// ============================================================
// Default value functions
// ============================================================

fn default_true() -> bool {
    true
}

fn default_server_address() -> String {
    "localhost:8080".to_string()
}
fn default_listen_address() -> String {
    "localhost:8080".to_string()
}
fn default_poll_interval_secs() -> u64 {
    2
}
fn default_report_interval_secs() -> u64 {
    10
}
fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_store_interval_secs() -> u64 {
    300
}
fn default_file_storage_path() -> Option<PathBuf> {
    Some(std::env::temp_dir().join("tally-metrics.json"))
}
