//! # tally-app
//!
//! Wiring for the `tally-agent` and `tally-collector` binaries:
//! agent scheduler, collector backend selection, lifecycle and logging.

pub mod agent_scheduler;
pub mod collector;
pub mod lifecycle;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .try_init();
}

/// Config file to load.
///
/// An explicit `--config` path is always used. Otherwise `file_name` in the
/// platform config directory is used when it exists:
/// - macOS: `~/Library/Application Support/io.tally.tally/`
/// - Windows: `%APPDATA%\tally\tally\config\`
/// - Linux: `~/.config/tally/`
pub fn resolve_config_path(explicit: Option<&Path>, file_name: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    ProjectDirs::from("io", "tally", "tally")
        .map(|dirs| dirs.config_dir().join(file_name))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_path_wins() {
        let path = Path::new("/etc/tally/agent.json");
        assert_eq!(
            resolve_config_path(Some(path), "agent.json"),
            Some(path.to_path_buf())
        );
    }

    #[test]
    fn missing_default_config_is_none() {
        assert_eq!(
            resolve_config_path(None, "does-not-exist-7f3a.json"),
            None
        );
    }
}
