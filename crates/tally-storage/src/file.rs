//! JSON file snapshot backend.
//!
//! The whole snapshot lives in one file, `{"Gauges": {...}, "Counters": {...}}`,
//! rewritten in full on every write (sibling temp file, then rename). All I/O
//! on one instance is serialized by an async mutex.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tally_core::error::CoreError;
use tally_core::models::metric::{MetricKind, MetricValue, Snapshot};
use tally_core::ports::persistence::PersistenceBackend;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Snapshot file backend
pub struct FileBackend {
    path: PathBuf,
    remove_broken: bool,
    io_lock: Mutex<()>,
}

impl FileBackend {
    /// Backend for `path`, creating its parent directory when missing.
    ///
    /// With `remove_broken`, a file that cannot be parsed (or holds nothing)
    /// is deleted when read so it does not block later restarts.
    pub fn open(path: impl Into<PathBuf>, remove_broken: bool) -> Result<Self, CoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::BackendUnavailable(format!(
                    "failed to create snapshot directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        info!("file snapshot backend: {}", path.display());
        Ok(Self {
            path,
            remove_broken,
            io_lock: Mutex::new(()),
        })
    }

    /// Snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn discard_broken(&self, reason: &str) {
        if !self.remove_broken {
            return;
        }
        match fs::remove_file(&self.path).await {
            Ok(()) => warn!(
                "removed broken snapshot file {} ({reason})",
                self.path.display()
            ),
            Err(e) => warn!(
                "failed to remove broken snapshot file {}: {e}",
                self.path.display()
            ),
        }
    }

    /// Parse the file. `Ok(None)` when it does not exist.
    async fn read_file(&self) -> Result<Option<Snapshot>, CoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CoreError::CorruptOrEmptySnapshot(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )))
            }
        };
        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                self.discard_broken("unparseable").await;
                Err(CoreError::CorruptOrEmptySnapshot(format!(
                    "cannot parse {}: {e}",
                    self.path.display()
                )))
            }
        }
    }

    /// Read for a merge: a missing file counts as empty.
    async fn read_lenient(&self) -> Result<Snapshot, CoreError> {
        Ok(self.read_file().await?.unwrap_or_default())
    }

    /// Refuses snapshots with non-finite gauges: serde_json writes them as
    /// `null`, which `get_metrics` can never read back.
    async fn write_file(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        snapshot.check_finite()?;
        let body = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, &body).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(
            "snapshot written: {} ({} metrics)",
            self.path.display(),
            snapshot.len()
        );
        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn ping(&self) -> Result<(), CoreError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        match fs::metadata(&parent).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(CoreError::BackendUnavailable(format!(
                "{} is not a directory",
                parent.display()
            ))),
            Err(e) => Err(CoreError::BackendUnavailable(format!(
                "snapshot directory {} unavailable: {e}",
                parent.display()
            ))),
        }
    }

    async fn put(&self, name: &str, value: MetricValue) -> Result<(), CoreError> {
        let _guard = self.io_lock.lock().await;
        let mut snapshot = self.read_lenient().await?;
        snapshot.merge_value(name, value)?;
        self.write_file(&snapshot).await
    }

    async fn get(&self, name: &str) -> Result<MetricValue, CoreError> {
        let _guard = self.io_lock.lock().await;
        let snapshot = self.read_lenient().await?;
        snapshot
            .get(MetricKind::Gauge, name)
            .or_else(|| snapshot.get(MetricKind::Counter, name))
            .ok_or_else(|| CoreError::not_found(None, name))
    }

    async fn get_typed(&self, kind: MetricKind, name: &str) -> Result<MetricValue, CoreError> {
        let _guard = self.io_lock.lock().await;
        self.read_lenient()
            .await?
            .get(kind, name)
            .ok_or_else(|| CoreError::not_found(Some(kind), name))
    }

    async fn put_metrics(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        let _guard = self.io_lock.lock().await;
        let mut current = self.read_lenient().await?;
        current.merge(snapshot)?;
        self.write_file(&current).await
    }

    /// Strict read used by restore-on-start.
    async fn get_metrics(&self) -> Result<Snapshot, CoreError> {
        let _guard = self.io_lock.lock().await;
        let snapshot = self.read_file().await?.ok_or_else(|| {
            CoreError::CorruptOrEmptySnapshot(format!("{} does not exist", self.path.display()))
        })?;
        if snapshot.is_empty() {
            self.discard_broken("empty").await;
            return Err(CoreError::CorruptOrEmptySnapshot(format!(
                "{} holds no metrics",
                self.path.display()
            )));
        }
        Ok(snapshot)
    }

    async fn restore(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        let _guard = self.io_lock.lock().await;
        self.write_file(snapshot).await
    }
}
