//! SQLite persistence backend.
//!
//! Implements the `PersistenceBackend` port over one `metrics` table.
//!
//! # Module layout
//! - `metrics`: port implementation and row helpers

mod metrics;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tally_core::error::CoreError;
use tracing::info;

use crate::migration;

/// How long a statement waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite backend. `None` inside the mutex means the connection was closed
/// by `shutdown`.
pub struct SqliteBackend {
    pub(super) conn: Mutex<Option<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) a database from a DSN.
    ///
    /// Accepts a plain file path, `sqlite://<path>` or `:memory:`. Any open or
    /// migration failure is returned as `BackendUnavailable`.
    pub fn open_dsn(dsn: &str) -> Result<Self, CoreError> {
        let dsn = dsn.trim();
        let path = dsn.strip_prefix("sqlite://").unwrap_or(dsn);
        if path == ":memory:" {
            return Self::open_in_memory();
        }
        Self::open(Path::new(path))
    }

    /// File-backed database
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|e| {
            CoreError::BackendUnavailable(format!("failed to open {}: {e}", path.display()))
        })?;

        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            ",
        )
        .map_err(|e| CoreError::BackendUnavailable(format!("PRAGMA setup failed: {e}")))?;

        let backend = Self::init(conn)?;
        info!("SQLite backend ready: {}", path.display());
        Ok(backend)
    }

    /// In-memory database (tests, `:memory:` DSN)
    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            CoreError::BackendUnavailable(format!("failed to open in-memory SQLite: {e}"))
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, CoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| CoreError::BackendUnavailable(format!("busy_timeout failed: {e}")))?;
        migration::run_migrations(&conn)
            .map_err(|e| CoreError::BackendUnavailable(format!("migration failed: {e}")))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Run `f` against the open connection.
    ///
    /// `ctx` prefixes the error message when `f` fails on SQL. Rejected input
    /// passes through as its own `CoreError`.
    pub(super) fn with_conn<T, E, F>(&self, ctx: &str, f: F) -> Result<T, CoreError>
    where
        E: Into<TxError>,
        F: FnOnce(&mut Connection) -> Result<T, E>,
    {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("lock acquisition failed: {e}")))?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| CoreError::BackendUnavailable("connection is closed".to_string()))?;
        f(conn).map_err(|e| match e.into() {
            TxError::Sql(e) => CoreError::Internal(format!("{ctx}: {e}")),
            TxError::Rejected(e) => e,
        })
    }
}

/// Failure inside a `with_conn` closure
#[derive(Debug)]
pub(super) enum TxError {
    Sql(rusqlite::Error),
    /// Input refused before it reached the table; the transaction rolls back
    Rejected(CoreError),
}

impl From<rusqlite::Error> for TxError {
    fn from(e: rusqlite::Error) -> Self {
        TxError::Sql(e)
    }
}

impl From<CoreError> for TxError {
    fn from(e: CoreError) -> Self {
        TxError::Rejected(e)
    }
}
