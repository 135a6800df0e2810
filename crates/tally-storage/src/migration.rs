//! Schema migration.
//!
//! Version-based SQLite schema management.

use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
const CURRENT_VERSION: u32 = 2;

/// Run pending schema migrations
pub fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = get_version(conn)?;
    info!("schema version: {current}, target: {CURRENT_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }

    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Current schema version
fn get_version(conn: &Connection) -> Result<u32, rusqlite::Error> {
    let result: Result<u32, _> = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    );
    result.or(Ok(0))
}

/// V1: metrics table
fn migrate_v1(conn: &Connection) -> Result<(), rusqlite::Error> {
    debug!("running migration V1: metrics table");

    conn.execute_batch(
        "
        -- one row per metric; gauges use value, counters use delta
        CREATE TABLE IF NOT EXISTS metrics (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            value REAL,
            delta INTEGER
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;

    info!("migration V1 done");
    Ok(())
}

/// V2: type index for per-namespace listing
fn migrate_v2(conn: &Connection) -> Result<(), rusqlite::Error> {
    debug!("running migration V2: metrics type index");

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_metrics_type ON metrics(type);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )?;

    info!("migration V2 done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_creates_metrics_table() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='metrics'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name='idx_metrics_type'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
