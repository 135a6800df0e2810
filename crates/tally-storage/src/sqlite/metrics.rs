//! `PersistenceBackend` implementation for SQLite.
//!
//! One row per metric name. The table keys on `id` alone, so a name holds a
//! single kind here; writing the other kind under the same name converts the
//! row.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tally_core::error::CoreError;
use tally_core::models::metric::{checked_total, finite_gauge, MetricKind, MetricValue, Snapshot};
use tally_core::ports::persistence::PersistenceBackend;
use tracing::{debug, info};

use super::{SqliteBackend, TxError};

/// Gauge: UPDATE, then INSERT when no row matched.
///
/// SQLite stores NaN as NULL, so non-finite values are refused up front.
fn put_gauge(conn: &Connection, name: &str, value: f64) -> Result<(), TxError> {
    let value = finite_gauge(name, value)?;
    let updated = conn
        .prepare_cached("UPDATE metrics SET type = 'gauge', value = ?2, delta = NULL WHERE id = ?1")?
        .execute(params![name, value])?;
    if updated == 0 {
        conn.prepare_cached(
            "INSERT INTO metrics (id, type, value, delta) VALUES (?1, 'gauge', ?2, NULL)",
        )?
        .execute(params![name, value])?;
    }
    Ok(())
}

/// Counter: read current delta, add, UPDATE or INSERT. Caller owns the
/// transaction and rolls it back on overflow.
fn add_counter(conn: &Connection, name: &str, delta: i64) -> Result<(), TxError> {
    let current: Option<(String, Option<i64>)> = conn
        .prepare_cached("SELECT type, delta FROM metrics WHERE id = ?1")?
        .query_row(params![name], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;

    match current {
        Some((kind, existing)) => {
            let base = if kind == "counter" {
                existing.unwrap_or(0)
            } else {
                0
            };
            let total = checked_total(name, base, delta)?;
            conn.prepare_cached(
                "UPDATE metrics SET type = 'counter', value = NULL, delta = ?2 WHERE id = ?1",
            )?
            .execute(params![name, total])?;
        }
        None => {
            conn.prepare_cached(
                "INSERT INTO metrics (id, type, value, delta) VALUES (?1, 'counter', NULL, ?2)",
            )?
            .execute(params![name, delta])?;
        }
    }
    Ok(())
}

/// Decode `(type, value, delta)` columns starting at `offset`.
fn row_value(row: &Row<'_>, offset: usize) -> Result<Option<MetricValue>, rusqlite::Error> {
    let kind: String = row.get(offset)?;
    let value: Option<f64> = row.get(offset + 1)?;
    let delta: Option<i64> = row.get(offset + 2)?;
    Ok(match kind.as_str() {
        "gauge" => value.map(MetricValue::Gauge),
        "counter" => delta.map(MetricValue::Counter),
        _ => None,
    })
}

fn read_one(
    conn: &Connection,
    name: &str,
    kind: Option<MetricKind>,
) -> Result<Option<MetricValue>, rusqlite::Error> {
    let found = match kind {
        None => conn
            .prepare_cached("SELECT type, value, delta FROM metrics WHERE id = ?1")?
            .query_row(params![name], |row| row_value(row, 0))
            .optional()?,
        Some(kind) => conn
            .prepare_cached("SELECT type, value, delta FROM metrics WHERE id = ?1 AND type = ?2")?
            .query_row(params![name, kind.as_str()], |row| row_value(row, 0))
            .optional()?,
    };
    Ok(found.flatten())
}

fn write_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<(), TxError> {
    for (name, v) in &snapshot.gauges {
        put_gauge(conn, name, *v)?;
    }
    for (name, d) in &snapshot.counters {
        add_counter(conn, name, *d)?;
    }
    Ok(())
}

#[async_trait]
impl PersistenceBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> Result<(), CoreError> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("lock acquisition failed: {e}")))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| CoreError::BackendUnavailable("connection is closed".to_string()))?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| CoreError::BackendUnavailable(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn put(&self, name: &str, value: MetricValue) -> Result<(), CoreError> {
        self.with_conn("metric write failed", |conn| -> Result<(), TxError> {
            match value {
                MetricValue::Gauge(v) => put_gauge(conn, name, v),
                MetricValue::Counter(d) => {
                    let tx = conn.transaction()?;
                    add_counter(&tx, name, d)?;
                    tx.commit()?;
                    Ok(())
                }
            }
        })
    }

    async fn get(&self, name: &str) -> Result<MetricValue, CoreError> {
        self.with_conn("metric query failed", |conn| read_one(conn, name, None))?
            .ok_or_else(|| CoreError::not_found(None, name))
    }

    async fn get_typed(&self, kind: MetricKind, name: &str) -> Result<MetricValue, CoreError> {
        self.with_conn("metric query failed", |conn| read_one(conn, name, Some(kind)))?
            .ok_or_else(|| CoreError::not_found(Some(kind), name))
    }

    async fn put_metrics(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        self.with_conn("batch write failed", |conn| {
            let tx = conn.transaction()?;
            write_snapshot(&tx, snapshot)?;
            tx.commit()?;
            Ok::<_, TxError>(())
        })?;
        debug!("SQLite batch merged: {} metrics", snapshot.len());
        Ok(())
    }

    async fn get_metrics(&self) -> Result<Snapshot, CoreError> {
        self.with_conn("metric listing failed", |conn| {
            let mut stmt = conn.prepare_cached("SELECT id, type, value, delta FROM metrics")?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                Ok((id, row_value(row, 1)?))
            })?;

            let mut snapshot = Snapshot::new();
            for row in rows {
                let (id, value) = row?;
                if let Some(value) = value {
                    snapshot.merge_value(&id, value)?;
                }
            }
            Ok::<_, TxError>(snapshot)
        })
    }

    async fn restore(&self, snapshot: &Snapshot) -> Result<(), CoreError> {
        self.with_conn("restore failed", |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM metrics", [])?;
            write_snapshot(&tx, snapshot)?;
            tx.commit()?;
            Ok::<_, TxError>(())
        })?;
        debug!("SQLite contents replaced: {} metrics", snapshot.len());
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), CoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("lock acquisition failed: {e}")))?;
        if let Some(conn) = guard.take() {
            conn.flush_prepared_statement_cache();
            conn.close()
                .map_err(|(_, e)| CoreError::Internal(format!("SQLite close failed: {e}")))?;
            info!("SQLite connection closed");
        }
        Ok(())
    }
}
