//! Tracking table bookkeeping.
//!
//! The `migrations` table lives in the migrated database itself.  A row is
//! written as dirty in the same transaction as its payload and flipped to
//! clean just before commit, so schema change and bookkeeping land together.
//! A dirty row that survives a run blocks every later run until an operator
//! removes it with [`clear_dirty`].

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{MigrateError, Result};

/// Name of the tracking table.
pub const TABLE: &str = "migrations";

const CREATE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    version    INTEGER PRIMARY KEY,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    dirty      BOOLEAN DEFAULT FALSE
);
"#;

/// One row of the tracking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRecord {
    pub version: u64,
    pub applied_at: Option<NaiveDateTime>,
    pub dirty: bool,
}

/// Create the tracking table if it does not exist yet.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_SQL)?;
    Ok(())
}

/// Whether the tracking table has been created.
pub fn table_exists(conn: &Connection) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![TABLE],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Versions currently marked dirty, ascending.
pub fn dirty_versions(conn: &Connection) -> Result<Vec<u64>> {
    let mut stmt =
        conn.prepare("SELECT version FROM migrations WHERE dirty = 1 ORDER BY version ASC")?;
    let rows = stmt.query_map([], |row| read_version(row, 0))?;

    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

/// Versions recorded as successfully applied.
pub fn applied_versions(conn: &Connection) -> Result<BTreeSet<u64>> {
    let mut stmt = conn.prepare("SELECT version FROM migrations WHERE dirty = 0")?;
    let rows = stmt.query_map([], |row| read_version(row, 0))?;

    let mut versions = BTreeSet::new();
    for row in rows {
        versions.insert(row?);
    }
    Ok(versions)
}

/// Every tracking row, ascending by version.
pub fn records(conn: &Connection) -> Result<Vec<TrackingRecord>> {
    let mut stmt = conn.prepare(
        "SELECT version, applied_at, dirty
         FROM migrations
         ORDER BY version ASC",
    )?;
    let rows = stmt.query_map([], row_to_record)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Insert (or replace) a dirty row for `version`.
///
/// Called with the migration's transaction so that a crash before commit
/// leaves no row at all.
pub fn begin_record(conn: &Connection, version: u64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO migrations (version, applied_at, dirty)
         VALUES (?1, CURRENT_TIMESTAMP, 1)",
        params![sql_version(version)?],
    )?;
    Ok(())
}

/// Mark `version` as cleanly applied.  Must run in the migration's transaction.
pub fn commit_record(conn: &Connection, version: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO migrations (version, applied_at, dirty)
         VALUES (?1, CURRENT_TIMESTAMP, 0)
         ON CONFLICT(version) DO UPDATE SET dirty = 0, applied_at = CURRENT_TIMESTAMP",
        params![sql_version(version)?],
    )?;
    Ok(())
}

/// Leave a dirty breadcrumb for `version` outside of any transaction.
pub fn mark_failed(conn: &Connection, version: u64) -> Result<()> {
    begin_record(conn, version)
}

/// Remove the dirty row for `version`.  Returns `true` if a row was deleted.
///
/// Operator tooling only; the runner never repairs dirty state on its own.
pub fn clear_dirty(conn: &Connection, version: u64) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM migrations WHERE version = ?1 AND dirty = 1",
        params![sql_version(version)?],
    )?;
    Ok(affected > 0)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Versions are stored as SQLite integers, which are signed.
fn sql_version(version: u64) -> Result<i64> {
    i64::try_from(version).map_err(|_| MigrateError::InvalidVersion(version))
}

fn read_version(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}

/// Map a `rusqlite::Row` to a [`TrackingRecord`].
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackingRecord> {
    let version = read_version(row, 0)?;
    let applied_str: Option<String> = row.get(1)?;
    let dirty: bool = row.get(2)?;

    // Rows edited by hand may carry another format; report them without a time.
    let applied_at = applied_str
        .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok());

    Ok(TrackingRecord {
        version,
        applied_at,
        dirty,
    })
}
