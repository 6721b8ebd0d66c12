//! The [`Migration`] unit shared by every source.
//!
//! A migration is either declarative (SQL text loaded from a bundled file) or
//! imperative (a pair of functions registered at startup).  The runner only
//! ever calls [`Migration::apply`], so it never has to know which one it holds.

use std::fmt;

use rusqlite::Transaction;
use serde::Serialize;

use crate::error::StepResult;

/// Signature of an imperative migration payload.
pub type MigrationFn = fn(&Transaction<'_>) -> StepResult;

/// Largest version that fits the tracking table's signed `INTEGER` column.
pub const MAX_VERSION: u64 = i64::MAX as u64;

/// Versions start at 1 and must be storable as a SQLite integer.
pub fn is_valid_version(version: u64) -> bool {
    (1..=MAX_VERSION).contains(&version)
}

/// Where a migration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Declarative,
    Imperative,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Declarative => f.write_str("sql"),
            Kind::Imperative => f.write_str("code"),
        }
    }
}

/// Forward and backward payloads of a migration.
#[derive(Clone)]
pub enum Payload {
    Declarative { up: String, down: String },
    Imperative { up: MigrationFn, down: MigrationFn },
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Declarative { up, down } => f
                .debug_struct("Declarative")
                .field("up_len", &up.len())
                .field("down_len", &down.len())
                .finish(),
            Payload::Imperative { .. } => f.write_str("Imperative"),
        }
    }
}

/// One versioned schema change.
#[derive(Debug, Clone)]
pub struct Migration {
    version: u64,
    name: String,
    payload: Payload,
}

impl Migration {
    /// Build a declarative migration from its `up` and `down` SQL.
    pub fn declarative(
        version: u64,
        name: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            payload: Payload::Declarative {
                up: up.into(),
                down: down.into(),
            },
        }
    }

    /// Build an imperative migration from its forward and backward functions.
    pub fn imperative(version: u64, up: MigrationFn, down: MigrationFn) -> Self {
        Self {
            version,
            name: String::new(),
            payload: Payload::Imperative { up, down },
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Description taken from the file name; empty for imperative migrations.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        match self.payload {
            Payload::Declarative { .. } => Kind::Declarative,
            Payload::Imperative { .. } => Kind::Imperative,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Run the forward payload inside `tx`.
    pub fn apply(&self, tx: &Transaction<'_>) -> StepResult {
        match &self.payload {
            Payload::Declarative { up, .. } => tx.execute_batch(up).map_err(Into::into),
            Payload::Imperative { up, .. } => up(tx),
        }
    }

    /// Run the backward payload inside `tx`.
    ///
    /// The runner never calls this; it exists for operator tooling.
    pub fn revert(&self, tx: &Transaction<'_>) -> StepResult {
        match &self.payload {
            Payload::Declarative { down, .. } => tx.execute_batch(down).map_err(Into::into),
            Payload::Imperative { down, .. } => down(tx),
        }
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "v{:06} ({})", self.version, self.kind())
        } else {
            write!(f, "v{:06}_{} ({})", self.version, self.name, self.kind())
        }
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;

    fn create_notes(tx: &Transaction<'_>) -> StepResult {
        tx.execute_batch("CREATE TABLE notes (body TEXT NOT NULL);")?;
        Ok(())
    }

    fn drop_notes(tx: &Transaction<'_>) -> StepResult {
        tx.execute_batch("DROP TABLE notes;")?;
        Ok(())
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn declarative_apply_and_revert() {
        let mut conn = Connection::open_in_memory().unwrap();
        let m = Migration::declarative(
            1,
            "create_tags",
            "CREATE TABLE tags (name TEXT);",
            "DROP TABLE tags;",
        );
        assert_eq!(m.kind(), Kind::Declarative);

        let tx = conn.transaction().unwrap();
        m.apply(&tx).unwrap();
        tx.commit().unwrap();
        assert!(table_exists(&conn, "tags"));

        let tx = conn.transaction().unwrap();
        m.revert(&tx).unwrap();
        tx.commit().unwrap();
        assert!(!table_exists(&conn, "tags"));
    }

    #[test]
    fn imperative_apply_and_revert() {
        let mut conn = Connection::open_in_memory().unwrap();
        let m = Migration::imperative(3, create_notes, drop_notes);
        assert_eq!(m.kind(), Kind::Imperative);

        let tx = conn.transaction().unwrap();
        m.apply(&tx).unwrap();
        tx.commit().unwrap();
        assert!(table_exists(&conn, "notes"));

        let tx = conn.transaction().unwrap();
        m.revert(&tx).unwrap();
        tx.commit().unwrap();
        assert!(!table_exists(&conn, "notes"));
    }

    #[test]
    fn display_includes_version_and_kind() {
        let sql = Migration::declarative(12, "add_index", "", "");
        assert_eq!(sql.to_string(), "v000012_add_index (sql)");

        let code = Migration::imperative(3, create_notes, drop_notes);
        assert_eq!(code.to_string(), "v000003 (code)");
    }
}
