//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations have run before any other operation.  If they fail, no handle
//! is returned: the connection is dropped, which is also what makes a
//! restored backup safe to reopen.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempo_migrate::{MigrationStatus, RunnerOptions};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::migrations;

/// Wrapper around a migrated [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database described by `config`.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let db_path = config.resolve_db_path()?;

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path, config.runner_options())
    }

    /// Open (or create) a database at an explicit path.
    ///
    /// This is useful for tests and for embedding the store inside custom
    /// directory layouts.
    pub fn open_at(path: &Path, options: RunnerOptions) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Run schema migrations before switching to WAL so a fresh file is
        // backed up as a single self-contained file.
        migrations::run_migrations(&mut conn, options)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self { conn })
    }

    /// Create an in-memory database with all migrations applied.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&mut conn, RunnerOptions::default())?;
        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return a mutable reference to the underlying connection.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        tempo_migrate::runner::database_path(&self.conn)
    }

    /// Applied, pending and dirty migrations for this database.
    pub fn migration_status(&self) -> Result<Vec<MigrationStatus>> {
        let registry = migrations::registry()?;
        let migrator = tempo_migrate::Migrator::new(migrations::bundled()?, &registry);
        Ok(migrator.status(&self.conn)?)
    }
}
