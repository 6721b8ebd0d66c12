//! Migration runner.
//!
//! A run goes through the following steps, stopping at the first failure:
//!
//! 1. build the plan (declarative + registered migrations, sorted by version);
//! 2. refuse to continue if any version is dirty;
//! 3. snapshot the database file;
//! 4. create the tracking table if needed;
//! 5. apply every pending migration in its own transaction, together with
//!    its tracking row.
//!
//! On success the snapshot is deleted.  On failure the snapshot is copied
//! back over the database file and kept for inspection.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, Transaction};
use tracing::{debug, error, info, warn};

use crate::backup::BackupGuard;
use crate::error::{MigrateError, Result, StepResult};
use crate::migration::Migration;
use crate::planner;
use crate::registry::Registry;
use crate::status::{self, MigrationStatus};
use crate::tracking;

/// What to do about file backups around a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupPolicy {
    /// Never snapshot.
    Disabled,
    /// Snapshot if possible; a failed snapshot is logged and the run proceeds.
    #[default]
    BestEffort,
    /// A failed snapshot aborts the run before the database is touched.
    Required,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerOptions {
    pub backup: BackupPolicy,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Versions applied by this run, in order.
    pub applied: Vec<u64>,
    /// Planned versions that were already recorded as applied.
    pub already_applied: usize,
}

/// Applies declarative and registered migrations to a SQLite database.
pub struct Migrator<'r> {
    declarative: Vec<Migration>,
    registry: &'r Registry,
    options: RunnerOptions,
}

impl<'r> Migrator<'r> {
    pub fn new(declarative: Vec<Migration>, registry: &'r Registry) -> Self {
        Self {
            declarative,
            registry,
            options: RunnerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// The merged, version-ordered list of every known migration.
    pub fn plan(&self) -> Result<Vec<Migration>> {
        planner::plan(&self.declarative, self.registry)
    }

    /// Run every pending migration against `conn`, in version order.
    ///
    /// If this returns an error after the database file was restored from
    /// its snapshot, `conn` may still hold pages cached from before the
    /// restore.  Drop it and open a new connection before using the database.
    pub fn run(&self, conn: &mut Connection) -> Result<RunReport> {
        let plan = self.plan()?;
        refuse_dirty(conn)?;
        let db_path = database_path(conn);
        let guard = self.take_backup(conn, db_path.as_deref())?;

        match apply_pending(conn, &plan) {
            Ok(report) => {
                guard.complete();
                info!(
                    applied = report.applied.len(),
                    already_applied = report.already_applied,
                    "database migrations complete"
                );
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, "database migration failed");
                let backup = guard.backup_path().map(Path::to_path_buf);
                if backup.is_some() {
                    checkpoint(conn);
                }
                if guard.abort() {
                    if let (Some(path), Some(version)) = (db_path.as_deref(), err.failed_version()) {
                        reinstate_breadcrumb(path, version);
                    }
                    warn!(
                        backup = %backup.as_deref().unwrap_or(Path::new("")).display(),
                        "database restored from pre-migration backup; reopen it before use"
                    );
                }
                Err(err)
            }
        }
    }

    /// Where `conn` stands against the plan.  Never writes to the database.
    pub fn status(&self, conn: &Connection) -> Result<Vec<MigrationStatus>> {
        let plan = self.plan()?;
        status::collect(conn, &plan)
    }

    fn take_backup(&self, conn: &Connection, db_path: Option<&Path>) -> Result<BackupGuard> {
        if self.options.backup == BackupPolicy::Disabled {
            return Ok(BackupGuard::disabled());
        }
        if db_path.is_some() {
            checkpoint(conn);
        }

        match BackupGuard::snapshot(db_path) {
            Ok(guard) => Ok(guard),
            Err(e) if self.options.backup == BackupPolicy::Required => Err(MigrateError::Backup(
                format!("could not snapshot database before migrating: {e}"),
            )),
            Err(e) => {
                warn!(error = %e, "could not snapshot database; migrating without a backup");
                Ok(BackupGuard::without_backup(db_path))
            }
        }
    }
}

/// File backing `conn`, or `None` for in-memory and temporary databases.
pub fn database_path(conn: &Connection) -> Option<PathBuf> {
    conn.path()
        .map(PathBuf::from)
        .filter(|p| !p.as_os_str().is_empty())
}

/// Fail with [`MigrateError::Dirty`] if a previous run left a breadcrumb.
/// Read-only, and a database without a tracking table is never dirty.
fn refuse_dirty(conn: &Connection) -> Result<()> {
    if !tracking::table_exists(conn)? {
        return Ok(());
    }
    let dirty = tracking::dirty_versions(conn)?;
    if !dirty.is_empty() {
        return Err(MigrateError::Dirty { versions: dirty });
    }
    Ok(())
}

fn apply_pending(conn: &mut Connection, plan: &[Migration]) -> Result<RunReport> {
    tracking::ensure_schema(conn)?;
    refuse_dirty(conn)?;

    let applied = tracking::applied_versions(conn)?;
    let mut report = RunReport::default();

    for migration in plan {
        let version = migration.version();
        if applied.contains(&version) {
            debug!(version, "migration already applied");
            report.already_applied += 1;
            continue;
        }

        info!(
            version,
            kind = %migration.kind(),
            name = migration.name(),
            "applying migration"
        );
        if let Err(source) = apply_one(conn, migration) {
            leave_breadcrumb(conn, version);
            return Err(MigrateError::apply(version, source));
        }
        report.applied.push(version);
    }

    Ok(report)
}

/// Apply `migration` and record it, all in one transaction.
fn apply_one(conn: &mut Connection, migration: &Migration) -> StepResult {
    let version = migration.version();
    let tx = conn.transaction()?;

    match apply_in(&tx, migration) {
        Ok(()) => tx.commit().map_err(Into::into),
        Err(e) => {
            if let Err(rollback) = tx.rollback() {
                warn!(version, error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

fn apply_in(tx: &Transaction<'_>, migration: &Migration) -> StepResult {
    tracking::begin_record(tx, migration.version())?;
    migration.apply(tx)?;
    tracking::commit_record(tx, migration.version())?;
    Ok(())
}

fn leave_breadcrumb(conn: &Connection, version: u64) {
    if let Err(e) = tracking::mark_failed(conn, version) {
        warn!(version, error = %e, "could not mark migration as dirty");
    }
}

/// Write the dirty marker into a freshly restored file.
///
/// The restored file predates the failed run, so it would otherwise carry no
/// trace of the failure.  A new connection is used because the caller's one
/// may still cache pages from before the restore.
fn reinstate_breadcrumb(db_path: &Path, version: u64) {
    let result = Connection::open(db_path).map_err(MigrateError::from).and_then(|conn| {
        tracking::ensure_schema(&conn)?;
        tracking::mark_failed(&conn, version)
    });
    if let Err(e) = result {
        warn!(
            db = %db_path.display(),
            version,
            error = %e,
            "could not record failed migration in restored database"
        );
    }
}

/// Move WAL content into the main file so a file copy is complete.
fn checkpoint(conn: &Connection) {
    if let Err(e) = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(())) {
        warn!(error = %e, "WAL checkpoint failed");
    }
}
