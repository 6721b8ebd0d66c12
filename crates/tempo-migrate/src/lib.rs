//! # tempo-migrate
//!
//! Schema migration engine for Tempo's local SQLite database.
//!
//! Migrations come from two sources: SQL file pairs bundled into the binary
//! (see [`source`]) and Rust functions registered in a [`Registry`] at
//! startup.  A [`Migrator`] merges both by version and applies whatever is
//! pending, one transaction per migration, with the database file backed up
//! around the run.  A failed migration leaves a dirty row in the tracking
//! table, and no later run proceeds until an operator clears it.

pub mod backup;
pub mod migration;
pub mod planner;
pub mod registry;
pub mod runner;
pub mod source;
pub mod status;
pub mod tracking;

mod error;

pub use error::{MigrateError, Result, StepError, StepResult};
pub use migration::{Kind, Migration, MigrationFn};
pub use registry::Registry;
pub use runner::{BackupPolicy, Migrator, RunReport, RunnerOptions};
pub use status::{MigrationState, MigrationStatus};
