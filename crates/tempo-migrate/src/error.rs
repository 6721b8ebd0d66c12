use thiserror::Error;

/// Error returned by an imperative migration step.
///
/// Boxed so that callables can propagate `rusqlite::Error` and their own
/// domain errors alike with `?`.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a single forward or backward payload.
pub type StepResult = std::result::Result<(), StepError>;

/// Errors produced by the migration engine.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// SQLite error outside of a migration payload (tracking table, checkpoints).
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An `up` file has no `down` counterpart, or the other way round.
    #[error("Migration file {file} has no matching counterpart")]
    UnpairedMigration { file: String },

    /// A bundled migration is not valid UTF-8.
    #[error("Migration file {file} is not valid UTF-8")]
    InvalidEncoding { file: String },

    /// Versions must be strictly positive.
    #[error("Invalid migration version {0}: versions start at 1")]
    InvalidVersion(u64),

    /// Two migrations claim the same version.
    #[error("Duplicate migration version {version}")]
    DuplicateVersion { version: u64 },

    /// The tracking table holds failed migrations; an operator has to clear them.
    #[error("Database is dirty at version(s) {}; manual intervention required", join_versions(.versions))]
    Dirty { versions: Vec<u64> },

    /// A migration failed to apply and was rolled back.
    #[error("Migration {version} failed: {source}")]
    Apply {
        version: u64,
        #[source]
        source: StepError,
    },

    /// The pre-run snapshot could not be taken while backups are mandatory.
    #[error("Backup error: {0}")]
    Backup(String),
}

impl MigrateError {
    pub(crate) fn apply(version: u64, source: impl Into<StepError>) -> Self {
        MigrateError::Apply {
            version,
            source: source.into(),
        }
    }

    /// Version of the migration that failed, if this is an apply failure.
    pub fn failed_version(&self) -> Option<u64> {
        match self {
            MigrateError::Apply { version, .. } => Some(*version),
            _ => None,
        }
    }
}

fn join_versions(versions: &[u64]) -> String {
    versions
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MigrateError>;
