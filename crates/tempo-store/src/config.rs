//! Store configuration loaded from environment variables.
//!
//! Every setting has a default, so the store opens with zero configuration.

use std::path::PathBuf;

use directories::ProjectDirs;
use tempo_migrate::{BackupPolicy, RunnerOptions};

use crate::error::{Result, StoreError};

/// Store configuration.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Path of the SQLite database file.
    /// Env: `TEMPO_DB_PATH`
    /// Default: `tempo.db` in the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Whether the database file is backed up around migration runs.
    /// Env: `TEMPO_MIGRATION_BACKUPS` (`off`, `best-effort`, `required`)
    /// Default: `best-effort`
    pub backup: BackupPolicy,
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("TEMPO_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(val) = std::env::var("TEMPO_MIGRATION_BACKUPS") {
            match parse_backup_policy(&val) {
                Some(policy) => config.backup = policy,
                None => {
                    tracing::warn!(
                        value = %val,
                        "Invalid TEMPO_MIGRATION_BACKUPS, using default"
                    );
                }
            }
        }

        config
    }

    /// Options handed to the migration runner.
    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            backup: self.backup,
        }
    }

    /// The configured database path, or the platform default:
    /// - Linux:   `~/.local/share/tempo/tempo.db`
    /// - macOS:   `~/Library/Application Support/dev.tempo.tempo/tempo.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\tempo\tempo\data\tempo.db`
    ///
    /// The parent directory is created if missing.
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        let path = match &self.db_path {
            Some(path) => path.clone(),
            None => {
                let project_dirs =
                    ProjectDirs::from("dev", "tempo", "tempo").ok_or(StoreError::NoDataDir)?;
                project_dirs.data_dir().join("tempo.db")
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(path)
    }
}

/// Parse a backup policy name.  Accepts a few common spellings of on/off.
fn parse_backup_policy(value: &str) -> Option<BackupPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" | "false" | "0" | "disabled" => Some(BackupPolicy::Disabled),
        "on" | "true" | "1" | "best-effort" | "best_effort" => Some(BackupPolicy::BestEffort),
        "required" => Some(BackupPolicy::Required),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert!(config.db_path.is_none());
        assert_eq!(config.backup, BackupPolicy::BestEffort);
        assert_eq!(config.runner_options().backup, BackupPolicy::BestEffort);
    }

    #[test]
    fn test_parse_backup_policy() {
        assert_eq!(parse_backup_policy("off"), Some(BackupPolicy::Disabled));
        assert_eq!(parse_backup_policy(" Best-Effort "), Some(BackupPolicy::BestEffort));
        assert_eq!(parse_backup_policy("REQUIRED"), Some(BackupPolicy::Required));
        assert_eq!(parse_backup_policy("sometimes"), None);
    }

    #[test]
    fn test_resolve_explicit_path_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tempo.db");
        let config = StoreConfig {
            db_path: Some(path.clone()),
            ..StoreConfig::default()
        };

        assert_eq!(config.resolve_db_path().unwrap(), path);
        assert!(dir.path().join("nested").is_dir());
    }
}
