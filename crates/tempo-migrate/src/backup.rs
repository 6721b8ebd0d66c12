//! File-level backups taken around a migration run.
//!
//! A snapshot is a byte-for-byte copy of the database file named
//! `{db_path}.backup.{YYYYMMDD_HHMMSS}`.  In-memory databases have no file and
//! are never backed up.
//!
//! Restoring copies the snapshot back over the live file.  SQLite connections
//! that are still open on that file may hold cached pages from before the
//! restore, so a restore is only trustworthy once every handle has been
//! dropped and reopened.  The runner reports the restore; it does not try to
//! keep using the old handle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;

/// Separator between the database file name and the backup timestamp.
pub const BACKUP_INFIX: &str = ".backup.";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Path a snapshot taken now would be written to.
pub fn backup_path_for(db_path: &Path) -> PathBuf {
    let stamp = Local::now().format(TIMESTAMP_FORMAT);
    let mut name = db_path.as_os_str().to_os_string();
    name.push(format!("{BACKUP_INFIX}{stamp}"));
    PathBuf::from(name)
}

/// Copy the database file next to itself and return the copy's path.
///
/// Returns `Ok(None)` when there is nothing to copy: an empty path
/// (in-memory database) or a file that does not exist.
pub fn snapshot(db_path: &Path) -> io::Result<Option<PathBuf>> {
    if db_path.as_os_str().is_empty() || !db_path.is_file() {
        return Ok(None);
    }

    let backup = backup_path_for(db_path);
    let bytes = fs::copy(db_path, &backup)?;
    tracing::info!(
        db = %db_path.display(),
        backup = %backup.display(),
        bytes,
        "created pre-migration backup"
    );
    Ok(Some(backup))
}

/// Copy `backup` back over `db_path`.  A no-op when either path is empty.
///
/// Returns `true` if a file was restored.
pub fn restore(db_path: &Path, backup: &Path) -> io::Result<bool> {
    if db_path.as_os_str().is_empty() || backup.as_os_str().is_empty() {
        return Ok(false);
    }

    fs::copy(backup, db_path)?;
    tracing::info!(
        db = %db_path.display(),
        backup = %backup.display(),
        "restored database from backup"
    );
    Ok(true)
}

/// Delete every `{db_path}.backup.*` file.  Returns how many were removed.
///
/// Files that cannot be removed are logged and skipped.
pub fn cleanup(db_path: &Path) -> io::Result<usize> {
    let Some(file_name) = db_path.file_name().and_then(|n| n.to_str()) else {
        return Ok(0);
    };
    let prefix = format!("{file_name}{BACKUP_INFIX}");
    let dir = match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(&prefix) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(
                file = %entry.path().display(),
                error = %e,
                "failed to remove backup"
            ),
        }
    }

    if removed > 0 {
        tracing::debug!(db = %db_path.display(), removed, "removed migration backups");
    }
    Ok(removed)
}

/// Scoped owner of a run's snapshot.
///
/// Exactly one of cleanup ([`complete`](Self::complete)) or restore
/// ([`abort`](Self::abort)) happens.  Dropping a guard that was neither
/// completed nor aborted (a panic mid-run) restores.
#[derive(Debug)]
pub struct BackupGuard {
    db_path: Option<PathBuf>,
    backup: Option<PathBuf>,
    armed: bool,
}

impl BackupGuard {
    /// A guard that never touches the file system.
    pub fn disabled() -> Self {
        Self {
            db_path: None,
            backup: None,
            armed: false,
        }
    }

    /// Snapshot `db_path` (if any) and guard the copy.
    pub fn snapshot(db_path: Option<&Path>) -> io::Result<Self> {
        let Some(db_path) = db_path else {
            return Ok(Self::disabled());
        };
        let backup = snapshot(db_path)?;
        Ok(Self {
            db_path: Some(db_path.to_path_buf()),
            backup,
            armed: true,
        })
    }

    /// Guard a database whose snapshot could not be taken.
    ///
    /// Nothing can be restored, but a successful run still cleans up older
    /// backups of the same file.
    pub fn without_backup(db_path: Option<&Path>) -> Self {
        Self {
            db_path: db_path.map(Path::to_path_buf),
            backup: None,
            armed: db_path.is_some(),
        }
    }

    pub fn backup_path(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// The run succeeded: delete every backup of the database.
    pub fn complete(mut self) {
        self.armed = false;
        let Some(db_path) = self.db_path.as_deref() else {
            return;
        };
        if let Err(e) = cleanup(db_path) {
            tracing::warn!(db = %db_path.display(), error = %e, "backup cleanup failed");
        }
    }

    /// The run failed: copy the snapshot back.  The snapshot file is kept.
    ///
    /// Returns `true` if the database file was restored.  Restore failures
    /// are logged, never returned.
    pub fn abort(mut self) -> bool {
        self.armed = false;
        self.restore_now()
    }

    fn restore_now(&self) -> bool {
        let (Some(db_path), Some(backup)) = (self.db_path.as_deref(), self.backup.as_deref())
        else {
            if let Some(db_path) = self.db_path.as_deref() {
                tracing::warn!(db = %db_path.display(), "no backup available to restore");
            }
            return false;
        };

        match restore(db_path, backup) {
            Ok(restored) => restored,
            Err(e) => {
                tracing::warn!(
                    db = %db_path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "restore from backup failed; backup retained"
                );
                false
            }
        }
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            self.restore_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backups_of(db_path: &Path) -> Vec<PathBuf> {
        let prefix = format!(
            "{}{BACKUP_INFIX}",
            db_path.file_name().unwrap().to_str().unwrap()
        );
        let mut found: Vec<PathBuf> = fs::read_dir(db_path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect();
        found.sort();
        found
    }

    #[test]
    fn backup_name_has_timestamp_suffix() {
        let path = backup_path_for(Path::new("/data/tempo.db"));
        let name = path.to_str().unwrap();
        let stamp = name.strip_prefix("/data/tempo.db.backup.").unwrap();

        assert_eq!(stamp.len(), 15);
        assert_eq!(&stamp[8..9], "_");
        assert!(stamp
            .chars()
            .enumerate()
            .all(|(i, c)| i == 8 || c.is_ascii_digit()));
    }

    #[test]
    fn snapshot_then_restore_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tempo.db");
        let original: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        fs::write(&db, &original).unwrap();

        let backup = snapshot(&db).unwrap().expect("file-backed db is backed up");
        assert_eq!(fs::read(&backup).unwrap(), original);

        assert!(restore(&db, &backup).unwrap());
        assert_eq!(fs::read(&db).unwrap(), original);
    }

    #[test]
    fn restore_undoes_later_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tempo.db");
        fs::write(&db, b"before").unwrap();

        let backup = snapshot(&db).unwrap().unwrap();
        fs::write(&db, b"after the failed run").unwrap();

        assert!(restore(&db, &backup).unwrap());
        assert_eq!(fs::read(&db).unwrap(), b"before");
    }

    #[test]
    fn in_memory_paths_are_noops() {
        assert_eq!(snapshot(Path::new("")).unwrap(), None);
        assert!(!restore(Path::new(""), Path::new("x.backup.1")).unwrap());
        assert!(!restore(Path::new("x.db"), Path::new("")).unwrap());
    }

    #[test]
    fn cleanup_removes_only_matching_backups() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tempo.db");
        fs::write(&db, b"db").unwrap();
        fs::write(dir.path().join("tempo.db.backup.20240101_000000"), b"old").unwrap();
        fs::write(dir.path().join("tempo.db.backup.20240102_000000"), b"old").unwrap();
        fs::write(dir.path().join("other.db.backup.20240101_000000"), b"keep").unwrap();
        fs::write(dir.path().join("tempo.db-wal"), b"keep").unwrap();

        assert_eq!(cleanup(&db).unwrap(), 2);
        assert!(backups_of(&db).is_empty());
        assert!(db.exists());
        assert!(dir.path().join("other.db.backup.20240101_000000").exists());
        assert!(dir.path().join("tempo.db-wal").exists());
    }

    #[test]
    fn guard_complete_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tempo.db");
        fs::write(&db, b"db").unwrap();

        let guard = BackupGuard::snapshot(Some(&db)).unwrap();
        assert!(guard.backup_path().is_some());
        assert_eq!(backups_of(&db).len(), 1);

        guard.complete();
        assert!(backups_of(&db).is_empty());
    }

    #[test]
    fn guard_abort_restores_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tempo.db");
        fs::write(&db, b"before").unwrap();

        let guard = BackupGuard::snapshot(Some(&db)).unwrap();
        fs::write(&db, b"half-migrated").unwrap();

        assert!(guard.abort());
        assert_eq!(fs::read(&db).unwrap(), b"before");
        assert_eq!(backups_of(&db).len(), 1);
    }

    #[test]
    fn dropped_guard_restores() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tempo.db");
        fs::write(&db, b"before").unwrap();

        {
            let _guard = BackupGuard::snapshot(Some(&db)).unwrap();
            fs::write(&db, b"interrupted").unwrap();
        }
        assert_eq!(fs::read(&db).unwrap(), b"before");
    }

    #[test]
    fn disabled_guard_does_nothing() {
        let guard = BackupGuard::snapshot(None).unwrap();
        assert!(guard.backup_path().is_none());
        assert!(!guard.abort());
    }
}
