//! Timestamped database backups.
//!
//! Backups are plain copies named `db_[suffix_]YYYY-MM-DDTHH-MM-SS.sqlite3`
//! in the backup directory. After every backup the directory is pruned to
//! the most recent copies by modification time.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File name prefix of every backup
pub const BACKUP_PREFIX: &str = "db_";

/// File extension of every backup
pub const BACKUP_EXTENSION: &str = ".sqlite3";

/// Timestamp format used in backup names (UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// A backup file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// File name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Last modification time
    pub modified: SystemTime,
}

/// Name of a backup taken at `at`.
///
/// ```
/// use backend_supervisor::storage::backup::backup_file_name;
/// use chrono::{TimeZone, Utc};
///
/// let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
/// assert_eq!(backup_file_name(None, at), "db_2025-03-14T09-26-53.sqlite3");
/// assert_eq!(
///     backup_file_name(Some("before_update"), at),
///     "db_before_update_2025-03-14T09-26-53.sqlite3"
/// );
/// ```
pub fn backup_file_name(suffix: Option<&str>, at: DateTime<Utc>) -> String {
    let timestamp = at.format(TIMESTAMP_FORMAT);
    match suffix.filter(|s| !s.is_empty()) {
        Some(suffix) => format!("{}{}_{}{}", BACKUP_PREFIX, suffix, timestamp, BACKUP_EXTENSION),
        None => format!("{}{}{}", BACKUP_PREFIX, timestamp, BACKUP_EXTENSION),
    }
}

/// Whether `name` looks like a backup produced by [`backup_file_name`].
pub fn is_backup_file(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_EXTENSION)
}

/// Copies `database` into `backup_dir` and prunes old backups.
///
/// Returns `Ok(None)` when there is no database to back up.
#[tracing::instrument(skip_all, fields(database = %database.display()))]
pub fn create_backup(
    database: &Path,
    backup_dir: &Path,
    suffix: Option<&str>,
    keep: usize,
) -> Result<Option<PathBuf>> {
    if !database.exists() {
        tracing::warn!("No database to back up");
        return Ok(None);
    }

    fs::create_dir_all(backup_dir).map_err(|e| {
        Error::Storage(format!(
            "Failed to create backup directory {}: {}",
            backup_dir.display(),
            e
        ))
    })?;

    let target = backup_dir.join(backup_file_name(suffix, Utc::now()));
    fs::copy(database, &target).map_err(|e| {
        Error::Storage(format!("Failed to copy database to {}: {}", target.display(), e))
    })?;
    tracing::info!(backup = %target.display(), "Backup created");

    // A failed prune does not invalidate the backup just taken.
    if let Err(e) = prune_backups(backup_dir, keep) {
        tracing::error!(error = %e, "Failed to prune old backups");
    }

    Ok(Some(target))
}

/// Backups in `backup_dir`, newest first.
pub fn list_backups(backup_dir: &Path) -> Result<Vec<BackupEntry>> {
    let entries = fs::read_dir(backup_dir).map_err(|e| {
        Error::Storage(format!("Failed to read {}: {}", backup_dir.display(), e))
    })?;

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_backup_file(&name) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        backups.push(BackupEntry {
            name,
            path: entry.path(),
            modified: metadata.modified()?,
        });
    }

    backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(backups)
}

/// Deletes all but the `keep` most recent backups; returns the removed paths.
pub fn prune_backups(backup_dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();

    for backup in list_backups(backup_dir)?.into_iter().skip(keep) {
        fs::remove_file(&backup.path).map_err(|e| {
            Error::Storage(format!("Failed to remove {}: {}", backup.path.display(), e))
        })?;
        tracing::info!(backup = %backup.name, "Old backup removed");
        removed.push(backup.path);
    }

    Ok(removed)
}
