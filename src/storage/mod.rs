//! User data directories, legacy database migration and backups.
//!
//! The backend keeps its database under a per-user data root:
//!
//! ```text
//! <user-data>/
//!   data/db.sqlite3        (+ -wal / -shm sidecars)
//!   backups/db_*.sqlite3
//! ```
//!
//! The root is handed to the backend through an environment variable so both
//! sides agree on where the database lives.

pub mod backup;

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub use backup::{BackupEntry, create_backup, list_backups, prune_backups};

/// Name of the data subdirectory
pub const DATA_DIR: &str = "data";

/// Name of the backup subdirectory
pub const BACKUP_DIR: &str = "backups";

/// Backup suffix used right after a legacy migration
pub const MIGRATION_BACKUP_SUFFIX: &str = "initial_migration";

/// SQLite sidecar suffixes copied along with the database
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// Result of [`DataLayout::migrate_legacy_database`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The legacy database was copied into the data directory
    Migrated {
        /// Backup taken after the copy
        backup: Option<PathBuf>,
    },
    /// The data directory already has a database
    AlreadyMigrated,
    /// There is no legacy database
    NoLegacyDatabase,
}

/// Paths of the user data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
    database_file: String,
    keep_backups: usize,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>, database_file: impl Into<String>, keep_backups: usize) -> Self {
        Self {
            root: root.into(),
            database_file: database_file.into(),
            keep_backups,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            config.user_data_dir.clone(),
            config.database_file.clone(),
            config.keep_backups,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    /// Location of the live database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(&self.database_file)
    }

    pub fn keep_backups(&self) -> usize {
        self.keep_backups
    }

    /// Creates the data and backup directories.
    #[tracing::instrument(skip(self), fields(root = %self.root.display()))]
    pub fn initialize(&self) -> Result<()> {
        for dir in [self.data_dir(), self.backup_dir()] {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::Storage(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        tracing::info!("User data directories ready");
        Ok(())
    }

    /// Copies a legacy database (and its sidecars) into the data directory,
    /// unless a database is already there, then takes a migration backup.
    #[tracing::instrument(skip(self), fields(legacy = %legacy.display()))]
    pub fn migrate_legacy_database(&self, legacy: &Path) -> Result<MigrationOutcome> {
        let target = self.database_path();

        if !legacy.exists() {
            tracing::debug!("No legacy database");
            return Ok(MigrationOutcome::NoLegacyDatabase);
        }
        if target.exists() {
            tracing::debug!(target = %target.display(), "Database already present, skipping migration");
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        tracing::info!(target = %target.display(), "Migrating legacy database");
        fs::create_dir_all(self.data_dir())?;
        copy_file(legacy, &target)?;

        for suffix in SIDECAR_SUFFIXES {
            let source = with_suffix(legacy, suffix);
            if source.exists() {
                copy_file(&source, &with_suffix(&target, suffix))?;
            }
        }

        let backup = self.backup(Some(MIGRATION_BACKUP_SUFFIX))?;
        tracing::info!("Legacy database migrated");

        Ok(MigrationOutcome::Migrated { backup })
    }

    /// Takes a backup of the live database.
    ///
    /// Returns `Ok(None)` when there is no database yet.
    pub fn backup(&self, suffix: Option<&str>) -> Result<Option<PathBuf>> {
        create_backup(
            &self.database_path(),
            &self.backup_dir(),
            suffix,
            self.keep_backups,
        )
    }

    /// Existing backups, newest first.
    pub fn backups(&self) -> Result<Vec<BackupEntry>> {
        list_backups(&self.backup_dir())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map(|_| ()).map_err(|e| {
        Error::Storage(format!(
            "Failed to copy {} to {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })
}
