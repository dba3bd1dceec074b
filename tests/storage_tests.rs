use assert_fs::TempDir;
use assert_fs::prelude::*;
use backend_supervisor::storage::backup::is_backup_file;
use backend_supervisor::storage::{
    DataLayout, MIGRATION_BACKUP_SUFFIX, MigrationOutcome, list_backups, prune_backups,
};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

fn layout(root: &TempDir, keep: usize) -> DataLayout {
    DataLayout::new(root.child("user-data").path(), "db.sqlite3", keep)
}

fn touch_backup(dir: &Path, name: &str, age: Duration) {
    let path = dir.join(name);
    fs::write(&path, name.as_bytes()).unwrap();
    let file = fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

#[test]
fn test_initialize_creates_directories() {
    let temp = TempDir::new().unwrap();
    let layout = layout(&temp, 5);

    layout.initialize().unwrap();
    // Idempotent
    layout.initialize().unwrap();

    assert!(layout.data_dir().is_dir());
    assert!(layout.backup_dir().is_dir());
    assert!(!layout.database_path().exists());
}

#[test]
fn test_migrate_legacy_database_with_sidecars() {
    let temp = TempDir::new().unwrap();
    let legacy = temp.child("resources/db.sqlite3");
    legacy.write_binary(b"SQLite format 3\0main").unwrap();
    temp.child("resources/db.sqlite3-wal")
        .write_binary(b"wal")
        .unwrap();
    let layout = layout(&temp, 5);
    layout.initialize().unwrap();

    let outcome = layout.migrate_legacy_database(legacy.path()).unwrap();

    let backup = match outcome {
        MigrationOutcome::Migrated { backup: Some(backup) } => backup,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(
        fs::read(layout.database_path()).unwrap(),
        b"SQLite format 3\0main"
    );
    assert_eq!(
        fs::read(layout.data_dir().join("db.sqlite3-wal")).unwrap(),
        b"wal"
    );
    assert!(!layout.data_dir().join("db.sqlite3-shm").exists());

    let name = backup.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with(&format!("db_{}_", MIGRATION_BACKUP_SUFFIX)), "{}", name);
    assert!(is_backup_file(&name));
    assert_eq!(backup.parent(), Some(layout.backup_dir().as_path()));

    // The legacy copy stays in place.
    assert!(legacy.path().exists());
}

#[test]
fn test_migration_never_overwrites_existing_database() {
    let temp = TempDir::new().unwrap();
    let legacy = temp.child("legacy.sqlite3");
    legacy.write_binary(b"old").unwrap();
    let layout = layout(&temp, 5);
    layout.initialize().unwrap();
    fs::write(layout.database_path(), b"current").unwrap();

    let outcome = layout.migrate_legacy_database(legacy.path()).unwrap();

    assert_eq!(outcome, MigrationOutcome::AlreadyMigrated);
    assert_eq!(fs::read(layout.database_path()).unwrap(), b"current");
    assert!(layout.backups().unwrap().is_empty());
}

#[test]
fn test_migration_without_legacy_database() {
    let temp = TempDir::new().unwrap();
    let layout = layout(&temp, 5);
    layout.initialize().unwrap();

    let outcome = layout
        .migrate_legacy_database(&temp.path().join("missing.sqlite3"))
        .unwrap();

    assert_eq!(outcome, MigrationOutcome::NoLegacyDatabase);
    assert!(!layout.database_path().exists());
}

#[test]
fn test_backup_without_database() {
    let temp = TempDir::new().unwrap();
    let layout = layout(&temp, 5);
    layout.initialize().unwrap();

    assert_eq!(layout.backup(None).unwrap(), None);
    assert!(layout.backups().unwrap().is_empty());
}

#[test]
fn test_backup_copies_database() {
    let temp = TempDir::new().unwrap();
    let layout = layout(&temp, 5);
    layout.initialize().unwrap();
    fs::write(layout.database_path(), b"rows").unwrap();

    let backup = layout.backup(Some("before_update")).unwrap().unwrap();

    assert_eq!(fs::read(&backup).unwrap(), b"rows");
    let name = backup.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("db_before_update_"), "{}", name);
    assert!(name.ends_with(".sqlite3"));
    assert_eq!(layout.backups().unwrap().len(), 1);
}

#[test]
fn test_backup_prunes_to_retention_limit() {
    let temp = TempDir::new().unwrap();
    let layout = layout(&temp, 3);
    layout.initialize().unwrap();
    fs::write(layout.database_path(), b"rows").unwrap();

    let backup_dir = layout.backup_dir();
    for (i, hours) in [50u64, 40, 30, 20].iter().enumerate() {
        touch_backup(
            &backup_dir,
            &format!("db_2024-01-0{}T00-00-00.sqlite3", i + 1),
            Duration::from_secs(hours * 3600),
        );
    }

    let newest = layout.backup(None).unwrap().unwrap();

    let names: Vec<String> = layout
        .backups()
        .unwrap()
        .into_iter()
        .map(|b| b.name)
        .collect();
    assert_eq!(names.len(), 3);
    assert_eq!(
        names[0],
        newest.file_name().unwrap().to_string_lossy().to_string()
    );
    assert_eq!(names[1], "db_2024-01-04T00-00-00.sqlite3");
    assert_eq!(names[2], "db_2024-01-03T00-00-00.sqlite3");
}

#[test]
fn test_prune_ignores_unrelated_files() {
    let temp = TempDir::new().unwrap();
    let dir = temp.child("backups");
    dir.create_dir_all().unwrap();
    touch_backup(dir.path(), "db_a.sqlite3", Duration::from_secs(300));
    touch_backup(dir.path(), "db_b.sqlite3", Duration::from_secs(200));
    touch_backup(dir.path(), "db_c.sqlite3", Duration::from_secs(100));
    touch_backup(dir.path(), "notes.txt", Duration::from_secs(1000));

    let removed = prune_backups(dir.path(), 1).unwrap();

    assert_eq!(removed.len(), 2);
    assert!(dir.child("notes.txt").path().exists());
    let remaining: Vec<String> = list_backups(dir.path())
        .unwrap()
        .into_iter()
        .map(|b| b.name)
        .collect();
    assert_eq!(remaining, vec!["db_c.sqlite3"]);
}
