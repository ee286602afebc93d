use super::*;
use tempfile::{tempdir, TempDir};

fn open_temp() -> (TempDir, SqliteBackend) {
    let dir = tempdir().unwrap();
    let db = SqliteBackend::open(&dir.path().join("pos.db")).unwrap();
    (dir, db)
}

#[test]
fn test_open_creates_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pos.db");
    let db = SqliteBackend::open(&path).unwrap();
    assert_eq!(db.db_type(), "sqlite");
    db.execute_script("CREATE TABLE t (id INTEGER);").unwrap();
    db.close().unwrap();
    assert!(path.is_file());
}

#[test]
fn test_execute_script_multiple_statements() {
    let (_dir, db) = open_temp();
    db.execute_script(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO items (name) VALUES ('tea');
         CREATE TABLE prices (item_id INTEGER, cents INTEGER);",
    )
    .unwrap();

    assert_eq!(db.list_tables().unwrap(), vec!["items", "prices"]);
}

#[test]
fn test_list_tables_sorted_and_excludes_internal() {
    let (_dir, db) = open_temp();
    db.execute_script(
        "CREATE TABLE zeta (id INTEGER PRIMARY KEY AUTOINCREMENT);
         CREATE TABLE alpha (id INTEGER);
         CREATE VIEW beta AS SELECT 1;",
    )
    .unwrap();

    assert_eq!(db.list_tables().unwrap(), vec!["alpha", "zeta"]);
}

#[test]
fn test_execute_script_error_is_execution_error() {
    let (_dir, db) = open_temp();
    let err = db.execute_script("CREATE TABLE broken (").unwrap_err();
    assert!(matches!(err, DbError::ExecutionError(_)));

    let err = db.execute_script("SELECT * FROM ghosts;").unwrap_err();
    assert!(err.to_string().contains("no such table"), "{err}");
}

#[test]
fn test_finish_commits_open_transaction() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pos.db");

    let db = SqliteBackend::open(&path).unwrap();
    db.execute_script("BEGIN; CREATE TABLE pending (id INTEGER);")
        .unwrap();
    db.finish().unwrap();
    db.close().unwrap();

    let reopened = SqliteBackend::open(&path).unwrap();
    assert_eq!(reopened.list_tables().unwrap(), vec!["pending"]);
}

#[test]
fn test_abort_rolls_back_open_transaction() {
    let (_dir, db) = open_temp();
    db.execute_script("BEGIN; CREATE TABLE pending (id INTEGER);")
        .unwrap();
    db.abort().unwrap();
    assert!(db.list_tables().unwrap().is_empty());
}

#[test]
fn test_finish_and_abort_noop_in_autocommit() {
    let (_dir, db) = open_temp();
    db.execute_script("CREATE TABLE t (id INTEGER);").unwrap();
    db.finish().unwrap();
    db.abort().unwrap();
    assert_eq!(db.list_tables().unwrap(), vec!["t"]);
}

#[test]
fn test_open_missing_parent_dir_fails() {
    let dir = tempdir().unwrap();
    let result = SqliteBackend::open(&dir.path().join("no/such/dir/pos.db"));
    assert!(matches!(result, Err(DbError::ConnectionError(_))));
}
