use memoportal_core::db::migrations::latest_version;
use memoportal_core::db::{open_db, open_db_in_memory, DbError};
use memoportal_core::repo::lock_repo::SqliteLockRepository;
use memoportal_core::repo::RepoError;
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "roles",
        "role_permissions",
        "resource_locks",
        "system_settings",
        "activity_logs",
        "memos",
        "memo_acknowledgments",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portal.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "resource_locks");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repositories_refuse_unmigrated_connections() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteLockRepository::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(expected_version, latest_version());
            assert_eq!(actual_version, 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unmigrated connection must be rejected"),
    }
}

#[test]
fn lock_table_rejects_second_row_for_same_resource() {
    let conn = open_db_in_memory().unwrap();
    let insert = "INSERT INTO resource_locks (
        resource_type, resource_id, owner_id, owner_name, owner_email, locked_at, expires_at
    ) VALUES ('user', '42', ?1, 'n', 'e', 0, 1000);";

    conn.execute(insert, ["owner-a"]).unwrap();
    assert!(conn.execute(insert, ["owner-b"]).is_err());
}

#[test]
fn memo_table_rejects_approved_and_rejected_together() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO memos (
            id, subject, content, sender_id, sender_email, recipients, priority, status,
            attachments, approved_at, rejected_at, created_at, updated_at
        ) VALUES ('m1', 's', 'c', 'u1', 'a@uni.edu', '[]', 'low', 'pending', '[]', 1, 2, 0, 0);",
        [],
    );
    assert!(result.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
