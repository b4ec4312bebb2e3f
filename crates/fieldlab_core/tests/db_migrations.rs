use fieldlab_core::db::migrations::latest_version;
use fieldlab_core::db::{open_db, open_db_existing, open_db_in_memory, DbError};
use fieldlab_core::index::{latest_index_version, open_index, open_index_existing, open_index_in_memory};
use rusqlite::{Connection, ErrorCode};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "records");
    assert_table_exists(&conn, "attribute_definitions");
    assert_table_exists(&conn, "attribute_values");
}

#[test]
fn open_index_in_memory_creates_documents_and_fts_tables() {
    let conn = open_index_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_index_version());
    assert_table_exists(&conn, "documents");
    assert_table_exists(&conn, "documents_fts");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fieldlab.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "records");
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
fn session_openers_never_create_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("missing.db");
    let index_path = dir.path().join("missing-index.db");

    for err in [
        open_db_existing(&db_path).unwrap_err(),
        open_index_existing(&index_path).unwrap_err(),
    ] {
        match err {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) => {
                assert_eq!(failure.code, ErrorCode::CannotOpen);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert!(!db_path.exists());
    assert!(!index_path.exists());
}

#[test]
fn session_opener_reuses_initialized_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    drop(open_index(&path).unwrap());

    let conn = open_index_existing(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_index_version());
}

#[test]
fn deleting_a_record_cascades_to_its_values() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO records (id, name, email, created_at, updated_at)
         VALUES ('r1', 'Ada', 'ada@example.com', 1, 1);
         INSERT INTO attribute_definitions (id, display_label, wire_name, value_type)
         VALUES ('d1', 'Score', 'score__c', 'number');
         INSERT INTO attribute_values (id, record_id, definition_id, value)
         VALUES ('v1', 'r1', 'd1', '90');
         DELETE FROM records WHERE id = 'r1';",
    )
    .unwrap();

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM attribute_values;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn one_value_per_record_and_definition() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO records (id, name, email, created_at, updated_at)
         VALUES ('r1', 'Ada', 'ada@example.com', 1, 1);
         INSERT INTO attribute_definitions (id, display_label, wire_name, value_type)
         VALUES ('d1', 'Score', 'score__c', 'number');
         INSERT INTO attribute_values (id, record_id, definition_id, value)
         VALUES ('v1', 'r1', 'd1', '90');",
    )
    .unwrap();

    let duplicate = conn.execute(
        "INSERT INTO attribute_values (id, record_id, definition_id, value)
         VALUES ('v2', 'r1', 'd1', '91');",
        [],
    );
    assert!(duplicate.is_err());
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
