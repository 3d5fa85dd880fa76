use sample_pipeline_core::db::{DbError, SampleDb, StorageLayout, CURRENT_SCHEMA_VERSION};
use rusqlite::Connection;
use tempfile::tempdir;

#[test]
fn sample_db_open_errors_on_unsupported_schema_version() {
    // Arrange: temp store layout + DB with an unsupported user_version.
    let tmp = tempdir().expect("temp dir");
    let layout = StorageLayout::new(tmp.path());
    std::fs::create_dir_all(&layout.meta_dir).expect("create .store dir");

    {
        let conn = Connection::open(&layout.db_path).expect("open raw sqlite db");
        conn.pragma_update(None, "user_version", 99_i32).expect("set user_version pragma");
    }

    match SampleDb::open(&layout.db_path) {
        Err(DbError::UnsupportedSchemaVersion { found, min_supported, max_supported }) => {
            assert_eq!(found, 99, "unexpected found schema version");
            assert_eq!(min_supported, 0, "unexpected min_supported schema version");
            assert_eq!(max_supported, CURRENT_SCHEMA_VERSION);
        }
        Err(err) => {
            panic!("expected UnsupportedSchemaVersion error, got different DbError: {err}");
        }
        Ok(_) => {
            panic!("expected UnsupportedSchemaVersion error, got Ok(_)");
        }
    }
}

#[test]
fn sample_db_upgrades_version_one_schema() {
    let tmp = tempdir().expect("temp dir");
    let db_path = tmp.path().join("samples.db");
    {
        let conn = Connection::open(&db_path).expect("open raw sqlite db");
        conn.execute_batch(
            r#"
            CREATE TABLE cases (id INTEGER PRIMARY KEY AUTOINCREMENT, guid TEXT NOT NULL UNIQUE, name TEXT NOT NULL, description TEXT);
            CREATE TABLE samples (id INTEGER PRIMARY KEY AUTOINCREMENT, guid TEXT NOT NULL UNIQUE, case_guid TEXT NOT NULL, digest TEXT NOT NULL, name TEXT NOT NULL, size INTEGER NOT NULL, opsystem TEXT NOT NULL DEFAULT 'any', created_at TEXT NOT NULL);
            CREATE TABLE sample_tags (sample_guid TEXT NOT NULL, tag TEXT NOT NULL, PRIMARY KEY(sample_guid, tag));
            PRAGMA user_version = 1;
            "#,
        )
        .expect("create v1 schema");
    }

    let db = SampleDb::open(&db_path).expect("open and migrate");
    assert_eq!(db.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    assert!(db.list_analysis_runs(None).unwrap().is_empty());
}
