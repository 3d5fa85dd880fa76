use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::db::{AnalysisRunRecord, AnalysisRunStatus};
use crate::model::{CaseRecord, Digest, OperatingSystem, SampleRecord, SampleRef};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Error type for sample database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    /// No case with the given guid exists.
    #[error("Unknown case {0}")]
    UnknownCase(String),

    /// No sample with the given (case, sample) pair exists.
    #[error("Unknown sample {0}")]
    UnknownSample(SampleRef),
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite-backed sample database.
///
/// This is a thin wrapper around `rusqlite::Connection` that is responsible for:
/// - Opening/creating the DB file.
/// - Applying schema migrations.
/// - Providing small, testable helpers for querying and updating records.
///
/// The connection sits behind a mutex so concurrently running analyzer tasks
/// can share one handle.
#[derive(Debug)]
pub struct SampleDb {
    conn: Mutex<Connection>,
}

impl SampleDb {
    /// Open (or create) a sample database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open a private in-memory database with the current schema.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Poisoning does not invalidate the connection.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read the schema version of the open database.
    pub fn schema_version(&self) -> DbResult<i32> {
        current_schema_version(&self.conn())
    }

    /// Insert a case record and return its row id.
    pub fn insert_case(&self, record: &CaseRecord) -> DbResult<i64> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO cases (guid, name, description)
            VALUES (?1, ?2, ?3)
            "#,
            params![record.guid, record.name, record.description],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Look up a case by guid.
    pub fn get_case(&self, guid: &str) -> DbResult<Option<CaseRecord>> {
        let conn = self.conn();
        let case = conn
            .query_row(
                "SELECT guid, name, description FROM cases WHERE guid = ?1",
                params![guid],
                |row| Ok(CaseRecord { guid: row.get(0)?, name: row.get(1)?, description: row.get(2)? }),
            )
            .optional()?;
        Ok(case)
    }

    /// List all cases (ordered by id).
    pub fn list_cases(&self) -> DbResult<Vec<CaseRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT guid, name, description
            FROM cases
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CaseRecord { guid: row.get(0)?, name: row.get(1)?, description: row.get(2)? })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Insert a sample record (and its initial tags) and return its row id.
    pub fn insert_sample(&self, record: &SampleRecord) -> DbResult<i64> {
        let conn = self.conn();
        let case_exists: Option<i64> = conn
            .query_row("SELECT id FROM cases WHERE guid = ?1", params![record.case_guid], |row| {
                row.get(0)
            })
            .optional()?;
        if case_exists.is_none() {
            return Err(DbError::UnknownCase(record.case_guid.clone()));
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO samples (guid, case_guid, digest, name, size, opsystem, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.guid,
                record.case_guid,
                record.digest.as_str(),
                record.name,
                record.size as i64,
                record.opsystem.as_str(),
                record.created_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO sample_tags (sample_guid, tag) VALUES (?1, ?2)")?;
            for tag in &record.tags {
                stmt.execute(params![record.guid, tag])?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    /// Load one sample by its (case, sample) pair.
    pub fn get_sample(&self, sample: &SampleRef) -> DbResult<Option<SampleRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                r#"
                SELECT guid, case_guid, digest, name, size, opsystem, created_at
                FROM samples
                WHERE case_guid = ?1 AND guid = ?2
                "#,
                params![sample.case_guid, sample.sample_guid],
                map_sample,
            )
            .optional()?;
        match record {
            Some(mut record) => {
                record.tags = load_tags(&conn, &record.guid)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List samples, optionally restricted to one case (ordered by id).
    pub fn list_samples(&self, case_guid: Option<&str>) -> DbResult<Vec<SampleRecord>> {
        let conn = self.conn();
        let mut stmt = if case_guid.is_some() {
            conn.prepare(
                r#"
                SELECT guid, case_guid, digest, name, size, opsystem, created_at
                FROM samples
                WHERE case_guid = ?1
                ORDER BY id
                "#,
            )?
        } else {
            conn.prepare(
                r#"
                SELECT guid, case_guid, digest, name, size, opsystem, created_at
                FROM samples
                ORDER BY id
                "#,
            )?
        };

        let rows = if let Some(case) = case_guid {
            stmt.query_map(params![case], map_sample)?
        } else {
            stmt.query_map([], map_sample)?
        };

        let mut out = Vec::new();
        for row in rows {
            let mut record = row?;
            record.tags = load_tags(&conn, &record.guid)?;
            out.push(record);
        }
        Ok(out)
    }

    /// Every (case, sample) pair referencing `digest`.
    pub fn samples_for_digest(&self, digest: &Digest) -> DbResult<Vec<SampleRef>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT case_guid, guid
            FROM samples
            WHERE digest = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![digest.as_str()], |row| {
            Ok(SampleRef { case_guid: row.get(0)?, sample_guid: row.get(1)? })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Overwrite the platform attribute of one sample.
    pub fn set_platform(&self, sample: &SampleRef, opsystem: OperatingSystem) -> DbResult<()> {
        let affected = self.conn().execute(
            r#"
            UPDATE samples
            SET opsystem = ?1
            WHERE case_guid = ?2 AND guid = ?3
            "#,
            params![opsystem.as_str(), sample.case_guid, sample.sample_guid],
        )?;
        if affected == 0 {
            return Err(DbError::UnknownSample(sample.clone()));
        }
        Ok(())
    }

    /// Union `tags` into the tag set of one sample. Existing tags are never removed.
    pub fn add_tags(&self, sample: &SampleRef, tags: &BTreeSet<String>) -> DbResult<()> {
        let conn = self.conn();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM samples WHERE case_guid = ?1 AND guid = ?2",
                params![sample.case_guid, sample.sample_guid],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(DbError::UnknownSample(sample.clone()));
        }

        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO sample_tags (sample_guid, tag) VALUES (?1, ?2)")?;
            for tag in tags {
                stmt.execute(params![sample.sample_guid, tag])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert an analysis run record and return its row id.
    pub fn insert_analysis_run(&self, record: &AnalysisRunRecord) -> DbResult<i64> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO analysis_runs (digest, analyzer, status, archive, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.digest,
                record.analyzer,
                record.status.as_str(),
                record.archive,
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List analysis runs, optionally filtered by digest.
    pub fn list_analysis_runs(&self, digest: Option<&Digest>) -> DbResult<Vec<AnalysisRunRecord>> {
        fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnalysisRunRecord> {
            Ok(AnalysisRunRecord {
                digest: row.get(0)?,
                analyzer: row.get(1)?,
                status: {
                    let s: String = row.get(2)?;
                    s.parse::<AnalysisRunStatusString>()?.0
                },
                archive: row.get(3)?,
                started_at: row.get(4)?,
                finished_at: row.get(5)?,
            })
        }

        let conn = self.conn();
        let mut stmt = if digest.is_some() {
            conn.prepare(
                r#"
                SELECT digest, analyzer, status, archive, started_at, finished_at
                FROM analysis_runs
                WHERE digest = ?1
                ORDER BY id
                "#,
            )?
        } else {
            conn.prepare(
                r#"
                SELECT digest, analyzer, status, archive, started_at, finished_at
                FROM analysis_runs
                ORDER BY id
                "#,
            )?
        };

        let rows = if let Some(digest) = digest {
            stmt.query_map(params![digest.as_str()], map_run)?
        } else {
            stmt.query_map([], map_run)?
        };

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn map_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<SampleRecord> {
    let digest: String = row.get(2)?;
    let digest = Digest::parse(&digest)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let opsystem: String = row.get(5)?;
    Ok(SampleRecord {
        guid: row.get(0)?,
        case_guid: row.get(1)?,
        digest,
        name: row.get(3)?,
        size: row.get::<_, i64>(4)? as u64,
        opsystem: OperatingSystem::from_name(&opsystem),
        tags: BTreeSet::new(),
        created_at: row.get(6)?,
    })
}

fn load_tags(conn: &Connection, sample_guid: &str) -> DbResult<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM sample_tags WHERE sample_guid = ?1")?;
    let rows = stmt.query_map(params![sample_guid], |row| row.get::<_, String>(0))?;
    let mut tags = BTreeSet::new();
    for tag in rows {
        tags.insert(tag?);
    }
    Ok(tags)
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: initial schema (cases, samples, sample_tags)
/// - 2: add analysis_runs table
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS cases (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                guid        TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS samples (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                guid       TEXT NOT NULL UNIQUE,
                case_guid  TEXT NOT NULL,
                digest     TEXT NOT NULL,
                name       TEXT NOT NULL,
                size       INTEGER NOT NULL,
                opsystem   TEXT NOT NULL DEFAULT 'any',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS samples_by_digest ON samples (digest);

            CREATE TABLE IF NOT EXISTS sample_tags (
                sample_guid TEXT NOT NULL,
                tag         TEXT NOT NULL,
                PRIMARY KEY(sample_guid, tag)
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS analysis_runs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                digest      TEXT NOT NULL,
                analyzer    TEXT NOT NULL,
                status      TEXT NOT NULL,
                archive     TEXT,
                started_at  TEXT NOT NULL,
                finished_at TEXT NOT NULL
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}

/// Helper for parsing status strings into AnalysisRunStatus with better errors.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AnalysisRunStatusString(pub AnalysisRunStatus);

impl std::str::FromStr for AnalysisRunStatusString {
    type Err = rusqlite::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.to_lowercase().as_str() {
            "succeeded" => AnalysisRunStatus::Succeeded,
            "failed" => AnalysisRunStatus::Failed,
            _other => {
                return Err(rusqlite::Error::InvalidQuery);
            }
        };
        Ok(AnalysisRunStatusString(status))
    }
}
