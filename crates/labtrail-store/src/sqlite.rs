// ABOUTME: SQLite-backed revision log over a single revisions table.
// ABOUTME: Appends come from the write path; consumers of this log only scan.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use labtrail_core::{LogError, Payload, RevisionAction, RevisionLog, RevisionRecord};
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row, params};
use thiserror::Error;

/// Errors from the SQLite revision log.
///
/// Row-decode problems are reported distinctly so a malformed record is
/// never mistaken for an absent one.
#[derive(Debug, Error)]
pub enum SqliteLogError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(
        "unknown revision action {action:?} in row for {entity_type}/{natural_id} revision {revision_number}"
    )]
    UnknownAction {
        entity_type: String,
        natural_id: u64,
        revision_number: u32,
        action: String,
    },

    #[error(
        "payload for {entity_type}/{natural_id} revision {revision_number} is not valid JSON: {source}"
    )]
    Payload {
        entity_type: String,
        natural_id: u64,
        revision_number: u32,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "recorded_at for {entity_type}/{natural_id} revision {revision_number} is not rfc3339: {source}"
    )]
    Timestamp {
        entity_type: String,
        natural_id: u64,
        revision_number: u32,
        #[source]
        source: chrono::ParseError,
    },
}

/// A revision log persisted in a single SQLite `revisions` table.
///
/// The primary key (entity_type, natural_id, revision) keeps one row per
/// revision and makes per-resource scans an index walk. Payloads are
/// stored as JSON text, timestamps as rfc3339 text.
pub struct SqliteLog {
    conn: Connection,
}

impl SqliteLog {
    /// Open or create a revision log database at the given path.
    pub fn open(path: &Path) -> Result<Self, SqliteLogError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Open an in-memory revision log, mainly for tests.
    pub fn open_in_memory() -> Result<Self, SqliteLogError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SqliteLogError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS revisions (
                entity_type TEXT NOT NULL,
                natural_id INTEGER NOT NULL,
                revision INTEGER NOT NULL,
                session_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                payload TEXT,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (entity_type, natural_id, revision)
            );",
        )?;
        Ok(Self { conn })
    }

    /// Append one revision record. This is the write path's hook; readers
    /// of this log never call it.
    pub fn append(&self, record: &RevisionRecord) -> Result<(), SqliteLogError> {
        let payload = record
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|source| SqliteLogError::Payload {
                entity_type: record.entity_type.clone(),
                natural_id: record.natural_id,
                revision_number: record.revision_number,
                source,
            })?;

        self.conn.execute(
            "INSERT INTO revisions (entity_type, natural_id, revision, session_id, action, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.entity_type,
                record.natural_id,
                record.revision_number,
                record.session_id,
                record.action.as_str(),
                payload,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn scan_rows(
        &self,
        entity_type: &str,
        natural_id: u64,
    ) -> Result<Vec<RevisionRecord>, SqliteLogError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_type, natural_id, revision, session_id, action, payload, recorded_at
             FROM revisions WHERE entity_type = ?1 AND natural_id = ?2
             ORDER BY revision ASC",
        )?;

        let rows = stmt.query_map(params![entity_type, natural_id], read_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(decode_row(row?)?);
        }
        Ok(records)
    }

    fn scan_many_rows(
        &self,
        entity_type: &str,
        natural_ids: &[u64],
    ) -> Result<HashMap<u64, Vec<RevisionRecord>>, SqliteLogError> {
        if natural_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; natural_ids.len()].join(", ");
        let sql = format!(
            "SELECT entity_type, natural_id, revision, session_id, action, payload, recorded_at
             FROM revisions WHERE entity_type = ? AND natural_id IN ({placeholders})
             ORDER BY natural_id ASC, revision ASC"
        );

        let mut bind: Vec<&dyn ToSql> = Vec::with_capacity(natural_ids.len() + 1);
        bind.push(&entity_type);
        for id in natural_ids {
            bind.push(id);
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(&bind[..], read_row)?;

        let mut histories: HashMap<u64, Vec<RevisionRecord>> = HashMap::new();
        for row in rows {
            let record = decode_row(row?)?;
            histories.entry(record.natural_id).or_default().push(record);
        }
        Ok(histories)
    }
}

impl RevisionLog for SqliteLog {
    fn scan(&self, entity_type: &str, natural_id: u64) -> Result<Vec<RevisionRecord>, LogError> {
        self.scan_rows(entity_type, natural_id).map_err(LogError::backend)
    }

    fn scan_many(
        &self,
        entity_type: &str,
        natural_ids: &[u64],
    ) -> Result<HashMap<u64, Vec<RevisionRecord>>, LogError> {
        self.scan_many_rows(entity_type, natural_ids).map_err(LogError::backend)
    }
}

type RawRow = (String, u64, u32, u64, String, Option<String>, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode_row(raw: RawRow) -> Result<RevisionRecord, SqliteLogError> {
    let (entity_type, natural_id, revision_number, session_id, raw_action, raw_payload, raw_recorded_at) =
        raw;

    let action = match raw_action.parse::<RevisionAction>() {
        Ok(action) => action,
        Err(_) => {
            return Err(SqliteLogError::UnknownAction {
                entity_type,
                natural_id,
                revision_number,
                action: raw_action,
            });
        }
    };

    let payload = raw_payload
        .as_deref()
        .map(serde_json::from_str::<Payload>)
        .transpose()
        .map_err(|source| SqliteLogError::Payload {
            entity_type: entity_type.clone(),
            natural_id,
            revision_number,
            source,
        })?;

    let recorded_at = DateTime::parse_from_rfc3339(&raw_recorded_at)
        .map_err(|source| SqliteLogError::Timestamp {
            entity_type: entity_type.clone(),
            natural_id,
            revision_number,
            source,
        })?
        .with_timezone(&Utc);

    Ok(RevisionRecord {
        entity_type,
        natural_id,
        revision_number,
        session_id,
        action,
        payload,
        recorded_at,
    })
}
