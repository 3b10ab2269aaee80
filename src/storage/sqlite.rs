use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, params};
use thiserror::Error;

use crate::model::{Record, RecordSummary};

/// File name of the store inside the data directory.
pub const DB_FILE_NAME: &str = "codeshare.db";

const LIVE_TABLE: &str = "records";
const STAGING_TABLE: &str = "records_staging";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const CURSOR_BATCH: i64 = 256;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("project with ID {0} not found")]
    NotFound(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    fn is_missing_table(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(_, Some(msg)))
                if msg.starts_with("no such table")
        )
    }
}

fn table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            author TEXT NOT NULL,
            runtime_version TEXT NOT NULL,
            description TEXT NOT NULL,
            source TEXT NOT NULL
        )"
    )
}

fn insert_sql(table: &str) -> String {
    format!(
        "INSERT OR REPLACE INTO {table} (id, name, author, runtime_version, description, source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
    )
}

/// Escape `LIKE` metacharacters so `term` matches literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// SQLite-backed record store.
#[derive(Debug, Clone)]
pub struct RecordStore {
    db_path: PathBuf,
}

impl RecordStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Store at the conventional location inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DB_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// True iff the backing file is present. The schema is not checked.
    pub fn exists(&self) -> bool {
        self.db_path.is_file()
    }

    fn open_rw(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Read-only handle, or `None` when the file does not exist yet.
    fn open_ro(&self) -> Result<Option<Connection>, StoreError> {
        open_read_only(&self.db_path)
    }

    /// Insert or replace `record` in the live table, committing immediately.
    pub fn upsert(&self, record: &Record) -> Result<(), StoreError> {
        let conn = self.open_rw()?;
        conn.execute_batch(&table_ddl(LIVE_TABLE))?;
        insert_into(&conn, LIVE_TABLE, record)
    }

    /// `(description, source)` of the record with `id`.
    pub fn get(&self, id: &str) -> Result<(String, String), StoreError> {
        let Some(conn) = self.open_ro()? else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        let lookup = || -> Result<Option<(String, String)>, StoreError> {
            let mut stmt =
                conn.prepare("SELECT description, source FROM records WHERE id = ?1")?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
                None => Ok(None),
            }
        };
        match lookup() {
            Ok(Some(found)) => Ok(found),
            Ok(None) => Err(StoreError::NotFound(id.to_string())),
            Err(e) if e.is_missing_table() => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Number of records in the live table; 0 when there is none.
    pub fn count(&self) -> Result<usize, StoreError> {
        let Some(conn) = self.open_ro()? else {
            return Ok(0);
        };
        let counted = conn
            .query_row("SELECT COUNT(*) FROM records", [], |r| r.get::<_, i64>(0))
            .map_err(StoreError::from);
        match counted {
            Ok(n) => Ok(n as usize),
            Err(e) if e.is_missing_table() => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Lazy listing of every record, in storage order.
    pub fn scan_all(&self) -> RecordCursor {
        RecordCursor::new(self.db_path.clone(), None)
    }

    /// Lazy listing of records where `term` is a case-insensitive substring
    /// of the name, author, description or source. Operational failures end
    /// the sequence instead of surfacing.
    pub fn search(&self, term: &str) -> RecordCursor {
        RecordCursor::new(self.db_path.clone(), Some(like_pattern(term)))
    }

    /// Start a fresh staging table, discarding any leftover one.
    pub fn begin_staging(&self) -> Result<(), StoreError> {
        let conn = self.open_rw()?;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {STAGING_TABLE}; {};",
            table_ddl(STAGING_TABLE)
        ))?;
        Ok(())
    }

    /// Insert or replace `record` in the staging table.
    pub fn stage(&self, record: &Record) -> Result<(), StoreError> {
        let conn = self.open_rw()?;
        insert_into(&conn, STAGING_TABLE, record)
    }

    /// Replace the live table with the staging table in one transaction.
    pub fn commit_staging(&self) -> Result<(), StoreError> {
        let mut conn = self.open_rw()?;
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {LIVE_TABLE};
             ALTER TABLE {STAGING_TABLE} RENAME TO {LIVE_TABLE};"
        ))?;
        tx.commit()?;
        Ok(())
    }

    /// Drop the staging table, leaving the live table untouched.
    pub fn discard_staging(&self) -> Result<(), StoreError> {
        if !self.exists() {
            return Ok(());
        }
        let conn = self.open_rw()?;
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {STAGING_TABLE};"))?;
        Ok(())
    }
}

fn open_read_only(path: &Path) -> Result<Option<Connection>, StoreError> {
    if !path.is_file() {
        return Ok(None);
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(Some(conn))
}

fn insert_into(conn: &Connection, table: &str, record: &Record) -> Result<(), StoreError> {
    conn.execute(
        &insert_sql(table),
        params![
            record.id,
            record.name,
            record.author,
            record.runtime_version,
            record.description,
            record.source,
        ],
    )?;
    Ok(())
}

/// Iterator over [`RecordSummary`] rows.
///
/// Rows are fetched in rowid-keyed batches, each on its own short-lived
/// connection. A missing file or table yields an empty sequence. A search
/// cursor also swallows any other SQLite failure; a scan cursor reports it
/// once and then ends.
pub struct RecordCursor {
    db_path: PathBuf,
    pattern: Option<String>,
    last_rowid: i64,
    buffer: VecDeque<RecordSummary>,
    done: bool,
}

impl RecordCursor {
    fn new(db_path: PathBuf, pattern: Option<String>) -> Self {
        Self {
            db_path,
            pattern,
            last_rowid: i64::MIN,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn fetch_batch(&mut self) -> Result<(), StoreError> {
        let Some(conn) = open_read_only(&self.db_path)? else {
            self.done = true;
            return Ok(());
        };

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(i64, RecordSummary)> {
            Ok((
                row.get(0)?,
                RecordSummary {
                    id: row.get(1)?,
                    name: row.get(2)?,
                    author: row.get(3)?,
                    runtime_version: row.get(4)?,
                },
            ))
        };

        let rows: Vec<(i64, RecordSummary)> = match &self.pattern {
            None => {
                let mut stmt = conn.prepare(
                    "SELECT rowid, id, name, author, runtime_version FROM records
                     WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
                )?;
                stmt.query_map(params![self.last_rowid, CURSOR_BATCH], map_row)?
                    .collect::<rusqlite::Result<_>>()?
            }
            Some(pattern) => {
                let mut stmt = conn.prepare(
                    "SELECT rowid, id, name, author, runtime_version FROM records
                     WHERE rowid > ?1
                       AND (name LIKE ?2 ESCAPE '\\'
                            OR author LIKE ?2 ESCAPE '\\'
                            OR description LIKE ?2 ESCAPE '\\'
                            OR source LIKE ?2 ESCAPE '\\')
                     ORDER BY rowid LIMIT ?3",
                )?;
                stmt.query_map(params![self.last_rowid, pattern, CURSOR_BATCH], map_row)?
                    .collect::<rusqlite::Result<_>>()?
            }
        };

        if (rows.len() as i64) < CURSOR_BATCH {
            self.done = true;
        }
        if let Some((rowid, _)) = rows.last() {
            self.last_rowid = *rowid;
        }
        self.buffer.extend(rows.into_iter().map(|(_, summary)| summary));
        Ok(())
    }
}

impl Iterator for RecordCursor {
    type Item = Result<RecordSummary, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.buffer.pop_front() {
            return Some(Ok(row));
        }
        if self.done {
            return None;
        }
        if let Err(e) = self.fetch_batch() {
            self.done = true;
            if e.is_missing_table() {
                return None;
            }
            if self.pattern.is_some() {
                tracing::warn!(error = %e, "search query failed; returning no results");
                return None;
            }
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}
