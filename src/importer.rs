//! Read access to Cursor's key-value store.
//!
//! Cursor keeps editor state in a SQLite file (`state.vscdb`). Chat sessions live in a
//! single two-column table:
//!
//! ```sql
//! CREATE TABLE cursorDiskKV (
//!     key   TEXT UNIQUE ON CONFLICT REPLACE,
//!     value BLOB
//! );
//! ```
//!
//! Keys look like `composerData:<uuid>` or `bubbleId:<uuid>:<uuid>`. Values are usually
//! JSON text, sometimes zlib-compressed bytes. SQLite's dynamic typing means a value can
//! come back as TEXT, BLOB, a number or NULL, so rows are read through [`ValueRef`].
//!
//! The database is opened **read-only** and never modified.
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, backup::Backup};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StoreError;

/// The table every record is read from.
pub const KV_TABLE: &str = "cursorDiskKV";

/// A stored value, as SQLite hands it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

/// One key/value row. `payload` is `None` for a NULL value column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub key: String,
    pub payload: Option<Payload>,
}

impl RawRecord {
    pub fn text(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: Some(Payload::Text(text.into())),
        }
    }

    pub fn bytes(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            payload: Some(Payload::Bytes(bytes.into())),
        }
    }
}

/// Anything that can hand over the full set of raw rows in one go.
pub trait RecordSource {
    fn read_records(&self) -> Result<Vec<RawRecord>, StoreError>;

    fn read_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read_records()?
            .into_iter()
            .map(|record| record.key)
            .collect())
    }
}

impl RecordSource for Vec<RawRecord> {
    fn read_records(&self) -> Result<Vec<RawRecord>, StoreError> {
        Ok(self.clone())
    }
}

/// A `state.vscdb` file on disk.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    snapshot: bool,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: true,
        }
    }

    /// Read from a temporary copy made with SQLite's online backup instead of the live
    /// file. On by default, since Cursor keeps the database open while it runs.
    pub fn with_snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotFound(self.path.clone()));
        }

        let src = open_read_only(&self.path)?;
        if !self.snapshot {
            return f(&src);
        }

        let snapshot = backup_database(&src)?;
        drop(src);
        let conn = open_read_only(snapshot.path())?;
        let result = f(&conn);
        drop(conn);
        drop(snapshot);
        result
    }
}

impl RecordSource for SqliteStore {
    fn read_records(&self) -> Result<Vec<RawRecord>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT key, value FROM {KV_TABLE}"))?;
            let rows = stmt.query_map([], |row| {
                Ok(RawRecord {
                    key: key_from_ref(row.get_ref(0)?),
                    payload: payload_from_ref(row.get_ref(1)?),
                })
            })?;
            let records = rows.collect::<Result<Vec<_>, _>>()?;
            debug!(count = records.len(), "read records");
            Ok(records)
        })
    }

    fn read_keys(&self) -> Result<Vec<String>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT key FROM {KV_TABLE}"))?;
            let keys = stmt
                .query_map([], |row| Ok(key_from_ref(row.get_ref(0)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
    }
}

fn open_read_only(path: &Path) -> Result<Connection, StoreError> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy the open source database into a temporary file.
fn backup_database(src: &Connection) -> Result<NamedTempFile, StoreError> {
    let tmp = NamedTempFile::new().map_err(StoreError::SnapshotFile)?;
    let mut dst = Connection::open(tmp.path()).map_err(StoreError::Snapshot)?;

    {
        let backup = Backup::new(src, &mut dst).map_err(StoreError::Snapshot)?;
        backup
            .run_to_completion(1000, Duration::from_millis(5), None)
            .map_err(StoreError::Snapshot)?;
    }

    debug!(snapshot = %tmp.path().display(), "database snapshot written");
    Ok(tmp)
}

fn key_from_ref(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Text(b) | ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Null => String::new(),
    }
}

fn payload_from_ref(value: ValueRef<'_>) -> Option<Payload> {
    match value {
        ValueRef::Text(b) => Some(match std::str::from_utf8(b) {
            Ok(s) => Payload::Text(s.to_owned()),
            Err(_) => Payload::Bytes(b.to_vec()),
        }),
        ValueRef::Blob(b) => Some(Payload::Bytes(b.to_vec())),
        ValueRef::Integer(i) => Some(Payload::Text(i.to_string())),
        ValueRef::Real(f) => Some(Payload::Text(f.to_string())),
        ValueRef::Null => None,
    }
}
