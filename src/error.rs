use std::path::PathBuf;

use thiserror::Error;

/// A payload that could not be turned into UTF-8 text.
///
/// Not fatal: callers switch to the hex preview (display) or write the bytes
/// as-is (text export).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8 ({} bytes)", .bytes.len())]
    Binary {
        /// The bytes that failed to decode (post-decompression when the payload was zlib).
        bytes: Vec<u8>,
        was_compressed: bool,
    },
}

impl DecodeError {
    pub fn bytes(&self) -> &[u8] {
        match self {
            DecodeError::Binary { bytes, .. } => bytes,
        }
    }
}

/// A single row that could not be turned into a catalog entry. The row is dropped.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record {key:?} has no payload")]
    MissingPayload { key: String },
}

/// Failure to read the backing store. Fatal for the whole load.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to open database {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create snapshot file: {0}")]
    SnapshotFile(#[source] std::io::Error),
    #[error("failed to snapshot database: {0}")]
    Snapshot(#[source] rusqlite::Error),
    #[error("failed to read records: {0}")]
    Query(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot export binary data as JSON")]
    BinaryAsJson,
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
