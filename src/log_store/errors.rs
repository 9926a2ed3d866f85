//! Log store errors
//!
//! Storage failures are fatal for the owning shard: an append-only log must
//! not silently skip entries it cannot persist. `Closed` and `NilEntry` are
//! caller errors and leave the store usable.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;

/// Result type for log store operations
pub type LogStoreResult<T> = Result<T, LogStoreError>;

#[derive(Debug, Error)]
pub enum LogStoreError {
    /// File or directory I/O failed
    #[error("Log store I/O failed ({op}) at {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The background writer stopped after an error
    #[error("Log writer failed: {0}")]
    WriterFailed(String),

    /// Write attempted after `close()`
    #[error("Log store is closed")]
    Closed,

    /// Nil write rejected by policy
    #[error("Nil log entry rejected")]
    NilEntry,

    /// The decompressed log does not parse as frames
    #[error("Log file {} is not a valid frame stream: {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    /// A frame parsed but its content is not a log entry
    #[error("Log file {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl LogStoreError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        LogStoreError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Whether the shard can keep serving after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LogStoreError::Closed | LogStoreError::NilEntry)
    }
}
