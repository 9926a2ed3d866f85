//! Per-shard durable log storage
//!
//! On disk: a single file of raw deflate streams, one per writer session.
//! Decompressed, it is a back-to-back sequence of frames, each holding one
//! encoded `LogEntry`. There is no header or footer.

mod config;
mod errors;
mod reader;
mod store;
mod writer;

pub use config::{LogStoreConfig, NilEntryPolicy, DEFAULT_COMPRESSION_LEVEL, DEFAULT_LOG_FILE_NAME};
pub use errors::{LogStoreError, LogStoreResult};
pub use reader::LogReader;
pub use store::LogStore;
