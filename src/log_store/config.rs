//! Log store tuning

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_MAX_FRAME_LEN;

/// Default backing file name inside the store directory
pub const DEFAULT_LOG_FILE_NAME: &str = "shard.log";

/// Default deflate level: best compression
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 9;

/// What `write(None)` does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NilEntryPolicy {
    /// Log and return success without writing anything
    #[default]
    Skip,
    /// Return `LogStoreError::NilEntry`
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStoreConfig {
    pub log_file_name: String,
    /// Deflate level, 0-9
    pub compression_level: u32,
    pub nil_entry_policy: NilEntryPolicy,
    /// fsync after every flushed entry
    pub fsync: bool,
    pub max_frame_len: usize,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            log_file_name: DEFAULT_LOG_FILE_NAME.to_string(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            nil_entry_policy: NilEntryPolicy::default(),
            fsync: true,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}
