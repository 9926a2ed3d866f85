//! Server and client configuration
//!
//! JSON files with every field optional; missing fields take the defaults
//! below. CLI flags override file values after loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::DEFAULT_MAX_FRAME_LEN;
use crate::log_store::{
    LogStoreConfig, NilEntryPolicy, DEFAULT_COMPRESSION_LEVEL, DEFAULT_LOG_FILE_NAME,
};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> ConfigResult<T> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Shard server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to; 0 picks an ephemeral port (default: 1234)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the shard's log file (default: "data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,

    /// Deflate level 0-9 (default: 9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    #[serde(default)]
    pub nil_entry_policy: NilEntryPolicy,

    /// fsync after every entry (default: true)
    #[serde(default = "default_fsync")]
    pub fsync: bool,

    /// Pending notify bursts per subscriber before it is dropped
    #[serde(default = "default_subscriber_queue_depth")]
    pub subscriber_queue_depth: usize,

    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1234
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_file_name() -> String {
    DEFAULT_LOG_FILE_NAME.to_string()
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_fsync() -> bool {
    true
}

fn default_subscriber_queue_depth() -> usize {
    1024
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            log_file_name: default_log_file_name(),
            compression_level: default_compression_level(),
            nil_entry_policy: NilEntryPolicy::default(),
            fsync: default_fsync(),
            subscriber_queue_depth: default_subscriber_queue_depth(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl ServerConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let config: ServerConfig = load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.compression_level > 9 {
            return Err(ConfigError::Invalid(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        if self.log_file_name.is_empty() {
            return Err(ConfigError::Invalid("log_file_name must not be empty".into()));
        }
        if self.subscriber_queue_depth == 0 {
            return Err(ConfigError::Invalid("subscriber_queue_depth must be > 0".into()));
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::Invalid("max_frame_len must be > 0".into()));
        }
        Ok(())
    }

    /// Loopback, ephemeral port, storage under `data_dir`
    pub fn ephemeral(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_config(&self) -> LogStoreConfig {
        LogStoreConfig {
            log_file_name: self.log_file_name.clone(),
            compression_level: self.compression_level,
            nil_entry_policy: self.nil_entry_policy,
            fsync: self.fsync,
            max_frame_len: self.max_frame_len,
        }
    }
}

/// Read/write client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Shard addresses, `host:port`, in fixed order
    #[serde(default)]
    pub shards: Vec<String>,

    /// Buffered entries per replay stream (default: 1, a single slot)
    #[serde(default = "default_replay_channel_depth")]
    pub replay_channel_depth: usize,

    #[serde(default = "default_subscription_channel_depth")]
    pub subscription_channel_depth: usize,

    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_replay_channel_depth() -> usize {
    1
}

fn default_subscription_channel_depth() -> usize {
    1024
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            shards: Vec::new(),
            replay_channel_depth: default_replay_channel_depth(),
            subscription_channel_depth: default_subscription_channel_depth(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl ClientConfig {
    pub fn with_shards(shards: Vec<String>) -> Self {
        Self {
            shards,
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let config: ClientConfig = load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.shards.is_empty() {
            return Err(ConfigError::Invalid("at least one shard is required".into()));
        }
        if self.replay_channel_depth == 0 || self.subscription_channel_depth == 0 {
            return Err(ConfigError::Invalid("channel depths must be > 0".into()));
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::Invalid("max_frame_len must be > 0".into()));
        }
        Ok(())
    }
}
