//! CLI-specific error types
//!
//! All CLI errors are fatal: the process prints the error and exits 1.

use std::fmt;
use std::io;

use crate::client::ClientError;
use crate::config::ConfigError;
use crate::log_store::LogStoreError;
use crate::server::ServerError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file or flag error
    ConfigError,
    /// I/O error (stdin/stdout)
    IoError,
    /// Runtime or listener could not start
    BootFailed,
    /// The shard's log store failed
    StorageFailed,
    /// The server stopped with an error
    ServerFailed,
    /// A client operation failed
    ClientFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "SHARDLOG_CLI_CONFIG_ERROR",
            Self::IoError => "SHARDLOG_CLI_IO_ERROR",
            Self::BootFailed => "SHARDLOG_CLI_BOOT_FAILED",
            Self::StorageFailed => "SHARDLOG_CLI_STORAGE_FAILED",
            Self::ServerFailed => "SHARDLOG_CLI_SERVER_FAILED",
            Self::ClientFailed => "SHARDLOG_CLI_CLIENT_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<LogStoreError> for CliError {
    fn from(e: LogStoreError) -> Self {
        Self::new(CliErrorCode::StorageFailed, e.to_string())
    }
}

impl From<ServerError> for CliError {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::Bind { .. } => Self::boot_failed(e.to_string()),
            other => Self::new(CliErrorCode::ServerFailed, other.to_string()),
        }
    }
}

impl From<ClientError> for CliError {
    fn from(e: ClientError) -> Self {
        Self::new(CliErrorCode::ClientFailed, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
