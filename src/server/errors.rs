//! # Server Errors
//!
//! Connection-level errors end that connection's task only. Listener and
//! storage failures stop the server.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::codec::CodecError;
use crate::log_store::LogStoreError;
use crate::model::ModelError;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    // ==================
    // Listener Errors
    // ==================
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("Server already started")]
    AlreadyStarted,

    // ==================
    // Connection Errors
    // ==================
    /// Reading or framing a request failed
    #[error("Connection {peer} receive failed: {source}")]
    Receive {
        peer: SocketAddr,
        #[source]
        source: CodecError,
    },

    /// Writing a reply failed
    #[error("Connection {peer} send failed: {source}")]
    Send {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The request did not parse
    #[error("Connection {peer} sent a bad request: {source}")]
    Request {
        peer: SocketAddr,
        #[source]
        source: ModelError,
    },

    // ==================
    // Storage Errors
    // ==================
    #[error("Storage error: {0}")]
    Storage(#[from] LogStoreError),
}

impl ServerError {
    /// Whether the server must stop
    pub fn is_fatal(&self) -> bool {
        match self {
            ServerError::Bind { .. } | ServerError::Accept(_) => true,
            ServerError::Storage(e) => e.is_fatal(),
            _ => false,
        }
    }
}
