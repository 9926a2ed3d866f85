//! # Client Errors

use std::io;

use thiserror::Error;

use crate::codec::CodecError;
use crate::model::ModelError;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    // ==================
    // Configuration Errors
    // ==================
    /// A client needs at least one shard
    #[error("No shards configured")]
    NoShards,

    // ==================
    // Connection Errors
    // ==================
    /// Dialing a shard failed
    #[error("Failed to connect to shard {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Writing to a shard connection failed
    #[error("Failed to send to shard {addr}: {source}")]
    Send {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Reading from a shard connection failed or produced a bad frame
    #[error("Failed to receive from shard {addr}: {source}")]
    Receive {
        addr: String,
        #[source]
        source: CodecError,
    },

    /// The shard closed the connection before the stream was complete
    #[error("Shard {addr} closed the connection mid-stream")]
    Disconnected { addr: String },

    /// The shard sent something the protocol does not allow here
    #[error("Protocol violation from shard {addr}: {reason}")]
    Protocol { addr: String, reason: String },

    // ==================
    // Data Errors
    // ==================
    /// A received entry did not decode
    #[error("Invalid entry: {0}")]
    Model(#[from] ModelError),

    // ==================
    // Lifecycle Errors
    // ==================
    /// Operation on a closed client or connection
    #[error("Client is closed")]
    Closed,

    /// The background writer stopped for a reason other than the socket
    #[error("Write client failed: {0}")]
    WriterFailed(String),
}

impl ClientError {
    /// Whether this error came from the transport
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. }
                | ClientError::Send { .. }
                | ClientError::Receive { .. }
                | ClientError::Disconnected { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_classified() {
        let err = ClientError::Connect {
            addr: "127.0.0.1:1".into(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.is_connection_error());
        assert!(err.to_string().contains("127.0.0.1:1"));

        assert!(!ClientError::NoShards.is_connection_error());
        assert!(!ClientError::Closed.is_connection_error());
    }
}
