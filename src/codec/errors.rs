//! Framing error types

use std::io;

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Wire and on-disk framing errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// Declared payload length runs past the available bytes
    #[error("Frame declares {declared} payload bytes but only {available} are available")]
    Truncated { declared: u64, available: usize },

    /// Length prefix is not a valid 64-bit varint
    #[error("Varint length prefix overflows 64 bits")]
    VarintOverflow,

    /// Declared length is above the configured ceiling
    #[error("Frame length {len} exceeds maximum of {max} bytes")]
    FrameTooLarge { len: u64, max: usize },

    /// Peer closed the stream with a partial frame buffered
    #[error("Stream ended inside a frame ({buffered} bytes buffered)")]
    UnexpectedEof { buffered: usize },

    /// Underlying transport failure
    #[error("I/O error while framing: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// True when the bytes seen so far are a valid prefix of a frame,
    /// i.e. more data could still complete it.
    pub fn is_incomplete(&self) -> bool {
        match self {
            CodecError::Truncated { .. } | CodecError::UnexpectedEof { .. } => true,
            CodecError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
