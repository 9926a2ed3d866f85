//! Entity decoding errors

use thiserror::Error;

use super::request::RequestType;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while interpreting entity bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A log entry was requested from a request that does not carry one
    #[error("Request is not of correct type: expected {expected}, got {actual}")]
    WrongRequestType {
        expected: RequestType,
        actual: RequestType,
    },

    /// The type tag is not one this build understands
    #[error("Unknown request type tag: {0:#04x}")]
    UnknownRequestType(u8),

    /// A request frame with no type tag
    #[error("Empty request")]
    EmptyRequest,

    /// Fewer bytes than the fixed metadata prefix
    #[error("Log entry truncated: {len} bytes, metadata alone is {required}")]
    TruncatedEntry { len: usize, required: usize },
}
