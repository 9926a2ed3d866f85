//! Entity model
//!
//! Fixed-offset binary layouts with no I/O:
//! - `Identifier`: time-prefixed 64-bit id for writers and transactions
//! - `MetaData`: 24-byte header (writer, sequence, transaction)
//! - `LogEntry`: header followed by an opaque payload
//! - `Request`: 1-byte type tag, plus an entry for writes

mod entry;
mod errors;
mod identifier;
mod metadata;
mod request;

pub use entry::LogEntry;
pub use errors::{ModelError, ModelResult};
pub use identifier::Identifier;
pub use metadata::{MetaData, METADATA_LEN};
pub use request::{Request, RequestType};
