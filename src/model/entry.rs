//! Log entries: header plus opaque payload
//!
//! The encoded form is the 24-byte header followed directly by the payload.
//! The payload is everything after the header, so it may be empty.

use bytes::{BufMut, Bytes, BytesMut};

use super::errors::{ModelError, ModelResult};
use super::metadata::{MetaData, METADATA_LEN};

/// An immutable, encoded log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    metadata: MetaData,
    raw: Bytes,
}

impl LogEntry {
    pub fn new(metadata: MetaData, payload: &[u8]) -> Self {
        let mut raw = BytesMut::with_capacity(METADATA_LEN + payload.len());
        raw.put_slice(&metadata.to_bytes());
        raw.put_slice(payload);

        Self {
            metadata,
            raw: raw.freeze(),
        }
    }

    /// Interpret `raw` as an encoded entry without copying.
    pub fn from_bytes(raw: Bytes) -> ModelResult<Self> {
        let header: &[u8; METADATA_LEN] = raw
            .get(..METADATA_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or(ModelError::TruncatedEntry {
                len: raw.len(),
                required: METADATA_LEN,
            })?;
        let metadata = MetaData::from_bytes(header);

        Ok(Self { metadata, raw })
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    pub fn payload(&self) -> Bytes {
        self.raw.slice(METADATA_LEN..)
    }

    /// The full encoded entry, header included
    pub fn as_bytes(&self) -> &Bytes {
        &self.raw
    }

    pub fn into_parts(self) -> (MetaData, Bytes) {
        let payload = self.payload();
        (self.metadata, payload)
    }
}
