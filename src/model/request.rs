//! Client request envelopes
//!
//! `[1-byte type][LogEntry bytes if Write]`. The envelope is the payload of
//! one wire frame.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::entry::LogEntry;
use super::errors::{ModelError, ModelResult};

/// Request type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestType {
    Write = 0,
    Replay = 1,
    Subscribe = 2,
}

impl RequestType {
    pub fn from_u8(tag: u8) -> ModelResult<Self> {
        match tag {
            0 => Ok(RequestType::Write),
            1 => Ok(RequestType::Replay),
            2 => Ok(RequestType::Subscribe),
            other => Err(ModelError::UnknownRequestType(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestType::Write => "Write",
            RequestType::Replay => "Replay",
            RequestType::Subscribe => "Subscribe",
        };
        f.write_str(name)
    }
}

/// A request as sent by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    kind: RequestType,
    body: Bytes,
}

impl Request {
    pub fn write(entry: &LogEntry) -> Self {
        Self {
            kind: RequestType::Write,
            body: entry.as_bytes().clone(),
        }
    }

    pub fn replay() -> Self {
        Self {
            kind: RequestType::Replay,
            body: Bytes::new(),
        }
    }

    pub fn subscribe() -> Self {
        Self {
            kind: RequestType::Subscribe,
            body: Bytes::new(),
        }
    }

    pub fn request_type(&self) -> RequestType {
        self.kind
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(1 + self.body.len());
        out.put_u8(self.kind.as_u8());
        out.put_slice(&self.body);
        out.freeze()
    }

    /// Parse an envelope from one frame payload.
    pub fn from_bytes(mut raw: Bytes) -> ModelResult<Self> {
        if raw.is_empty() {
            return Err(ModelError::EmptyRequest);
        }
        let kind = RequestType::from_u8(raw[0])?;
        let body = raw.split_off(1);
        Ok(Self { kind, body })
    }

    /// The embedded entry of a write request.
    ///
    /// A write with no body yields `Ok(None)`: the nil entry, whose handling
    /// is up to the log store.
    pub fn log_entry(&self) -> ModelResult<Option<LogEntry>> {
        if self.kind != RequestType::Write {
            return Err(ModelError::WrongRequestType {
                expected: RequestType::Write,
                actual: self.kind,
            });
        }
        if self.body.is_empty() {
            return Ok(None);
        }
        LogEntry::from_bytes(self.body.clone()).map(Some)
    }
}
