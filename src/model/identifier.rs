//! 64-bit writer and transaction identifiers
//!
//! Layout: high 32 bits are the Unix time in seconds at creation, low 32
//! bits are random. Only the high half is time-ordered; two identifiers
//! from the same second compare by their random halves.

use std::fmt;

use chrono::{DateTime, Utc};

/// Time-prefixed random identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(u64);

impl Identifier {
    /// Create a fresh identifier stamped with the current second
    pub fn new() -> Self {
        let secs = Utc::now().timestamp().max(0) as u32;
        Self::from_parts(secs, rand::random::<u32>())
    }

    /// Assemble an identifier from its timestamp and random halves
    pub fn from_parts(timestamp_secs: u32, random: u32) -> Self {
        Self(((timestamp_secs as u64) << 32) | random as u64)
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Creation time, Unix seconds
    pub fn timestamp_secs(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The random low half
    pub fn random_bits(&self) -> u32 {
        self.0 as u32
    }

    /// Creation time with second precision
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp_secs() as i64, 0).unwrap_or_default()
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
