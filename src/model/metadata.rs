//! Fixed 24-byte entry header
//!
//! Layout (little-endian):
//!
//! | offset | size | field           |
//! |--------|------|-----------------|
//! | 0      | 8    | writer id       |
//! | 8      | 8    | sequence number |
//! | 16     | 8    | transaction id  |

use super::identifier::Identifier;

/// Encoded size of a `MetaData`
pub const METADATA_LEN: usize = 24;

/// Per-entry header carrying writer identity and ordering key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetaData {
    writer_id: Identifier,
    sequence: u64,
    transaction_id: Identifier,
}

impl MetaData {
    pub fn new(writer_id: Identifier, sequence: u64, transaction_id: Identifier) -> Self {
        Self {
            writer_id,
            sequence,
            transaction_id,
        }
    }

    pub fn writer_id(&self) -> Identifier {
        self.writer_id
    }

    /// Per-writer sequence number; the merge ordering key
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn transaction_id(&self) -> Identifier {
        self.transaction_id
    }

    pub fn to_bytes(&self) -> [u8; METADATA_LEN] {
        let mut out = [0u8; METADATA_LEN];
        out[0..8].copy_from_slice(&self.writer_id.as_u64().to_le_bytes());
        out[8..16].copy_from_slice(&self.sequence.to_le_bytes());
        out[16..24].copy_from_slice(&self.transaction_id.as_u64().to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; METADATA_LEN]) -> Self {
        let word = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(raw)
        };

        Self {
            writer_id: Identifier::from_u64(word(0)),
            sequence: word(8),
            transaction_id: Identifier::from_u64(word(16)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_survive_encoding() {
        let meta = MetaData::new(Identifier::from_u64(11), 42, Identifier::from_u64(99));
        let decoded = MetaData::from_bytes(&meta.to_bytes());

        assert_eq!(decoded.writer_id().as_u64(), 11);
        assert_eq!(decoded.sequence(), 42);
        assert_eq!(decoded.transaction_id().as_u64(), 99);
    }

    #[test]
    fn test_layout_is_little_endian_fixed_offsets() {
        let meta = MetaData::new(
            Identifier::from_u64(0x0102_0304_0506_0708),
            1,
            Identifier::from_u64(u64::MAX),
        );
        let bytes = meta.to_bytes();

        assert_eq!(&bytes[0..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&bytes[8..16], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[16..24], &[0xFF; 8]);
    }
}
