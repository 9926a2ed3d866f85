//! Unsigned LEB128 varints used as frame length prefixes
//!
//! Each byte carries 7 bits of the value, least significant group first;
//! the high bit is set on every byte except the last. Encoding is minimal:
//! values 0-127 take one byte, a full u64 takes ten.

use bytes::BufMut;

use super::errors::{CodecError, CodecResult};

/// Longest possible encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

/// Encode an unsigned integer as a varint
pub fn encode_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80;
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Number of bytes `encode_u64` emits for `value`
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Decode a varint from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` ends before the final byte, otherwise the
/// value and the number of bytes it occupied.
pub fn decode_u64(buf: &[u8]) -> CodecResult<Option<(u64, usize)>> {
    let mut value: u64 = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(CodecError::VarintOverflow);
        }

        value |= ((byte & 0x7F) as u64) << (7 * i);

        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }

    Ok(None)
}
