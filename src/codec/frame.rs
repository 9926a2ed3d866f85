//! Length-prefixed frames
//!
//! A frame is `[varint len][len bytes]`. A frame whose declared length is
//! zero is the end-of-transmission marker; payloads that reach the codec
//! are never empty (requests carry a type tag, entries a 24-byte header).

use bytes::{BufMut, Bytes, BytesMut};

use super::errors::{CodecError, CodecResult};
use super::varint;

/// Default ceiling on a single frame's payload
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// The encoded end-of-transmission frame
pub const EOT: [u8; 1] = [0];

/// Outcome of scanning the front of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// A complete frame: payload is `buf[header..header + len]`
    Frame { header: usize, len: usize },
    /// A zero-length frame; consumes one byte
    EndOfTransmission,
    /// The buffer holds only a prefix of the next frame
    NeedMore,
}

impl Scan {
    /// Bytes to discard from the buffer after handling this outcome
    pub fn consumed(&self) -> usize {
        match self {
            Scan::Frame { header, len } => header + len,
            Scan::EndOfTransmission => EOT.len(),
            Scan::NeedMore => 0,
        }
    }
}

/// Encode `payload` as a single frame
pub fn encode(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(varint::encoded_len(payload.len() as u64) + payload.len());
    encode_into(&mut buf, payload);
    buf.freeze()
}

/// Append the frame for `payload` to `buf`
pub fn encode_into(buf: &mut impl BufMut, payload: &[u8]) {
    varint::encode_u64(buf, payload.len() as u64);
    buf.put_slice(payload);
}

/// Append an end-of-transmission marker to `buf`
pub fn write_eot(buf: &mut impl BufMut) {
    buf.put_slice(&EOT);
}

/// Decode one complete frame, returning its payload.
///
/// Trailing bytes after the frame are ignored.
pub fn decode(frame: &[u8]) -> CodecResult<&[u8]> {
    let (len, header) = varint::decode_u64(frame)?.ok_or(CodecError::Truncated {
        declared: 0,
        available: 0,
    })?;

    let available = frame.len() - header;
    if len > available as u64 {
        return Err(CodecError::Truncated {
            declared: len,
            available,
        });
    }

    Ok(&frame[header..header + len as usize])
}

/// Inspect the front of `buf` without consuming it.
///
/// Partial frames yield `Scan::NeedMore`, never an error; only a malformed
/// prefix or an oversized declaration fails.
pub fn scan(buf: &[u8], max_frame_len: usize) -> CodecResult<Scan> {
    let (len, header) = match varint::decode_u64(buf)? {
        Some(decoded) => decoded,
        None => return Ok(Scan::NeedMore),
    };

    if len == 0 {
        return Ok(Scan::EndOfTransmission);
    }

    if len > max_frame_len as u64 {
        return Err(CodecError::FrameTooLarge {
            len,
            max: max_frame_len,
        });
    }

    let len = len as usize;
    if buf.len() - header < len {
        return Ok(Scan::NeedMore);
    }

    Ok(Scan::Frame { header, len })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_prepends_varint_length() {
        let frame = encode(&[1, 2, 3]);
        assert_eq!(frame.as_ref(), &[3, 1, 2, 3]);
    }

    #[test]
    fn test_encode_long_payload_uses_multibyte_prefix() {
        let payload = vec![7u8; 300];
        let frame = encode(&payload);
        assert_eq!(&frame[..2], &[0xAC, 0x02]);
        assert_eq!(frame.len(), 302);
    }

    #[test]
    fn test_decode_inverts_encode() {
        for payload in [vec![], vec![1, 2, 3], vec![0u8; 1000]] {
            let frame = encode(&payload);
            assert_eq!(decode(&frame).unwrap(), payload.as_slice());
        }
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        let err = decode(&[5, 1, 2]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated {
                declared: 5,
                available: 2
            }
        ));
    }

    #[test]
    fn test_decode_rejects_missing_prefix() {
        assert!(matches!(decode(&[]), Err(CodecError::Truncated { .. })));
        assert!(matches!(decode(&[0x80]), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn test_scan_complete_frame() {
        let mut buf = encode(&[9, 8]).to_vec();
        buf.extend_from_slice(&[1, 4]);

        let scan = scan(&buf, DEFAULT_MAX_FRAME_LEN).unwrap();
        assert_eq!(scan, Scan::Frame { header: 1, len: 2 });
        assert_eq!(scan.consumed(), 3);
    }

    #[test]
    fn test_scan_partial_frame_needs_more() {
        let frame = encode(&[1, 2, 3, 4]);
        for cut in 0..frame.len() {
            assert_eq!(
                scan(&frame[..cut], DEFAULT_MAX_FRAME_LEN).unwrap(),
                Scan::NeedMore,
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_scan_eot() {
        let mut buf = Vec::new();
        write_eot(&mut buf);
        assert_eq!(buf, EOT);

        let scan = scan(&buf, DEFAULT_MAX_FRAME_LEN).unwrap();
        assert_eq!(scan, Scan::EndOfTransmission);
        assert_eq!(scan.consumed(), 1);
    }

    #[test]
    fn test_scan_rejects_oversized_declaration() {
        let mut buf = Vec::new();
        varint::encode_u64(&mut buf, 1_000);
        assert!(matches!(
            scan(&buf, 999),
            Err(CodecError::FrameTooLarge { len: 1_000, max: 999 })
        ));
    }
}
