//! Incremental frame readers over byte streams
//!
//! Both readers keep a single growable buffer. Bytes of an incomplete tail
//! frame stay where they are until the rest arrives; complete payloads are
//! split off the front without copying.

use std::io::{self, Read};

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::errors::{CodecError, CodecResult};
use super::frame::{scan, Scan, DEFAULT_MAX_FRAME_LEN};

const READ_CHUNK: usize = 8 * 1024;

/// One unit produced by a frame reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete, non-empty payload
    Payload(Bytes),
    /// A zero-length frame: the sender finished a bounded transmission
    EndOfTransmission,
    /// The stream ended cleanly on a frame boundary
    Closed,
}

fn take_buffered(buf: &mut BytesMut, max_frame_len: usize) -> CodecResult<Option<Frame>> {
    match scan(buf, max_frame_len)? {
        Scan::NeedMore => Ok(None),
        Scan::EndOfTransmission => {
            buf.advance(Scan::EndOfTransmission.consumed());
            Ok(Some(Frame::EndOfTransmission))
        }
        Scan::Frame { header, len } => {
            buf.advance(header);
            Ok(Some(Frame::Payload(buf.split_to(len).freeze())))
        }
    }
}

fn end_of_stream(buf: &BytesMut) -> CodecResult<Frame> {
    if buf.is_empty() {
        Ok(Frame::Closed)
    } else {
        Err(CodecError::UnexpectedEof {
            buffered: buf.len(),
        })
    }
}

/// Frame reader over an async byte stream (sockets)
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_len(inner, DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(inner: R, max_frame_len: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_frame_len,
        }
    }

    /// Wait for the next complete frame.
    ///
    /// # Errors
    ///
    /// - `UnexpectedEof` if the peer closes mid-frame
    /// - `FrameTooLarge` / `VarintOverflow` on a malformed prefix
    /// - `Io` on transport failure
    pub async fn next_frame(&mut self) -> CodecResult<Frame> {
        loop {
            if let Some(frame) = take_buffered(&mut self.buf, self.max_frame_len)? {
                return Ok(frame);
            }

            self.buf.reserve(READ_CHUNK);
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                return end_of_stream(&self.buf);
            }
        }
    }

    /// Bytes received but not yet returned as frames
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Frame reader over a blocking byte stream (decompressed log files)
#[derive(Debug)]
pub struct BlockingFrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_frame_len: usize,
}

impl<R: Read> BlockingFrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_len(inner, DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(inner: R, max_frame_len: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_frame_len,
        }
    }

    /// Read until the next complete frame; same contract as the async reader.
    pub fn next_frame(&mut self) -> CodecResult<Frame> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = take_buffered(&mut self.buf, self.max_frame_len)? {
                return Ok(frame);
            }

            let n = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return end_of_stream(&self.buf);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
