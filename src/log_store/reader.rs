//! Sequential log reader
//!
//! A log file is one or more raw deflate streams laid back to back, one per
//! writer session. Decompressed, each stream is a run of frames holding one
//! encoded `LogEntry` each.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Take};
use std::path::{Path, PathBuf};

use flate2::bufread::DeflateDecoder;

use super::errors::{LogStoreError, LogStoreResult};
use crate::codec::{BlockingFrameReader, Frame};
use crate::model::LogEntry;
use crate::observability::{Event, Logger};

/// Decompresses consecutive deflate streams as one byte stream
pub(crate) struct MultiStreamDecoder<R: BufRead> {
    decoder: Option<DeflateDecoder<R>>,
}

impl<R: BufRead> MultiStreamDecoder<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            decoder: Some(DeflateDecoder::new(inner)),
        }
    }
}

impl<R: BufRead> Read for MultiStreamDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let Some(decoder) = self.decoder.as_mut() else {
                return Ok(0);
            };

            let n = decoder.read(buf)?;
            if n > 0 || buf.is_empty() {
                return Ok(n);
            }

            // Stream ended; anything left belongs to the next session
            if decoder.get_mut().fill_buf()?.is_empty() {
                return Ok(0);
            }
            if let Some(finished) = self.decoder.take() {
                self.decoder = Some(DeflateDecoder::new(finished.into_inner()));
            }
        }
    }
}

type FileFrames = BlockingFrameReader<MultiStreamDecoder<BufReader<Take<File>>>>;

/// Lazy, finite pass over a log file.
///
/// Yields entries in append order. Each reader owns its own file handle, so
/// any number of passes may run alongside the writer.
pub struct LogReader {
    path: PathBuf,
    frames: FileFrames,
    writer_open: bool,
    entries: u64,
    done: bool,
}

impl LogReader {
    /// Open a pass bounded by the file's current length.
    ///
    /// `writer_open` decides how a torn tail is treated: while the writer is
    /// live it only means "no more complete entries yet".
    pub(crate) fn open(path: &Path, max_frame_len: usize, writer_open: bool) -> LogStoreResult<Self> {
        let file = File::open(path).map_err(|e| LogStoreError::io("open for read", path, e))?;
        let len = file
            .metadata()
            .map_err(|e| LogStoreError::io("stat", path, e))?
            .len();

        let decoder = MultiStreamDecoder::new(BufReader::new(file.take(len)));
        Ok(Self {
            path: path.to_path_buf(),
            frames: BlockingFrameReader::with_max_frame_len(decoder, max_frame_len),
            writer_open,
            entries: 0,
            done: false,
        })
    }

    /// Entries yielded so far
    pub fn entries_read(&self) -> u64 {
        self.entries
    }

    fn next_entry(&mut self) -> LogStoreResult<Option<LogEntry>> {
        match self.frames.next_frame() {
            Ok(Frame::Payload(payload)) => {
                let entry = LogEntry::from_bytes(payload).map_err(|e| LogStoreError::Corrupt {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })?;
                self.entries += 1;
                Ok(Some(entry))
            }
            Ok(Frame::EndOfTransmission) => Err(LogStoreError::Corrupt {
                path: self.path.clone(),
                reason: "zero-length frame in log".to_string(),
            }),
            Ok(Frame::Closed) => Ok(None),
            Err(e) if e.is_incomplete() && self.writer_open => {
                Logger::trace(
                    Event::StoreReadTruncated,
                    &[
                        ("path", &self.path.display().to_string()),
                        ("entries", &self.entries.to_string()),
                    ],
                );
                Ok(None)
            }
            Err(source) => Err(LogStoreError::Codec {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Iterator for LogReader {
    type Item = LogStoreResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::model::{Identifier, MetaData};
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    fn entry(seq: u64, payload: &[u8]) -> LogEntry {
        LogEntry::new(
            MetaData::new(Identifier::from_u64(1), seq, Identifier::from_u64(seq)),
            payload,
        )
    }

    fn session(entries: &[LogEntry]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
        for e in entries {
            encoder.write_all(&encode(e.as_bytes())).unwrap();
        }
        encoder.finish().unwrap()
    }

    #[test]
    fn test_multi_stream_decoder_joins_sessions() {
        let mut data = session(&[entry(1, b"a")]);
        data.extend(session(&[entry(2, b"b"), entry(3, b"c")]));

        let mut out = Vec::new();
        MultiStreamDecoder::new(Cursor::new(data))
            .read_to_end(&mut out)
            .unwrap();

        let mut expected = Vec::new();
        for e in [entry(1, b"a"), entry(2, b"b"), entry(3, b"c")] {
            expected.extend_from_slice(&encode(e.as_bytes()));
        }
        assert_eq!(out, expected);
    }

    #[test]
    fn test_multi_stream_decoder_empty_input() {
        let mut out = Vec::new();
        MultiStreamDecoder::new(Cursor::new(Vec::new()))
            .read_to_end(&mut out)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_reader_yields_entries_across_sessions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shard.log");

        let mut data = session(&[entry(1, &[1, 2, 3])]);
        data.extend(session(&[entry(2, &[4, 5])]));
        std::fs::write(&path, data).unwrap();

        let entries: Vec<LogEntry> = LogReader::open(&path, 1024, false)
            .unwrap()
            .collect::<LogStoreResult<_>>()
            .unwrap();

        assert_eq!(entries, vec![entry(1, &[1, 2, 3]), entry(2, &[4, 5])]);
    }

    #[test]
    fn test_torn_tail_tolerated_only_while_writer_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shard.log");

        let mut raw = Vec::new();
        raw.extend_from_slice(&encode(entry(1, b"whole").as_bytes()));
        let torn = encode(entry(2, b"torn").as_bytes());
        raw.extend_from_slice(&torn[..torn.len() - 3]);

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&raw).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let mut live = LogReader::open(&path, 1024, true).unwrap();
        assert!(live.next().unwrap().is_ok());
        assert!(live.next().is_none());
        assert_eq!(live.entries_read(), 1);

        let mut closed = LogReader::open(&path, 1024, false).unwrap();
        assert!(closed.next().unwrap().is_ok());
        assert!(matches!(
            closed.next(),
            Some(Err(LogStoreError::Codec { .. }))
        ));
        assert!(closed.next().is_none());
    }
}
