//! Background log writer
//!
//! One thread per store drains the queue in FIFO order. Every entry is
//! framed, pushed through the compressor and sync-flushed before the next
//! one is taken, so a reader opened afterwards sees it.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use flate2::write::DeflateEncoder;
use tokio::sync::{mpsc, oneshot, watch};

use super::errors::{LogStoreError, LogStoreResult};
use crate::codec::encode_into;
use crate::model::LogEntry;
use crate::observability::{Event, Logger};

pub(crate) struct LogWriter {
    pub(crate) path: PathBuf,
    pub(crate) encoder: DeflateEncoder<File>,
    pub(crate) queue: mpsc::UnboundedReceiver<LogEntry>,
    pub(crate) persisted: watch::Sender<u64>,
    pub(crate) failure: Arc<Mutex<Option<String>>>,
    pub(crate) fsync: bool,
}

impl LogWriter {
    /// Drain until every sender is gone, then finish the stream and report.
    pub(crate) fn run(self, done: oneshot::Sender<LogStoreResult<()>>) {
        let path = self.path.clone();
        let failure = Arc::clone(&self.failure);

        let result = self.drain();
        if let Err(e) = &result {
            *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
            Logger::fatal(
                Event::StoreWriteFailed,
                &[("path", &path.display().to_string()), ("error", &e.to_string())],
            );
        }

        // The store may already be gone
        let _ = done.send(result);
    }

    fn drain(mut self) -> LogStoreResult<()> {
        let mut frame = BytesMut::new();
        let mut written = 0u64;

        while let Some(entry) = self.queue.blocking_recv() {
            frame.clear();
            encode_into(&mut frame, entry.as_bytes());

            self.encoder
                .write_all(&frame)
                .map_err(|e| LogStoreError::io("append", &self.path, e))?;
            self.encoder
                .flush()
                .map_err(|e| LogStoreError::io("flush", &self.path, e))?;
            if self.fsync {
                sync(self.encoder.get_ref(), &self.path)?;
            }

            written += 1;
            self.persisted.send_replace(written);
        }

        let file = self
            .encoder
            .finish()
            .map_err(|e| LogStoreError::io("finish stream", &self.path, e))?;
        sync(&file, &self.path)
    }
}

fn sync(file: &File, path: &Path) -> LogStoreResult<()> {
    file.sync_data()
        .map_err(|e| LogStoreError::io("fsync", path, e))
}
