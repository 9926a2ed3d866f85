//! Per-shard durable append-only log
//!
//! - `write` enqueues and returns; it never waits for the disk
//! - A single background writer appends, flushes and fsyncs each entry
//! - `close` is a barrier: everything enqueued before it is persisted
//! - `read` opens an independent pass from the start of the file
//! - `replay` additionally waits until every entry enqueued before the call
//!   has been persisted

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use tokio::sync::{mpsc, oneshot, watch};

use super::config::{LogStoreConfig, NilEntryPolicy};
use super::errors::{LogStoreError, LogStoreResult};
use super::reader::LogReader;
use super::writer::LogWriter;
use crate::model::LogEntry;
use crate::observability::{Event, Logger};

enum CloseState {
    Open(oneshot::Receiver<LogStoreResult<()>>),
    /// Writer finished; holds its failure, if any
    Closed(Option<String>),
}

pub struct LogStore {
    path: PathBuf,
    config: LogStoreConfig,
    queue: RwLock<Option<mpsc::UnboundedSender<LogEntry>>>,
    /// Entries handed to the writer this session
    enqueued: AtomicU64,
    /// Entries the writer has flushed this session
    persisted: watch::Receiver<u64>,
    failure: Arc<Mutex<Option<String>>>,
    closed: AtomicBool,
    close_state: tokio::sync::Mutex<CloseState>,
}

impl LogStore {
    /// Open or create `<dir>/<log_file_name>` and start its writer.
    ///
    /// An existing file is appended to; this session's entries form a new
    /// compressed stream after the earlier ones.
    pub fn open(dir: impl AsRef<Path>, config: LogStoreConfig) -> LogStoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| LogStoreError::io("create directory", dir, e))?;

        let path = dir.join(&config.log_file_name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LogStoreError::io("open for append", &path, e))?;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (persisted_tx, persisted_rx) = watch::channel(0u64);
        let (done_tx, done_rx) = oneshot::channel();
        let failure = Arc::new(Mutex::new(None));

        let writer = LogWriter {
            path: path.clone(),
            encoder: DeflateEncoder::new(file, Compression::new(config.compression_level.min(9))),
            queue: queue_rx,
            persisted: persisted_tx,
            failure: Arc::clone(&failure),
            fsync: config.fsync,
        };
        thread::Builder::new()
            .name("shardlog-writer".to_string())
            .spawn(move || writer.run(done_tx))
            .map_err(|e| LogStoreError::io("spawn writer", &path, e))?;

        Logger::info(
            Event::StoreOpened,
            &[
                ("path", &path.display().to_string()),
                ("compression_level", &config.compression_level.to_string()),
            ],
        );

        Ok(Self {
            path,
            config,
            queue: RwLock::new(Some(queue_tx)),
            enqueued: AtomicU64::new(0),
            persisted: persisted_rx,
            failure,
            closed: AtomicBool::new(false),
            close_state: tokio::sync::Mutex::new(CloseState::Open(done_rx)),
        })
    }

    /// Queue an entry for appending.
    ///
    /// `None` is the nil entry; see `NilEntryPolicy`. Concurrent callers are
    /// appended in the order their entries reach the queue.
    ///
    /// # Errors
    ///
    /// - `Closed` after `close()`
    /// - `NilEntry` for `None` under `NilEntryPolicy::Reject`
    /// - `WriterFailed` if the background writer has stopped
    pub fn write(&self, entry: Option<LogEntry>) -> LogStoreResult<()> {
        let entry = match entry {
            Some(entry) => entry,
            None => return self.nil_entry(),
        };

        let queue = self.queue.read().unwrap_or_else(PoisonError::into_inner);
        let sender = queue.as_ref().ok_or(LogStoreError::Closed)?;

        self.enqueued.fetch_add(1, Ordering::SeqCst);
        if sender.send(entry).is_err() {
            self.enqueued.fetch_sub(1, Ordering::SeqCst);
            return Err(self.writer_failure());
        }
        Ok(())
    }

    /// `write(Some(entry))`
    pub fn append(&self, entry: LogEntry) -> LogStoreResult<()> {
        self.write(Some(entry))
    }

    fn nil_entry(&self) -> LogStoreResult<()> {
        match self.config.nil_entry_policy {
            NilEntryPolicy::Skip => {
                Logger::warn(
                    Event::StoreNilEntrySkipped,
                    &[("path", &self.path.display().to_string())],
                );
                Ok(())
            }
            NilEntryPolicy::Reject => Err(LogStoreError::NilEntry),
        }
    }

    fn writer_failure(&self) -> LogStoreError {
        let failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        match failure.as_ref() {
            Some(reason) => LogStoreError::WriterFailed(reason.clone()),
            None => LogStoreError::Closed,
        }
    }

    /// Stop accepting writes, drain the queue and close the file.
    ///
    /// Idempotent; a second call returns the first call's outcome without
    /// touching the file.
    pub async fn close(&self) -> LogStoreResult<()> {
        let mut state = self.close_state.lock().await;

        let failure = match std::mem::replace(&mut *state, CloseState::Closed(None)) {
            CloseState::Closed(failure) => failure,
            CloseState::Open(done) => {
                self.closed.store(true, Ordering::SeqCst);
                self.queue
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();

                let failure = match done.await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(_) => Some("log writer exited without reporting".to_string()),
                };
                Logger::info(
                    Event::StoreClosed,
                    &[
                        ("path", &self.path.display().to_string()),
                        ("entries", &self.entries_written().to_string()),
                    ],
                );
                failure
            }
        };

        *state = CloseState::Closed(failure.clone());
        match failure {
            None => Ok(()),
            Some(reason) => Err(LogStoreError::WriterFailed(reason)),
        }
    }

    /// Start an independent pass over the file as it is right now.
    ///
    /// Entries still queued are not included; use `replay` for that.
    pub fn read(&self) -> LogStoreResult<LogReader> {
        LogReader::open(&self.path, self.config.max_frame_len, !self.is_closed())
    }

    /// Wait for every entry enqueued before this call to be persisted, then
    /// start a pass over that point-in-time snapshot.
    pub async fn replay(&self) -> LogStoreResult<LogReader> {
        let target = self.enqueued.load(Ordering::SeqCst);
        let mut persisted = self.persisted.clone();
        // Err: the writer exited, so nothing more will be persisted
        let _ = persisted.wait_for(|n| *n >= target).await;
        self.read()
    }

    /// Entries persisted by this session's writer
    pub fn entries_written(&self) -> u64 {
        *self.persisted.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &LogStoreConfig {
        &self.config
    }
}
