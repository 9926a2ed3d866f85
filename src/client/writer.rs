//! Write client
//!
//! Sequence numbers are assigned under the queue lock, so queue order is
//! sequence order. A single consumer task sends in queue order, picking
//! shards round robin.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};

use super::errors::{ClientError, ClientResult};
use super::pool::ConnectionPool;
use crate::codec;
use crate::config::ClientConfig;
use crate::model::{Identifier, LogEntry, MetaData, Request};
use crate::observability::{Event, Logger};

enum WriteCommand {
    Entry(LogEntry),
    Flush(oneshot::Sender<ClientResult<()>>),
}

/// First failure of the send task, kept so every later call can rebuild it
#[derive(Debug, Clone)]
enum SendFailure {
    /// The shard socket failed; surfaces as `ClientError::Send`
    Transport {
        addr: String,
        kind: io::ErrorKind,
        message: String,
    },
    Other(String),
}

impl SendFailure {
    fn from_error(err: &ClientError) -> Self {
        match err {
            ClientError::Send { addr, source } => SendFailure::Transport {
                addr: addr.clone(),
                kind: source.kind(),
                message: source.to_string(),
            },
            other => SendFailure::Other(other.to_string()),
        }
    }

    fn from_join_error(err: &JoinError) -> Self {
        SendFailure::Other(format!("send task ended abnormally: {}", err))
    }

    fn to_error(&self) -> ClientError {
        match self {
            SendFailure::Transport {
                addr,
                kind,
                message,
            } => ClientError::Send {
                addr: addr.clone(),
                source: io::Error::new(*kind, message.clone()),
            },
            SendFailure::Other(reason) => ClientError::WriterFailed(reason.clone()),
        }
    }
}

type FailureSlot = Arc<Mutex<Option<SendFailure>>>;

/// Keep the first failure only
fn record_failure(slot: &FailureSlot, failure: SendFailure) {
    let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if current.is_none() {
        *current = Some(failure);
    }
}

/// Writes entries for one writer identity across a shard set.
///
/// A `WriteClient` owns its sequence counter; never build two clients with
/// the same writer id.
pub struct WriteClient {
    writer_id: Identifier,
    sequence: AtomicU64,
    pool: Arc<ConnectionPool>,
    queue: Mutex<Option<mpsc::UnboundedSender<WriteCommand>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    failure: FailureSlot,
}

impl WriteClient {
    /// Connect to every configured shard with a fresh writer id
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        Self::connect_as(config, Identifier::new()).await
    }

    pub async fn connect_as(config: &ClientConfig, writer_id: Identifier) -> ClientResult<Self> {
        let pool = Arc::new(ConnectionPool::connect(&config.shards).await?);
        let failure = Arc::new(Mutex::new(None));
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(send_loop(Arc::clone(&pool), rx, Arc::clone(&failure)));

        Ok(Self {
            writer_id,
            sequence: AtomicU64::new(0),
            pool,
            queue: Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            failure,
        })
    }

    pub fn writer_id(&self) -> Identifier {
        self.writer_id
    }

    /// Last sequence number assigned; 0 before the first write
    pub fn sequence_number(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Queue `payload` and return its sequence number.
    ///
    /// Does not wait for the send. A failed send surfaces on the next
    /// `write`, `flush` or `close`; socket failures as `ClientError::Send`.
    pub fn write(&self, payload: &[u8]) -> ClientResult<u64> {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = queue.as_ref().ok_or(ClientError::Closed)?;
        if let Some(failure) = self.failed() {
            return Err(failure.to_error());
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let metadata = MetaData::new(self.writer_id, sequence, Identifier::new());
        sender
            .send(WriteCommand::Entry(LogEntry::new(metadata, payload)))
            .map_err(|_| ClientError::Closed)?;

        Ok(sequence)
    }

    /// Wait until everything queued so far has been sent.
    pub async fn flush(&self) -> ClientResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        {
            let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let sender = queue.as_ref().ok_or(ClientError::Closed)?;
            sender
                .send(WriteCommand::Flush(ack_tx))
                .map_err(|_| ClientError::Closed)?;
        }
        ack_rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Stop accepting writes, send everything queued, then close every
    /// connection. Idempotent.
    pub async fn close(&self) -> ClientResult<()> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                Logger::error(
                    Event::ClientWriteFailed,
                    &[
                        ("writer_id", &self.writer_id.to_string()),
                        ("error", &e.to_string()),
                    ],
                );
                record_failure(&self.failure, SendFailure::from_join_error(&e));
            }
            self.pool.close().await;
            Logger::info(
                Event::ClientClosed,
                &[
                    ("writer_id", &self.writer_id.to_string()),
                    ("sequence", &self.sequence_number().to_string()),
                ],
            );
        }

        match self.failed() {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    fn failed(&self) -> Option<SendFailure> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn send_loop(
    pool: Arc<ConnectionPool>,
    mut queue: mpsc::UnboundedReceiver<WriteCommand>,
    failure: FailureSlot,
) {
    let mut failed: Option<SendFailure> = None;

    while let Some(command) = queue.recv().await {
        match command {
            WriteCommand::Entry(entry) => {
                // After a failure later entries are dropped; the gap is reported
                if failed.is_some() {
                    continue;
                }
                let frame: Bytes = codec::encode(&Request::write(&entry).to_bytes());
                let connection = pool.next();
                if let Err(e) = connection.send(&frame).await {
                    Logger::error(
                        Event::ClientWriteFailed,
                        &[
                            ("shard", connection.addr()),
                            ("sequence", &entry.metadata().sequence().to_string()),
                            ("error", &e.to_string()),
                        ],
                    );
                    let cause = SendFailure::from_error(&e);
                    record_failure(&failure, cause.clone());
                    failed = Some(cause);
                }
            }
            WriteCommand::Flush(ack) => {
                let result = match &failed {
                    Some(cause) => Err(cause.to_error()),
                    None => Ok(()),
                };
                let _ = ack.send(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Frame, FrameReader};
    use crate::model::RequestType;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn shard() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    async fn received(listener: TcpListener) -> Vec<LogEntry> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut frames = FrameReader::new(stream);
        let mut entries = Vec::new();
        while let Frame::Payload(payload) = frames.next_frame().await.unwrap() {
            let request = Request::from_bytes(payload).unwrap();
            assert_eq!(request.request_type(), RequestType::Write);
            entries.push(request.log_entry().unwrap().unwrap());
        }
        entries
    }

    #[tokio::test]
    async fn test_sequence_starts_at_one_and_alternates_shards() {
        let (first, first_addr) = shard().await;
        let (second, second_addr) = shard().await;
        let first = tokio::spawn(received(first));
        let second = tokio::spawn(received(second));

        let config = ClientConfig::with_shards(vec![first_addr, second_addr]);
        let client = WriteClient::connect(&config).await.unwrap();
        for i in 0..4u8 {
            client.write(&[i]).unwrap();
        }
        client.close().await.unwrap();

        let first = first.await.unwrap();
        let second = second.await.unwrap();
        let seqs = |entries: &[LogEntry]| -> Vec<u64> {
            entries.iter().map(|e| e.metadata().sequence()).collect()
        };
        assert_eq!(seqs(&first), vec![1, 3]);
        assert_eq!(seqs(&second), vec![2, 4]);
        assert_eq!(first[1].payload().as_ref(), &[2]);
        assert!(first
            .iter()
            .chain(second.iter())
            .all(|e| e.metadata().writer_id() == client.writer_id()));
    }

    #[tokio::test]
    async fn test_transaction_ids_are_fresh_per_write() {
        let (listener, addr) = shard().await;
        let receiver = tokio::spawn(received(listener));

        let client = WriteClient::connect(&ClientConfig::with_shards(vec![addr]))
            .await
            .unwrap();
        client.write(b"a").unwrap();
        client.write(b"b").unwrap();
        client.flush().await.unwrap();
        assert_eq!(client.sequence_number(), 2);
        client.close().await.unwrap();

        let entries = receiver.await.unwrap();
        assert_ne!(
            entries[0].metadata().transaction_id(),
            entries[1].metadata().transaction_id()
        );
    }

    #[tokio::test]
    async fn test_write_after_close_is_rejected() {
        let (listener, addr) = shard().await;
        let receiver = tokio::spawn(received(listener));

        let client = WriteClient::connect(&ClientConfig::with_shards(vec![addr]))
            .await
            .unwrap();
        client.close().await.unwrap();
        client.close().await.unwrap();

        assert!(matches!(client.write(b"late"), Err(ClientError::Closed)));
        assert!(matches!(client.flush().await, Err(ClientError::Closed)));
        assert!(receiver.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_shard_surfaces_as_connection_error() {
        let (listener, addr) = shard().await;
        let client = WriteClient::connect(&ClientConfig::with_shards(vec![addr.clone()]))
            .await
            .unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
        drop(listener);

        let err = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Err(e) = client.write(b"lost") {
                    break e;
                }
                if let Err(e) = client.flush().await {
                    break e;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("send failure never surfaced");

        assert!(err.is_connection_error(), "unexpected error {:?}", err);
        assert!(matches!(&err, ClientError::Send { addr: failed, .. } if *failed == addr));

        let closed = client.close().await.unwrap_err();
        assert!(closed.is_connection_error());
    }

    #[tokio::test]
    async fn test_panicked_send_task_is_reported() {
        let joined = tokio::spawn(async { panic!("send task blew up") }).await;
        let err = joined.unwrap_err();

        let slot: FailureSlot = Arc::new(Mutex::new(None));
        record_failure(&slot, SendFailure::from_join_error(&err));
        record_failure(&slot, SendFailure::Other("later".into()));

        let surfaced = slot.lock().unwrap().clone().unwrap().to_error();
        assert!(matches!(&surfaced, ClientError::WriterFailed(reason) if reason.contains("abnormally")));
        assert!(!surfaced.is_connection_error());
    }
}
