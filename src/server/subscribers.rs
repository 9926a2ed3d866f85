//! Live subscriber registry
//!
//! Each subscriber owns a bounded outbox drained by its own sender task, so
//! `notify` never waits on a socket. A subscriber whose outbox is full or
//! whose sender task has ended is dropped from the registry; nobody else is
//! affected.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::codec::{encode_into, write_eot, EOT};
use crate::model::LogEntry;
use crate::observability::{Event, Logger, MetricsRegistry};

#[derive(Debug)]
struct Subscriber {
    id: u64,
    peer: SocketAddr,
    outbox: mpsc::Sender<Bytes>,
}

/// A registered subscriber's id and the task writing to its socket
#[derive(Debug)]
pub struct SubscriberHandle {
    pub id: u64,
    pub sender: JoinHandle<io::Result<()>>,
}

#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    queue_depth: usize,
    metrics: Arc<MetricsRegistry>,
}

impl SubscriberRegistry {
    pub fn new(queue_depth: usize, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            queue_depth: queue_depth.max(1),
            metrics,
        }
    }

    /// Register a connection's write half.
    ///
    /// An empty burst (a lone EOT) is queued ahead of any notification; it
    /// tells the client the registration is live.
    pub fn register(&self, peer: SocketAddr, writer: OwnedWriteHalf) -> SubscriberHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbox, bursts) = mpsc::channel(self.queue_depth);
        let _ = outbox.try_send(Bytes::from_static(&EOT));

        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(Subscriber { id, peer, outbox });
        }
        // The ack may only reach the peer once the subscriber is listed
        let sender = tokio::spawn(send_bursts(writer, bursts));
        self.metrics.increment_subscribers_registered();
        Logger::info(
            Event::SubscriberRegistered,
            &[("peer", &peer.to_string()), ("subscriber_id", &id.to_string())],
        );

        SubscriberHandle { id, sender }
    }

    /// Remove a subscriber; false if it was already gone
    pub fn remove(&self, id: u64) -> bool {
        match self.subscribers.lock() {
            Ok(mut subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|s| s.id != id);
                subscribers.len() != before
            }
            Err(_) => false,
        }
    }

    /// Fan one burst out to every subscriber: each entry's frame, then EOT.
    ///
    /// Returns how many subscribers the burst was queued for.
    pub fn notify(&self, entries: &[LogEntry]) -> usize {
        let mut burst = BytesMut::new();
        for entry in entries {
            encode_into(&mut burst, entry.as_bytes());
        }
        write_eot(&mut burst);
        let burst = burst.freeze();

        let Ok(mut subscribers) = self.subscribers.lock() else {
            return 0;
        };

        subscribers.retain(|subscriber| match subscriber.outbox.try_send(burst.clone()) {
            Ok(()) => true,
            Err(err) => {
                let reason = match err {
                    TrySendError::Full(_) => "outbox full",
                    TrySendError::Closed(_) => "connection closed",
                };
                self.metrics.increment_subscribers_dropped();
                Logger::warn(
                    Event::SubscriberDropped,
                    &[
                        ("peer", &subscriber.peer.to_string()),
                        ("subscriber_id", &subscriber.id.to_string()),
                        ("reason", reason),
                    ],
                );
                false
            }
        });
        subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn send_bursts(
    mut writer: OwnedWriteHalf,
    mut bursts: mpsc::Receiver<Bytes>,
) -> io::Result<()> {
    while let Some(burst) = bursts.recv().await {
        writer.write_all(&burst).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Frame, FrameReader};
    use crate::model::{Identifier, MetaData};
    use tokio::net::{TcpListener, TcpStream};

    fn entry(seq: u64) -> LogEntry {
        LogEntry::new(
            MetaData::new(Identifier::from_u64(1), seq, Identifier::from_u64(0)),
            b"live",
        )
    }

    /// (server-side write half, peer, client-side stream)
    async fn pair() -> (OwnedWriteHalf, SocketAddr, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        let (_read, write) = server.into_split();
        (write, peer, client)
    }

    #[tokio::test]
    async fn test_registration_ack_then_bursts() {
        let registry = SubscriberRegistry::new(8, Arc::new(MetricsRegistry::new()));
        let (writer, peer, client) = pair().await;
        registry.register(peer, writer);

        assert_eq!(registry.notify(&[entry(1), entry(2)]), 1);

        let mut frames = FrameReader::new(client);
        assert_eq!(frames.next_frame().await.unwrap(), Frame::EndOfTransmission);
        assert!(matches!(frames.next_frame().await.unwrap(), Frame::Payload(_)));
        assert!(matches!(frames.next_frame().await.unwrap(), Frame::Payload(_)));
        assert_eq!(frames.next_frame().await.unwrap(), Frame::EndOfTransmission);
    }

    #[tokio::test]
    async fn test_dead_sender_drops_subscriber() {
        let metrics = Arc::new(MetricsRegistry::new());
        let registry = SubscriberRegistry::new(1, Arc::clone(&metrics));

        let (writer, peer, _client) = pair().await;
        let handle = registry.register(peer, writer);
        // With its sender task gone the outbox is closed
        handle.sender.abort();
        let _ = handle.sender.await;

        assert_eq!(registry.notify(&[entry(1)]), 0);
        assert_eq!(metrics.snapshot().subscribers_dropped, 1);
        assert!(!registry.remove(handle.id));
    }

    #[tokio::test]
    async fn test_remove_unregisters() {
        let registry = SubscriberRegistry::new(8, Arc::new(MetricsRegistry::new()));
        let (writer, peer, _client) = pair().await;
        let handle = registry.register(peer, writer);

        assert_eq!(registry.len(), 1);
        assert!(registry.remove(handle.id));
        assert!(registry.is_empty());
        assert_eq!(registry.notify(&[entry(1)]), 0);
    }
}
