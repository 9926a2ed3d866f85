//! Replay streams and the k-way replay merge
//!
//! Each shard holds a slice of the log in which every writer's entries are
//! already in sequence order. The merge keeps one head entry per shard and
//! always emits the head with the smallest writer sequence number, breaking
//! ties by shard index.
//!
//! The only ordering this yields is per writer: entries of one writer come
//! out in sequence order. Sequence numbers are independent counters per
//! writer, so nothing is implied about real-time order across writers.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinHandle;

use super::errors::{ClientError, ClientResult};
use super::pool::ShardConnection;
use crate::codec::{self, Frame, FrameReader};
use crate::model::{LogEntry, Request};

enum ReplayState {
    Idle,
    Streaming {
        entries: mpsc::Receiver<ClientResult<LogEntry>>,
        _reader: JoinHandle<()>,
    },
    Finished,
}

/// One shard's replay, started on the first `next()`
pub struct ReplayStream {
    connection: Arc<ShardConnection>,
    depth: usize,
    max_frame_len: usize,
    state: ReplayState,
}

impl ReplayStream {
    pub fn new(connection: Arc<ShardConnection>, depth: usize, max_frame_len: usize) -> Self {
        Self {
            connection,
            depth: depth.max(1),
            max_frame_len,
            state: ReplayState::Idle,
        }
    }

    pub fn addr(&self) -> &str {
        self.connection.addr()
    }

    /// Next entry from this shard; `Ok(None)` once the shard sent EOT.
    pub async fn next(&mut self) -> ClientResult<Option<LogEntry>> {
        if let ReplayState::Idle = self.state {
            let (tx, rx) = mpsc::channel(self.depth);
            let reader = tokio::spawn(read_replay(
                Arc::clone(&self.connection),
                tx,
                self.max_frame_len,
            ));
            self.state = ReplayState::Streaming {
                entries: rx,
                _reader: reader,
            };
        }

        let ReplayState::Streaming { entries, .. } = &mut self.state else {
            return Ok(None);
        };

        match entries.recv().await {
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(e)) => {
                self.state = ReplayState::Finished;
                Err(e)
            }
            None => {
                self.state = ReplayState::Finished;
                Ok(None)
            }
        }
    }
}

/// Request a replay on `connection` and forward entries until EOT.
///
/// Holds the connection for the whole exchange. If the consumer goes away
/// the rest of the reply is still drained, so the connection stays usable.
async fn read_replay(
    connection: Arc<ShardConnection>,
    entries: mpsc::Sender<ClientResult<LogEntry>>,
    max_frame_len: usize,
) {
    let addr = connection.addr().to_string();
    let mut guard = connection.lock().await;

    let result: ClientResult<()> = async {
        let stream = guard.as_mut().ok_or(ClientError::Closed)?;
        stream
            .write_all(&codec::encode(&Request::replay().to_bytes()))
            .await
            .map_err(|source| ClientError::Send {
                addr: addr.clone(),
                source,
            })?;

        let mut frames = FrameReader::with_max_frame_len(stream, max_frame_len);
        let mut consumer_gone = false;
        loop {
            let frame = frames
                .next_frame()
                .await
                .map_err(|source| ClientError::Receive {
                    addr: addr.clone(),
                    source,
                })?;
            match frame {
                Frame::Payload(payload) => {
                    let entry = LogEntry::from_bytes(payload)?;
                    if !consumer_gone && entries.send(Ok(entry)).await.is_err() {
                        consumer_gone = true;
                    }
                }
                Frame::EndOfTransmission => return Ok(()),
                Frame::Closed => return Err(ClientError::Disconnected { addr: addr.clone() }),
            }
        }
    }
    .await;

    if let Err(e) = result {
        let _ = entries.send(Err(e)).await;
    }
}

enum Head {
    Unfetched,
    Present(LogEntry),
    Exhausted,
}

/// Streaming k-way merge over one replay stream per shard
pub struct ReplayMerge {
    streams: Vec<ReplayStream>,
    heads: Vec<Head>,
    failed: bool,
    _permit: Option<OwnedSemaphorePermit>,
}

impl ReplayMerge {
    pub fn new(streams: Vec<ReplayStream>) -> Self {
        let heads = streams.iter().map(|_| Head::Unfetched).collect();
        Self {
            streams,
            heads,
            failed: false,
            _permit: None,
        }
    }

    /// Hold `permit` until the merge is dropped
    pub(crate) fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }

    pub fn shard_count(&self) -> usize {
        self.streams.len()
    }

    /// Next merged entry; `Ok(None)` when every shard is exhausted.
    ///
    /// An error from any shard fails the whole merge: skipping a shard would
    /// drop its writers' entries from the middle of their sequences. After an
    /// error the merge yields `Ok(None)`.
    pub async fn next(&mut self) -> ClientResult<Option<LogEntry>> {
        if self.failed {
            return Ok(None);
        }

        for (stream, head) in self.streams.iter_mut().zip(self.heads.iter_mut()) {
            if let Head::Unfetched = head {
                *head = match stream.next().await {
                    Ok(Some(entry)) => Head::Present(entry),
                    Ok(None) => Head::Exhausted,
                    Err(e) => {
                        self.failed = true;
                        return Err(e);
                    }
                };
            }
        }

        let pick = self
            .heads
            .iter()
            .enumerate()
            .filter_map(|(index, head)| match head {
                Head::Present(entry) => Some((entry.metadata().sequence(), index)),
                _ => None,
            })
            .min();

        let Some((_, index)) = pick else {
            self._permit = None;
            return Ok(None);
        };

        match std::mem::replace(&mut self.heads[index], Head::Unfetched) {
            Head::Present(entry) => Ok(Some(entry)),
            _ => Ok(None),
        }
    }

    /// Drain the merge into a vector
    pub async fn read_all(mut self) -> ClientResult<Vec<LogEntry>> {
        let mut out = Vec::new();
        while let Some(entry) = self.next().await? {
            out.push(entry);
        }
        Ok(out)
    }

    pub fn into_stream(self) -> impl Stream<Item = ClientResult<LogEntry>> {
        stream::unfold(self, |mut merge| async move {
            match merge.next().await {
                Ok(Some(entry)) => Some((Ok(entry), merge)),
                Ok(None) => None,
                Err(e) => Some((Err(e), merge)),
            }
        })
    }

    /// Merged payloads only
    pub fn into_payloads(self) -> impl Stream<Item = ClientResult<Bytes>> {
        self.into_stream()
            .map(|entry| entry.map(|entry| entry.payload()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_eot;
    use crate::model::{Identifier, MetaData, RequestType};
    use bytes::BytesMut;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn entry(writer: u64, seq: u64) -> LogEntry {
        LogEntry::new(
            MetaData::new(Identifier::from_u64(writer), seq, Identifier::from_u64(0)),
            &seq.to_le_bytes(),
        )
    }

    /// A fake shard that answers one replay request with `entries` + EOT
    async fn fake_shard(entries: Vec<LogEntry>) -> Arc<ShardConnection> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut frames = FrameReader::new(read);
            while let Frame::Payload(payload) = frames.next_frame().await.unwrap() {
                let request = crate::model::Request::from_bytes(payload).unwrap();
                assert_eq!(request.request_type(), RequestType::Replay);

                let mut reply = BytesMut::new();
                for e in &entries {
                    codec::encode_into(&mut reply, e.as_bytes());
                }
                write_eot(&mut reply);
                write.write_all(&reply).await.unwrap();
            }
        });

        Arc::new(ShardConnection::connect(&addr).await.unwrap())
    }

    fn keys(entries: &[LogEntry]) -> Vec<(u64, u64)> {
        entries
            .iter()
            .map(|e| (e.metadata().writer_id().as_u64(), e.metadata().sequence()))
            .collect()
    }

    #[tokio::test]
    async fn test_merge_orders_single_writer_across_shards() {
        let shards = vec![
            fake_shard(vec![entry(1, 1), entry(1, 4)]).await,
            fake_shard(vec![entry(1, 2), entry(1, 5)]).await,
            fake_shard(vec![entry(1, 3)]).await,
        ];
        let streams = shards
            .into_iter()
            .map(|c| ReplayStream::new(c, 1, 1024))
            .collect();

        let merged = ReplayMerge::new(streams).read_all().await.unwrap();
        let seqs: Vec<u64> = merged.iter().map(|e| e.metadata().sequence()).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_ties_break_by_shard_index() {
        let shards = vec![
            fake_shard(vec![entry(7, 1)]).await,
            fake_shard(vec![entry(3, 1)]).await,
        ];
        let streams = shards
            .into_iter()
            .map(|c| ReplayStream::new(c, 1, 1024))
            .collect();

        let merged = ReplayMerge::new(streams).read_all().await.unwrap();
        assert_eq!(keys(&merged), vec![(7, 1), (3, 1)]);
    }

    #[tokio::test]
    async fn test_empty_shards_exhaust_immediately() {
        let shards = vec![fake_shard(vec![]).await, fake_shard(vec![]).await];
        let streams = shards
            .into_iter()
            .map(|c| ReplayStream::new(c, 1, 1024))
            .collect();

        let mut merge = ReplayMerge::new(streams);
        assert!(merge.next().await.unwrap().is_none());
        assert!(merge.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_requests_replay_only_once() {
        let connection = fake_shard(vec![entry(1, 1)]).await;
        let mut stream = ReplayStream::new(connection, 1, 1024);

        assert!(stream.next().await.unwrap().is_some());
        assert!(stream.next().await.unwrap().is_none());
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shard_closing_mid_stream_fails_merge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut reply = BytesMut::new();
            codec::encode_into(&mut reply, entry(1, 1).as_bytes());
            stream.write_all(&reply).await.unwrap();
        });
        let connection = Arc::new(ShardConnection::connect(&addr).await.unwrap());

        let mut merge = ReplayMerge::new(vec![ReplayStream::new(connection, 1, 1024)]);
        let mut saw_error = false;
        for _ in 0..3 {
            match merge.next().await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    assert!(e.is_connection_error());
                    saw_error = true;
                }
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn test_payload_stream() {
        let connection = fake_shard(vec![entry(1, 1), entry(1, 2)]).await;
        let merge = ReplayMerge::new(vec![ReplayStream::new(connection, 1, 1024)]);

        let payloads: Vec<Bytes> = merge
            .into_payloads()
            .map(|p| p.unwrap())
            .collect()
            .await;
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1].as_ref(), &2u64.to_le_bytes());
    }
}
