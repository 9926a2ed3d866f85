//! Per-connection request routing
//!
//! ```text
//! ReadingRequests --Write/Replay--> ReadingRequests
//! ReadingRequests --Subscribe-----> Subscribed
//! ReadingRequests --EOF/stop------> Closed
//! Subscribed      --EOF/stop/send error--> Closed
//! ```
//!
//! A subscribed connection never dispatches another request; anything the
//! peer sends afterwards is read and discarded.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use super::errors::{ServerError, ServerResult};
use super::subscribers::SubscriberRegistry;
use crate::codec::{encode_into, write_eot, Frame, FrameReader};
use crate::log_store::{LogStore, LogStoreResult};
use crate::model::{LogEntry, Request, RequestType};
use crate::observability::{Event, Logger, MetricsRegistry};

/// Buffered reply bytes before a replay flushes to the socket
const REPLAY_FLUSH_BYTES: usize = 64 * 1024;

/// Entries read ahead of the socket during a replay
const REPLAY_READ_AHEAD: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    ReadingRequests,
    /// Terminal until the peer disconnects or the server stops
    Subscribed,
    Closed,
}

/// Shared state every connection task needs
#[derive(Clone)]
pub(crate) struct RouterContext {
    pub store: Arc<LogStore>,
    pub subscribers: Arc<SubscriberRegistry>,
    pub metrics: Arc<MetricsRegistry>,
    pub max_frame_len: usize,
    pub shutdown: watch::Receiver<bool>,
}

pub(crate) struct Connection {
    peer: SocketAddr,
    frames: FrameReader<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    state: ConnectionState,
    ctx: RouterContext,
}

/// Resolves once the server has been told to stop
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr, ctx: RouterContext) -> Self {
        let (read, write) = stream.into_split();
        Self {
            peer,
            frames: FrameReader::with_max_frame_len(read, ctx.max_frame_len),
            writer: Some(write),
            state: ConnectionState::ReadingRequests,
            ctx,
        }
    }

    /// Drive the connection to `Closed`
    pub(crate) async fn run(mut self) -> ServerResult<()> {
        loop {
            self.state = match self.state {
                ConnectionState::ReadingRequests => self.read_request().await?,
                ConnectionState::Subscribed => self.serve_subscriber().await,
                ConnectionState::Closed => return Ok(()),
            };
        }
    }

    async fn read_request(&mut self) -> ServerResult<ConnectionState> {
        let frame = tokio::select! {
            frame = self.frames.next_frame() => frame,
            _ = stopped(&mut self.ctx.shutdown) => return Ok(ConnectionState::Closed),
        };

        let payload = match frame {
            Ok(Frame::Payload(payload)) => payload,
            // Stray batch markers carry no request
            Ok(Frame::EndOfTransmission) => return Ok(ConnectionState::ReadingRequests),
            Ok(Frame::Closed) => return Ok(ConnectionState::Closed),
            Err(source) => {
                return Err(ServerError::Receive {
                    peer: self.peer,
                    source,
                })
            }
        };

        let request = Request::from_bytes(payload).map_err(|source| ServerError::Request {
            peer: self.peer,
            source,
        })?;

        match request.request_type() {
            RequestType::Write => {
                self.handle_write(&request)?;
                Ok(ConnectionState::ReadingRequests)
            }
            RequestType::Replay => {
                self.handle_replay().await?;
                Ok(ConnectionState::ReadingRequests)
            }
            RequestType::Subscribe => Ok(ConnectionState::Subscribed),
        }
    }

    /// Append to the store, then fan out to live subscribers
    fn handle_write(&self, request: &Request) -> ServerResult<()> {
        let entry = request.log_entry().map_err(|source| ServerError::Request {
            peer: self.peer,
            source,
        })?;

        match entry {
            Some(entry) => {
                let len = entry.as_bytes().len() as u64;
                self.ctx.store.append(entry.clone())?;
                self.ctx.metrics.record_append(len);
                self.ctx.subscribers.notify(&[entry]);
            }
            None => {
                self.ctx.store.write(None)?;
                self.ctx.metrics.increment_nil_entries();
            }
        }
        Ok(())
    }

    /// Stream a point-in-time dump of the store, then EOT
    async fn handle_replay(&mut self) -> ServerResult<()> {
        let reader = self.ctx.store.replay().await?;
        let (tx, mut rx) = mpsc::channel::<LogStoreResult<LogEntry>>(REPLAY_READ_AHEAD);

        // Decompression is blocking file I/O
        tokio::task::spawn_blocking(move || {
            for entry in reader {
                if tx.blocking_send(entry).is_err() {
                    break;
                }
            }
        });

        let peer = self.peer;
        let writer = self.writer.as_mut().ok_or(ServerError::Send {
            peer,
            source: std::io::ErrorKind::NotConnected.into(),
        })?;
        let send_err = |source: std::io::Error| ServerError::Send { peer, source };

        let mut buf = BytesMut::with_capacity(REPLAY_FLUSH_BYTES);
        let mut count = 0u64;
        while let Some(entry) = rx.recv().await {
            let entry = entry?;
            encode_into(&mut buf, entry.as_bytes());
            count += 1;
            if buf.len() >= REPLAY_FLUSH_BYTES {
                writer.write_all(&buf).await.map_err(send_err)?;
                buf.clear();
            }
        }
        write_eot(&mut buf);
        writer.write_all(&buf).await.map_err(send_err)?;

        self.ctx.metrics.record_replay(count);
        Logger::info(
            Event::ReplayComplete,
            &[("peer", &peer.to_string()), ("entries", &count.to_string())],
        );
        Ok(())
    }

    /// Hand the write half to the registry and wait for the end
    async fn serve_subscriber(&mut self) -> ConnectionState {
        let Some(writer) = self.writer.take() else {
            return ConnectionState::Closed;
        };
        let mut handle = self.ctx.subscribers.register(self.peer, writer);

        let send_failed = loop {
            tokio::select! {
                frame = self.frames.next_frame() => match frame {
                    Ok(Frame::Closed) | Err(_) => break false,
                    Ok(_) => continue,
                },
                sent = &mut handle.sender => break !matches!(sent, Ok(Ok(()))),
                _ = stopped(&mut self.ctx.shutdown) => break false,
            }
        };

        if self.ctx.subscribers.remove(handle.id) && send_failed {
            self.ctx.metrics.increment_subscribers_dropped();
            Logger::warn(
                Event::SubscriberDropped,
                &[
                    ("peer", &self.peer.to_string()),
                    ("subscriber_id", &handle.id.to_string()),
                    ("reason", "send failed"),
                ],
            );
        }
        handle.sender.abort();
        ConnectionState::Closed
    }
}
