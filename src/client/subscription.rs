//! Live tail across every shard
//!
//! One dedicated connection per shard. Entries from all shards land in one
//! channel in arrival order; there is no cross-shard ordering here.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::errors::{ClientError, ClientResult};
use crate::codec::{self, Frame, FrameReader};
use crate::model::{LogEntry, Request};

pub struct Subscription {
    entries: mpsc::Receiver<ClientResult<LogEntry>>,
    listeners: Vec<JoinHandle<()>>,
}

impl Subscription {
    /// Subscribe on every shard.
    ///
    /// Returns once every shard has confirmed the registration with an empty
    /// burst, so entries written after this returns are delivered.
    pub async fn open(shards: &[String], depth: usize, max_frame_len: usize) -> ClientResult<Self> {
        if shards.is_empty() {
            return Err(ClientError::NoShards);
        }

        let (tx, rx) = mpsc::channel(depth.max(1));
        let mut subscription = Self {
            entries: rx,
            listeners: Vec::with_capacity(shards.len()),
        };

        for addr in shards {
            let frames = register(addr, max_frame_len).await?;
            subscription
                .listeners
                .push(tokio::spawn(listen(addr.clone(), frames, tx.clone())));
        }

        Ok(subscription)
    }

    /// Next live entry from any shard.
    ///
    /// Waits without a timeout; wrap in `tokio::time::timeout` for a bounded
    /// wait. `None` once every shard connection has ended.
    pub async fn recv(&mut self) -> Option<ClientResult<LogEntry>> {
        self.entries.recv().await
    }

    /// Drop every shard connection
    pub fn close(&mut self) {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        self.entries.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

async fn register(addr: &str, max_frame_len: usize) -> ClientResult<FrameReader<TcpStream>> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    stream
        .write_all(&codec::encode(&Request::subscribe().to_bytes()))
        .await
        .map_err(|source| ClientError::Send {
            addr: addr.to_string(),
            source,
        })?;

    let mut frames = FrameReader::with_max_frame_len(stream, max_frame_len);
    match frames.next_frame().await {
        Ok(Frame::EndOfTransmission) => Ok(frames),
        Ok(Frame::Closed) => Err(ClientError::Disconnected {
            addr: addr.to_string(),
        }),
        Ok(Frame::Payload(_)) => Err(ClientError::Protocol {
            addr: addr.to_string(),
            reason: "entry before subscription was confirmed".to_string(),
        }),
        Err(source) => Err(ClientError::Receive {
            addr: addr.to_string(),
            source,
        }),
    }
}

async fn listen(
    addr: String,
    mut frames: FrameReader<TcpStream>,
    entries: mpsc::Sender<ClientResult<LogEntry>>,
) {
    loop {
        let delivery = match frames.next_frame().await {
            Ok(Frame::Payload(payload)) => LogEntry::from_bytes(payload).map_err(ClientError::from),
            // End of one notify burst
            Ok(Frame::EndOfTransmission) => continue,
            Ok(Frame::Closed) => return,
            Err(source) => Err(ClientError::Receive {
                addr: addr.clone(),
                source,
            }),
        };

        let failed = delivery.is_err();
        if entries.send(delivery).await.is_err() || failed {
            return;
        }
    }
}
