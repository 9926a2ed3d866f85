//! Round-robin connection pool
//!
//! The shard set and its order are fixed when the pool is built. `next()`
//! walks it with a single cursor, wrapping modulo the pool size.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::errors::{ClientError, ClientResult};

/// One established shard connection, shared between tasks
#[derive(Debug)]
pub struct ShardConnection {
    addr: String,
    stream: Arc<Mutex<Option<TcpStream>>>,
    closed: AtomicBool,
}

impl ShardConnection {
    pub async fn connect(addr: &str) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream
            .set_nodelay(true)
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            addr: addr.to_string(),
            stream: Arc::new(Mutex::new(Some(stream))),
            closed: AtomicBool::new(false),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Write one complete frame
    pub async fn send(&self, frame: &[u8]) -> ClientResult<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(ClientError::Closed)?;
        stream
            .write_all(frame)
            .await
            .map_err(|source| ClientError::Send {
                addr: self.addr.clone(),
                source,
            })
    }

    /// Exclusive access for a request/response exchange
    pub async fn lock(&self) -> OwnedMutexGuard<Option<TcpStream>> {
        Arc::clone(&self.stream).lock_owned().await
    }

    /// Shut the connection down; later calls are no-ops
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Fixed set of shard connections
#[derive(Debug)]
pub struct ConnectionPool {
    connections: Vec<Arc<ShardConnection>>,
    cursor: AtomicUsize,
}

impl ConnectionPool {
    /// Dial every shard in order.
    ///
    /// # Errors
    ///
    /// `NoShards` for an empty list, otherwise the first dial failure.
    pub async fn connect(shards: &[String]) -> ClientResult<Self> {
        if shards.is_empty() {
            return Err(ClientError::NoShards);
        }

        let mut connections = Vec::with_capacity(shards.len());
        for addr in shards {
            connections.push(Arc::new(ShardConnection::connect(addr).await?));
        }

        Ok(Self {
            connections,
            cursor: AtomicUsize::new(0),
        })
    }

    /// The next connection in round-robin order
    pub fn next(&self) -> &Arc<ShardConnection> {
        let n = self.connections.len();
        let index = match self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % n))
        {
            Ok(prev) | Err(prev) => prev,
        };
        &self.connections[index]
    }

    /// Every connection, in shard order
    pub fn all(&self) -> &[Arc<ShardConnection>] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub async fn close(&self) {
        for connection in &self.connections {
            connection.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listeners(n: usize) -> (Vec<TcpListener>, Vec<String>) {
        let mut listeners = Vec::new();
        let mut addrs = Vec::new();
        for _ in 0..n {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            addrs.push(listener.local_addr().unwrap().to_string());
            listeners.push(listener);
        }
        (listeners, addrs)
    }

    #[tokio::test]
    async fn test_next_is_round_robin() {
        let (_listeners, addrs) = listeners(3).await;
        let pool = ConnectionPool::connect(&addrs).await.unwrap();

        let picked: Vec<String> = (0..7).map(|_| pool.next().addr().to_string()).collect();
        let expected: Vec<String> = (0..7).map(|i| addrs[i % 3].clone()).collect();
        assert_eq!(picked, expected);
        assert_eq!(pool.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_shard_list_rejected() {
        assert!(matches!(
            ConnectionPool::connect(&[]).await,
            Err(ClientError::NoShards)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_shard_is_connect_error() {
        let (listeners, addrs) = listeners(1).await;
        drop(listeners);

        let err = ConnectionPool::connect(&addrs).await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_listeners, addrs) = listeners(2).await;
        let pool = ConnectionPool::connect(&addrs).await.unwrap();

        pool.close().await;
        pool.close().await;
        assert!(pool.all().iter().all(|c| c.is_closed()));
        assert!(matches!(pool.next().send(&[1, 0]).await, Err(ClientError::Closed)));
    }
}
