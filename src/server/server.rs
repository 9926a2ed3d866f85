//! Shard server: listener loop and lifecycle
//!
//! `start` accepts until `stop`, running one task per connection. A fatal
//! error from any connection (storage) or from the listener stops the whole
//! server; anything else only ends the connection it came from.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};

use super::errors::{ServerError, ServerResult};
use super::router::{stopped, Connection, RouterContext};
use super::subscribers::SubscriberRegistry;
use crate::config::ServerConfig;
use crate::log_store::LogStore;
use crate::observability::{Event, Logger, MetricsRegistry, MetricsSnapshot};

pub struct Server {
    config: ServerConfig,
    store: Arc<LogStore>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    subscribers: Arc<SubscriberRegistry>,
    metrics: Arc<MetricsRegistry>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Server {
    /// Bind the listening socket; no connection is accepted until `start`.
    pub async fn bind(config: ServerConfig, store: Arc<LogStore>) -> ServerResult<Self> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let metrics = Arc::new(MetricsRegistry::new());
        let subscribers = Arc::new(SubscriberRegistry::new(
            config.subscriber_queue_depth,
            Arc::clone(&metrics),
        ));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            listener: Mutex::new(Some(listener)),
            local_addr,
            subscribers,
            metrics,
            closed: AtomicBool::new(false),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Accept and serve connections until `stop()`.
    ///
    /// Returns once every connection task has finished. Can run once.
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted` on a second call
    /// - `Accept` if the listener fails while the server is open
    /// - the first fatal connection error (storage)
    pub async fn start(&self) -> ServerResult<()> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ServerError::AlreadyStarted)?;

        Logger::info(
            Event::ServerListening,
            &[
                ("addr", &self.local_addr.to_string()),
                ("log", &self.store.path().display().to_string()),
            ],
        );

        let ctx = RouterContext {
            store: Arc::clone(&self.store),
            subscribers: Arc::clone(&self.subscribers),
            metrics: Arc::clone(&self.metrics),
            max_frame_len: self.config.max_frame_len,
            shutdown: self.shutdown.subscribe(),
        };
        let mut shutdown = self.shutdown.subscribe();
        let mut connections = JoinSet::new();
        let mut outcome = Ok(());

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nodelay(true);
                        self.metrics.increment_connections_accepted();
                        Logger::trace(Event::ConnectionAccepted, &[("peer", &peer.to_string())]);

                        let connection = Connection::new(stream, peer, ctx.clone());
                        connections.spawn(async move { (peer, connection.run().await) });
                    }
                    Err(e) if self.is_closed() => {
                        Logger::trace(Event::ServerStopping, &[("accept_error", &e.to_string())]);
                        break;
                    }
                    Err(e) if is_transient(&e) => continue,
                    Err(e) => {
                        Logger::fatal(Event::AcceptFailed, &[("error", &e.to_string())]);
                        outcome = Err(ServerError::Accept(e));
                        break;
                    }
                },
                Some(joined) = connections.join_next() => {
                    if let Err(e) = self.connection_finished(joined) {
                        outcome = Err(e);
                        break;
                    }
                }
                _ = stopped(&mut shutdown) => break,
            }
        }

        drop(listener);
        self.stop();

        while let Some(joined) = connections.join_next().await {
            if let Err(e) = self.connection_finished(joined) {
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }

        Logger::info(Event::ServerStopped, &[("addr", &self.local_addr.to_string())]);
        outcome
    }

    /// Log a finished connection; hand back its error if it is fatal
    fn connection_finished(
        &self,
        joined: Result<(SocketAddr, ServerResult<()>), JoinError>,
    ) -> ServerResult<()> {
        match joined {
            Ok((peer, Ok(()))) => {
                Logger::trace(Event::ConnectionClosed, &[("peer", &peer.to_string())]);
                Ok(())
            }
            Ok((peer, Err(e))) if e.is_fatal() => {
                Logger::fatal(
                    Event::ConnectionFailed,
                    &[("peer", &peer.to_string()), ("error", &e.to_string())],
                );
                self.metrics.increment_connections_failed();
                Err(e)
            }
            Ok((peer, Err(e))) => {
                Logger::warn(
                    Event::ConnectionFailed,
                    &[("peer", &peer.to_string()), ("error", &e.to_string())],
                );
                self.metrics.increment_connections_failed();
                Ok(())
            }
            Err(e) => {
                Logger::error(Event::ConnectionFailed, &[("error", &e.to_string())]);
                self.metrics.increment_connections_failed();
                Ok(())
            }
        }
    }

    /// Stop accepting and wind down every connection. Idempotent.
    ///
    /// Does not close the log store; its owner does that after `start`
    /// returns.
    pub fn stop(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            Logger::info(Event::ServerStopping, &[("addr", &self.local_addr.to_string())]);
        }
        self.shutdown.send_replace(true);
    }
}

/// Accept errors that concern one half-open connection, not the listener
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, Frame, FrameReader};
    use crate::log_store::LogStoreConfig;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    async fn server(dir: &TempDir) -> Arc<Server> {
        let config = ServerConfig::ephemeral(dir.path());
        let store = Arc::new(LogStore::open(dir.path(), LogStoreConfig::default()).unwrap());
        Arc::new(Server::bind(config, store).await.unwrap())
    }

    #[tokio::test]
    async fn test_stop_ends_start_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;

        let running = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.start().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        server.stop();
        server.stop();
        running.await.unwrap().unwrap();
        assert!(server.is_closed());
        assert!(matches!(server.start().await, Err(ServerError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_unknown_request_closes_only_that_connection() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir).await;
        let running = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.start().await }
        });

        let mut bad = TcpStream::connect(server.local_addr()).await.unwrap();
        bad.write_all(&encode(&[9])).await.unwrap();
        let mut bad_frames = FrameReader::new(bad);
        assert!(matches!(
            bad_frames.next_frame().await,
            Ok(Frame::Closed) | Err(_)
        ));

        let mut good = TcpStream::connect(server.local_addr()).await.unwrap();
        good.write_all(&encode(&[1])).await.unwrap();
        let mut good_frames = FrameReader::new(good);
        assert_eq!(good_frames.next_frame().await.unwrap(), Frame::EndOfTransmission);

        server.stop();
        running.await.unwrap().unwrap();
        assert_eq!(server.snapshot().connections_failed, 1);
        assert_eq!(server.snapshot().replays_served, 1);
    }
}
