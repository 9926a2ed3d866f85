//! Read client: merged replay and live tail

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::Stream;
use tokio::sync::Semaphore;

use super::errors::{ClientError, ClientResult};
use super::pool::ConnectionPool;
use super::replay::{ReplayMerge, ReplayStream};
use super::subscription::Subscription;
use crate::config::ClientConfig;

pub struct ReadClient {
    config: ClientConfig,
    pool: ConnectionPool,
    /// One replay at a time; each replay holds every pooled connection
    replay_gate: Arc<Semaphore>,
}

impl ReadClient {
    /// Open one pooled connection per configured shard
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let pool = ConnectionPool::connect(&config.shards).await?;
        Ok(Self {
            config: config.clone(),
            pool,
            replay_gate: Arc::new(Semaphore::new(1)),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.pool.len()
    }

    /// Replay every shard and merge the results.
    ///
    /// Waits for a previous merge from this client to be dropped or
    /// exhausted. Each shard's request is sent on the merge's first `next()`.
    pub async fn replay(&self) -> ClientResult<ReplayMerge> {
        let permit = Arc::clone(&self.replay_gate)
            .acquire_owned()
            .await
            .map_err(|_| ClientError::Closed)?;

        let streams = self
            .pool
            .all()
            .iter()
            .map(|connection| {
                ReplayStream::new(
                    Arc::clone(connection),
                    self.config.replay_channel_depth,
                    self.config.max_frame_len,
                )
            })
            .collect();

        Ok(ReplayMerge::new(streams).with_permit(permit))
    }

    /// Merged replay, payload bytes only
    pub async fn payloads(&self) -> ClientResult<impl Stream<Item = ClientResult<Bytes>>> {
        Ok(self.replay().await?.into_payloads())
    }

    /// Start a live tail on dedicated connections
    pub async fn subscribe(&self) -> ClientResult<Subscription> {
        Subscription::open(
            &self.config.shards,
            self.config.subscription_channel_depth,
            self.config.max_frame_len,
        )
        .await
    }

    /// Close the pooled connections; replays started afterwards fail
    pub async fn close(&self) {
        self.replay_gate.close();
        self.pool.close().await;
    }
}
