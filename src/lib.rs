//! shardlog - a sharded, append-only distributed log
//!
//! Each shard server persists entries to a compressed local log; clients
//! spread writes across shards round-robin and rebuild one ordered history
//! by merging every shard's replay.

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod log_store;
pub mod model;
pub mod observability;
pub mod server;
