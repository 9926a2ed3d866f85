//! Shard clients
//!
//! - `WriteClient`: per-writer sequencing, round-robin sends
//! - `ReadClient`: merged replay across every shard, live subscribe
//! - `ConnectionPool`: fixed shard set, round-robin cursor

mod errors;
mod pool;
mod reader;
mod replay;
mod subscription;
mod writer;

pub use errors::{ClientError, ClientResult};
pub use pool::{ConnectionPool, ShardConnection};
pub use reader::ReadClient;
pub use replay::{ReplayMerge, ReplayStream};
pub use subscription::Subscription;
pub use writer::WriteClient;
