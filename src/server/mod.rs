//! Shard server
//!
//! - `Server`: listener lifecycle, one task per connection
//! - `router`: per-connection state machine dispatching write, replay and
//!   subscribe requests
//! - `SubscriberRegistry`: live fan-out of newly written entries

mod errors;
mod router;
mod server;
mod subscribers;

pub use errors::{ServerError, ServerResult};
pub use router::ConnectionState;
pub use server::Server;
pub use subscribers::{SubscriberHandle, SubscriberRegistry};
