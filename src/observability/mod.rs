//! Observability subsystem for shardlog
//!
//! - Structured logging (one JSON object per line)
//! - Typed lifecycle events
//! - Monotonic counters
//!
//! # Usage
//!
//! ```ignore
//! use shardlog::observability::{Event, Logger, MetricsRegistry};
//!
//! Logger::info(Event::ServerListening, &[("addr", "127.0.0.1:1234")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.record_append(27);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
