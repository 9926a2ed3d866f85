//! Metrics registry for a shard server
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Thread-safe, lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by the server's tasks
///
/// Uses Relaxed ordering; counters are observational only.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Entries handed to the log store
    entries_appended: AtomicU64,
    /// Encoded entry bytes handed to the log store
    bytes_appended: AtomicU64,
    /// Write requests carrying no entry
    nil_entries: AtomicU64,
    /// Replay requests fully served
    replays_served: AtomicU64,
    /// Entries streamed back by replays
    entries_replayed: AtomicU64,
    /// Connections that entered the subscribed state
    subscribers_registered: AtomicU64,
    /// Subscribers torn down by errors or back-pressure
    subscribers_dropped: AtomicU64,
    /// Accepted connections
    connections_accepted: AtomicU64,
    /// Connections torn down by an error
    connections_failed: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one appended entry of `bytes` encoded bytes
    pub fn record_append(&self, bytes: u64) {
        self.entries_appended.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_nil_entries(&self) {
        self.nil_entries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed replay of `entries` entries
    pub fn record_replay(&self, entries: u64) {
        self.replays_served.fetch_add(1, Ordering::Relaxed);
        self.entries_replayed.fetch_add(entries, Ordering::Relaxed);
    }

    pub fn increment_subscribers_registered(&self) {
        self.subscribers_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_subscribers_dropped(&self) {
        self.subscribers_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_connections_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_connections_failed(&self) {
        self.connections_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entries_appended: self.entries_appended.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            nil_entries: self.nil_entries.load(Ordering::Relaxed),
            replays_served: self.replays_served.load(Ordering::Relaxed),
            entries_replayed: self.entries_replayed.load(Ordering::Relaxed),
            subscribers_registered: self.subscribers_registered.load(Ordering::Relaxed),
            subscribers_dropped: self.subscribers_dropped.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_failed: self.connections_failed.load(Ordering::Relaxed),
        }
    }

    /// Current values as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub entries_appended: u64,
    pub bytes_appended: u64,
    pub nil_entries: u64,
    pub replays_served: u64,
    pub entries_replayed: u64,
    pub subscribers_registered: u64,
    pub subscribers_dropped: u64,
    pub connections_accepted: u64,
    pub connections_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_append_tracks_bytes() {
        let registry = MetricsRegistry::new();

        registry.record_append(30);
        registry.record_append(27);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.entries_appended, 2);
        assert_eq!(snapshot.bytes_appended, 57);
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_nil_entries();
        registry.record_replay(4);
        registry.record_replay(0);
        registry.increment_subscribers_registered();
        registry.increment_subscribers_dropped();
        registry.increment_connections_accepted();
        registry.increment_connections_failed();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.nil_entries, 1);
        assert_eq!(snapshot.replays_served, 2);
        assert_eq!(snapshot.entries_replayed, 4);
        assert_eq!(snapshot.subscribers_registered, 1);
        assert_eq!(snapshot.subscribers_dropped, 1);
        assert_eq!(snapshot.connections_accepted, 1);
        assert_eq!(snapshot.connections_failed, 1);
    }

    #[test]
    fn test_to_json_is_valid() {
        let registry = MetricsRegistry::new();
        registry.record_append(10);

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["entries_appended"], 1);
        assert_eq!(parsed["bytes_appended"], 10);
    }
}
