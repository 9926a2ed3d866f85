//! Observable events in shardlog
//!
//! Events are explicit and typed; the logger only accepts these.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Server lifecycle
    /// Listener bound and accepting
    ServerListening,
    /// Stop requested
    ServerStopping,
    /// Accept loop exited and connections drained
    ServerStopped,
    /// Accept failed outside of shutdown
    AcceptFailed,

    // Connections
    /// New peer connection
    ConnectionAccepted,
    /// Peer connection ended cleanly
    ConnectionClosed,
    /// Peer connection torn down by an error
    ConnectionFailed,

    // Log store
    /// Backing file opened
    StoreOpened,
    /// Nil entry skipped on write
    StoreNilEntrySkipped,
    /// Background writer could not persist an entry
    StoreWriteFailed,
    /// Writer drained and file closed
    StoreClosed,
    /// Replay read stopped at an incomplete tail while the writer is open
    StoreReadTruncated,

    // Replay and subscriptions
    /// Replay request served
    ReplayComplete,
    /// Connection entered the subscribed state
    SubscriberRegistered,
    /// Subscriber removed after an error or a full queue
    SubscriberDropped,

    // Clients
    /// Write client queue failed to send
    ClientWriteFailed,
    /// Client closed its connections
    ClientClosed,

    // Configuration
    /// Configuration loaded
    ConfigLoaded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ServerListening => "SERVER_LISTENING",
            Event::ServerStopping => "SERVER_STOPPING",
            Event::ServerStopped => "SERVER_STOPPED",
            Event::AcceptFailed => "ACCEPT_FAILED",

            Event::ConnectionAccepted => "CONNECTION_ACCEPTED",
            Event::ConnectionClosed => "CONNECTION_CLOSED",
            Event::ConnectionFailed => "CONNECTION_FAILED",

            Event::StoreOpened => "STORE_OPENED",
            Event::StoreNilEntrySkipped => "STORE_NIL_ENTRY_SKIPPED",
            Event::StoreWriteFailed => "STORE_WRITE_FAILED",
            Event::StoreClosed => "STORE_CLOSED",
            Event::StoreReadTruncated => "STORE_READ_TRUNCATED",

            Event::ReplayComplete => "REPLAY_COMPLETE",
            Event::SubscriberRegistered => "SUBSCRIBER_REGISTERED",
            Event::SubscriberDropped => "SUBSCRIBER_DROPPED",

            Event::ClientWriteFailed => "CLIENT_WRITE_FAILED",
            Event::ClientClosed => "CLIENT_CLOSED",

            Event::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::AcceptFailed | Event::StoreWriteFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::ServerListening,
            Event::ServerStopping,
            Event::ServerStopped,
            Event::AcceptFailed,
            Event::ConnectionAccepted,
            Event::ConnectionClosed,
            Event::ConnectionFailed,
            Event::StoreOpened,
            Event::StoreNilEntrySkipped,
            Event::StoreWriteFailed,
            Event::StoreClosed,
            Event::StoreReadTruncated,
            Event::ReplayComplete,
            Event::SubscriberRegistered,
            Event::SubscriberDropped,
            Event::ClientWriteFailed,
            Event::ClientClosed,
            Event::ConfigLoaded,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::AcceptFailed.is_fatal());
        assert!(Event::StoreWriteFailed.is_fatal());
        assert!(!Event::ConnectionFailed.is_fatal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::ReplayComplete), "REPLAY_COMPLETE");
    }
}
