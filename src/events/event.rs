//! # Lifecycle events emitted by the connection manager and its resources.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Discovery events**: registry lookups, candidate rejection, reuse
//! - **Spawn events**: worker launch, registration, spawn timeout
//! - **Connection events**: channel established to a reused or spawned worker
//! - **Shutdown events**: close requested, resource failures, closed
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! requested signature, the endpoint, resource names and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use daemonlink::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::CandidateRejected)
//!     .with_endpoint("tcp://127.0.0.1:4000")
//!     .with_reason("connection refused");
//!
//! assert_eq!(ev.kind, EventKind::CandidateRejected);
//! assert_eq!(ev.endpoint.as_deref(), Some("tcp://127.0.0.1:4000"));
//! assert_eq!(ev.reason.as_deref(), Some("connection refused"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `resource`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `resource`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Discovery events ===
    /// Registry lookup started for a signature.
    ///
    /// Sets:
    /// - `signature`: requested signature
    DiscoveryStarted,

    /// A candidate endpoint failed its handshake and was discarded.
    ///
    /// Sets:
    /// - `signature`, `endpoint`, `pid`
    /// - `reason`: connect error
    CandidateRejected,

    /// Dead entries were removed from the registry.
    ///
    /// Sets:
    /// - `endpoint`: removed address
    /// - `pid`: dead process id
    EndpointPruned,

    /// An existing idle endpoint was reused.
    ///
    /// Sets:
    /// - `signature`, `endpoint`, `pid`
    EndpointReused,

    // === Spawn events ===
    /// A new worker process was launched.
    ///
    /// Sets:
    /// - `signature`
    /// - `pid`: launched process id (if known)
    /// - `timeout_ms`: registration deadline
    SpawnRequested,

    /// The spawned worker appeared in the registry.
    ///
    /// Sets:
    /// - `signature`, `endpoint`, `pid`
    EndpointRegistered,

    /// The spawned worker did not register in time.
    ///
    /// Sets:
    /// - `signature`
    /// - `timeout_ms`: the elapsed deadline
    SpawnTimedOut,

    // === Connection events ===
    /// A channel to an endpoint is ready for the caller.
    ///
    /// Sets:
    /// - `signature`, `endpoint`, `pid`
    Connected,

    // === Shutdown events ===
    /// `close()` was called on the manager.
    CloseRequested,

    /// One resource failed to stop (reported after teardown finished).
    ///
    /// Sets:
    /// - `resource`: resource name
    /// - `reason`: stop error
    ResourceStopFailed,

    /// Teardown finished; the manager is closed.
    ///
    /// Sets:
    /// - `reason`: aggregate failure (only when teardown failed)
    Closed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Requested configuration signature (rendered).
    pub signature: Option<Arc<str>>,
    /// Endpoint address (rendered).
    pub endpoint: Option<Arc<str>>,
    /// Worker process id.
    pub pid: Option<u32>,
    /// Resource or subscriber name.
    pub resource: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Deadline in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            signature: None,
            endpoint: None,
            pid: None,
            resource: None,
            reason: None,
            timeout_ms: None,
        }
    }

    /// Attaches a rendered signature.
    #[inline]
    pub fn with_signature(mut self, signature: impl Into<Arc<str>>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Attaches a rendered endpoint address.
    #[inline]
    pub fn with_endpoint(mut self, endpoint: impl Into<Arc<str>>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a resource name.
    #[inline]
    pub fn with_resource(mut self, resource: impl Into<Arc<str>>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a deadline (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_resource(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_resource(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::DiscoveryStarted);
        let b = Event::new(EventKind::DiscoveryStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn timeout_is_clamped() {
        let ev = Event::new(EventKind::SpawnTimedOut).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }
}
