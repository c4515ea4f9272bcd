//! # LogWriter: event renderer over `tracing`
//!
//! A minimal subscriber that renders incoming [`Event`]s through `tracing`.
//! Severity follows the event: failures are `warn`, routine transitions are
//! `info`, chatty discovery steps are `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG daemonlink: discovery started signature="dir=/work idle=10800000ms env=0"
//!  WARN daemonlink: candidate rejected endpoint="tcp://127.0.0.1:41000" pid=812 reason="connection refused"
//!  INFO daemonlink: worker spawned signature="dir=/work idle=10800000ms env=0" pid=9021 timeout_ms=30000
//!  INFO daemonlink: connected endpoint="tcp://127.0.0.1:41002" pid=9021
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let signature = e.signature.as_deref().unwrap_or("-");
        let endpoint = e.endpoint.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::DiscoveryStarted => {
                debug!(target: "daemonlink", seq = e.seq, signature, "discovery started");
            }
            EventKind::CandidateRejected => {
                warn!(target: "daemonlink", seq = e.seq, endpoint, pid = ?e.pid, reason, "candidate rejected");
            }
            EventKind::EndpointPruned => {
                info!(target: "daemonlink", seq = e.seq, endpoint, pid = ?e.pid, "dead endpoint pruned");
            }
            EventKind::EndpointReused => {
                info!(target: "daemonlink", seq = e.seq, endpoint, pid = ?e.pid, "reusing idle worker");
            }
            EventKind::SpawnRequested => {
                info!(target: "daemonlink", seq = e.seq, signature, pid = ?e.pid, timeout_ms = ?e.timeout_ms, "worker spawned");
            }
            EventKind::EndpointRegistered => {
                info!(target: "daemonlink", seq = e.seq, endpoint, pid = ?e.pid, "spawned worker registered");
            }
            EventKind::SpawnTimedOut => {
                warn!(target: "daemonlink", seq = e.seq, signature, timeout_ms = ?e.timeout_ms, "spawned worker did not register");
            }
            EventKind::Connected => {
                info!(target: "daemonlink", seq = e.seq, endpoint, pid = ?e.pid, "connected");
            }
            EventKind::CloseRequested => {
                info!(target: "daemonlink", seq = e.seq, "close requested");
            }
            EventKind::ResourceStopFailed => {
                warn!(target: "daemonlink", seq = e.seq, resource = ?e.resource, reason, "resource failed to stop");
            }
            EventKind::Closed => {
                info!(target: "daemonlink", seq = e.seq, reason, "closed");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "daemonlink", seq = e.seq, subscriber = ?e.resource, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "daemonlink", seq = e.seq, subscriber = ?e.resource, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_every_kind_without_panicking() {
        let w = LogWriter::new();
        for kind in [
            EventKind::DiscoveryStarted,
            EventKind::CandidateRejected,
            EventKind::SpawnTimedOut,
            EventKind::ResourceStopFailed,
            EventKind::Closed,
        ] {
            w.on_event(&Event::new(kind).with_reason("r")).await;
        }
        assert_eq!(w.name(), "LogWriter");
    }
}
