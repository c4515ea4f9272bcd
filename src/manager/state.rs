use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::ManagerError;
use crate::registry::WorkerEndpoint;
use crate::signature::ConfigSignature;

/// Lifecycle state of a [`ConnectionManager`](crate::ConnectionManager).
///
/// ```text
/// Init → Discovering → (Reusing | Spawning) → Connected → Closing → Closed
/// ```
///
/// The manager serves many `connect` calls; the state is the most recent
/// transition. `Closing` and `Closed` are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Built, nothing requested yet.
    Init,
    /// Scanning the registry for compatible idle workers.
    Discovering,
    /// Connected to an existing worker.
    Reusing,
    /// Launching a worker and waiting for it to register.
    Spawning,
    /// A connection was handed to the caller.
    Connected,
    /// `close()` in progress.
    Closing,
    /// Terminal.
    Closed,
}

impl ManagerState {
    /// Stable snake_case label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerState::Init => "init",
            ManagerState::Discovering => "discovering",
            ManagerState::Reusing => "reusing",
            ManagerState::Spawning => "spawning",
            ManagerState::Connected => "connected",
            ManagerState::Closing => "closing",
            ManagerState::Closed => "closed",
        }
    }

    /// True for `Closing` and `Closed`.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, ManagerState::Closing | ManagerState::Closed)
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Result of the last spawn attempt made under a [`SpawnGate`].
#[derive(Clone, Debug)]
pub(crate) enum SpawnOutcome {
    /// The worker registered at this endpoint.
    Spawned(WorkerEndpoint),
    /// The worker never registered within the timeout.
    TimedOut(Duration),
    /// Launching or waiting failed for another reason.
    Failed(String),
}

impl SpawnOutcome {
    pub(crate) fn of(result: &Result<WorkerEndpoint, ManagerError>) -> Self {
        match result {
            Ok(ep) => SpawnOutcome::Spawned(ep.clone()),
            Err(ManagerError::SpawnTimeout { timeout, .. }) => SpawnOutcome::TimedOut(*timeout),
            Err(e) => SpawnOutcome::Failed(e.to_string()),
        }
    }

    /// Error a waiter reports when it shares a failed attempt.
    pub(crate) fn to_error(&self, signature: &ConfigSignature) -> Option<ManagerError> {
        match self {
            SpawnOutcome::Spawned(_) => None,
            SpawnOutcome::TimedOut(timeout) => Some(ManagerError::SpawnTimeout {
                signature: signature.to_string(),
                timeout: *timeout,
            }),
            SpawnOutcome::Failed(reason) => Some(ManagerError::SpawnFailed {
                signature: signature.to_string(),
                reason: reason.clone(),
            }),
        }
    }
}

/// Serializes discovery and spawning for one signature.
///
/// `generation` is bumped after every spawn attempt, successful or not, so a
/// caller that queued behind the holder can tell an attempt happened while
/// it waited and share its outcome instead of launching again.
#[derive(Default)]
pub(crate) struct SpawnGate {
    generation: AtomicU64,
    last: Mutex<Option<SpawnOutcome>>,
}

impl SpawnGate {
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Option<SpawnOutcome>> {
        self.last.lock().await
    }

    /// Records the outcome of a spawn attempt. Call while holding the guard.
    pub(crate) fn record(&self, guard: &mut MutexGuard<'_, Option<SpawnOutcome>>, outcome: SpawnOutcome) {
        **guard = Some(outcome);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

/// Per-signature gates, kept only while some caller holds a lease.
#[derive(Default)]
pub(crate) struct SpawnGates {
    map: parking_lot::Mutex<HashMap<ConfigSignature, Arc<SpawnGate>>>,
}

impl SpawnGates {
    pub(crate) fn lease<'a>(&'a self, signature: &'a ConfigSignature) -> GateLease<'a> {
        let gate = Arc::clone(self.map.lock().entry(signature.clone()).or_default());
        GateLease {
            gates: self,
            signature,
            gate,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }
}

/// Shared use of one [`SpawnGate`]; the last lease to drop removes the gate.
pub(crate) struct GateLease<'a> {
    gates: &'a SpawnGates,
    signature: &'a ConfigSignature,
    gate: Arc<SpawnGate>,
}

impl GateLease<'_> {
    pub(crate) fn gate(&self) -> &SpawnGate {
        &self.gate
    }
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        let mut map = self.gates.map.lock();
        // one reference in the map, one here
        if Arc::strong_count(&self.gate) == 2 {
            map.remove(self.signature);
        }
    }
}
