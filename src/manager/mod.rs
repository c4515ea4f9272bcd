//! # Connection manager: discover, reuse or spawn, connect, tear down.
//!
//! ```text
//! connect(signature)
//!   ├─► SpawnGate(signature).lock()         one discovery/spawn at a time per signature,
//!   │                                       waited on for at most spawn_timeout
//!   ├─► gate generation moved?  ── yes ──► share that attempt: join its endpoint
//!   │                                       or return its failure
//!   ├─► registry: Idle ∧ compatible ──► handshake each candidate
//!   │        ├─ ok   ──► Reusing ──► Connected
//!   │        └─ fail ──► CandidateRejected (+ prune dead pids), try next
//!   └─► none left ──► Spawning
//!            ├─ launcher.spawn(SpawnRequest)
//!            ├─ registry.await_registration(new ∧ compatible, spawn_timeout)
//!            │        └─ timeout ──► ManagerError::SpawnTimeout
//!            └─ handshake ──► Connected
//!
//! close()
//!   └─► teardown::stop_all([actors, executor]) ──► report failures ──► stop events
//! ```
//!
//! A failed connect never kills a spawned worker; it stays discoverable.
//!
//! ## Example
//! ```rust,no_run
//! use daemonlink::{CommandLauncher, ConfigSignature, ConnectionManager, IdleTimeout, ManagerConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConnectionManager::builder(
//!     ManagerConfig::default(),
//!     CommandLauncher::new("/usr/local/bin/worker"),
//! )
//! .build()?;
//!
//! let conn = manager
//!     .connect(&ConfigSignature::new("/src/project", IdleTimeout::DEFAULT))
//!     .await?;
//! conn.send(&b"hello"[..])?;
//! let reply = conn.recv().await;
//!
//! manager.close().await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

mod builder;
mod connection;
mod listener;
mod state;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

pub use builder::ManagerBuilder;
pub use connection::Connection;
pub use state::ManagerState;

use listener::EventListener;
use state::{SpawnGates, SpawnOutcome};

use crate::actor::{ActorChannel, ActorFactory, Connector};
use crate::config::ManagerConfig;
use crate::error::{ConnectError, ManagerError, RegistryError, TeardownError};
use crate::events::{Bus, Event, EventKind};
use crate::executor::ExecutorFactory;
use crate::launcher::{Launcher, SpawnRequest};
use crate::registry::{EndpointAddress, EndpointState, LivenessProbe, ProcessRegistry, WorkerEndpoint};
use crate::signature::{Compatibility, ConfigSignature};
use crate::teardown::{self, Stoppable};

/// Client-side owner of worker connections and the resources behind them.
pub struct ConnectionManager {
    cfg: ManagerConfig,
    registry: Arc<dyn ProcessRegistry>,
    launcher: Arc<dyn Launcher>,
    connector: Arc<dyn Connector>,
    compatibility: Arc<dyn Compatibility>,
    probe: Arc<dyn LivenessProbe>,
    executor: ExecutorFactory,
    actors: ActorFactory,
    events: EventListener,
    bus: Bus,
    state: Mutex<ManagerState>,
    gates: SpawnGates,
}

impl ConnectionManager {
    /// Starts building a manager that launches workers with `launcher`.
    pub fn builder(cfg: ManagerConfig, launcher: impl Launcher) -> ManagerBuilder {
        ManagerBuilder::new(cfg, Arc::new(launcher))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        *self.state.lock()
    }

    /// Event bus; subscribe for ad-hoc observation.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Configuration the manager was built with.
    pub fn config(&self) -> &ManagerConfig {
        &self.cfg
    }

    /// Returns a connection to a worker compatible with `signature`,
    /// reusing an idle one or spawning a new one.
    pub async fn connect(&self, signature: &ConfigSignature) -> Result<Connection, ManagerError> {
        self.ensure_open()?;
        info!(
            version = env!("CARGO_PKG_VERSION"),
            signature = %signature,
            "connecting to worker"
        );

        let lease = self.gates.lease(signature);
        let gate = lease.gate();
        let seen = gate.generation();
        let Ok(mut last) = tokio::time::timeout(self.cfg.spawn_timeout, gate.lock()).await else {
            return Err(ManagerError::SpawnTimeout {
                signature: signature.to_string(),
                timeout: self.cfg.spawn_timeout,
            });
        };
        self.ensure_open()?;

        if gate.generation() != seen {
            match (*last).clone() {
                Some(SpawnOutcome::Spawned(ep)) => match self.open(&ep).await {
                    Ok(channel) => return Ok(self.connected(channel, signature)),
                    Err(e) => self.reject(&ep, signature, &e).await,
                },
                Some(failed) => {
                    if let Some(e) = failed.to_error(signature) {
                        return Err(e);
                    }
                }
                None => {}
            }
        }

        if let Some(channel) = self.discover(signature).await? {
            return Ok(self.connected(channel, signature));
        }

        self.ensure_open()?;
        let spawned = self.spawn(signature).await;
        gate.record(&mut last, SpawnOutcome::of(&spawned));
        drop(last);
        let ep = spawned?;

        let channel = self.open(&ep).await?;
        Ok(self.connected(channel, signature))
    }

    /// Stops every owned resource: actors, then executor pools, then the
    /// event listener.
    ///
    /// Idempotent: later calls return `Ok(())`. After close, `connect` fails
    /// with [`ManagerError::Closed`] and open connections reject sends.
    pub async fn close(&self) -> Result<(), TeardownError> {
        {
            let mut state = self.state.lock();
            if state.is_shutting_down() {
                return Ok(());
            }
            *state = ManagerState::Closing;
        }
        self.bus.publish(Event::new(EventKind::CloseRequested));

        let owned: [&dyn Stoppable; 2] = [&self.actors, &self.executor];
        let mut failures = match teardown::stop_all(&owned).await {
            Ok(()) => Vec::new(),
            Err(e) => e.failures,
        };
        for f in &failures {
            self.bus.publish(
                Event::new(EventKind::ResourceStopFailed)
                    .with_resource(f.resource.as_str())
                    .with_reason(f.error.to_string()),
            );
        }
        let summary = if failures.is_empty() {
            "clean".to_string()
        } else {
            format!("{} resource(s) failed to stop", failures.len())
        };
        self.bus
            .publish(Event::new(EventKind::Closed).with_reason(summary));

        if let Err(e) = teardown::stop_all(&[&self.events as &dyn Stoppable]).await {
            for f in &e.failures {
                warn!(resource = %f.resource, error = %f.error, "resource failed to stop");
            }
            failures.extend(e.failures);
        }
        *self.state.lock() = ManagerState::Closed;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }

    fn ensure_open(&self) -> Result<(), ManagerError> {
        if self.state.lock().is_shutting_down() {
            return Err(ManagerError::Closed);
        }
        Ok(())
    }

    fn transition(&self, to: ManagerState) {
        let mut state = self.state.lock();
        if !state.is_shutting_down() {
            *state = to;
        }
    }

    async fn open(&self, ep: &WorkerEndpoint) -> Result<ActorChannel, ConnectError> {
        self.actors
            .create_channel(ep, self.connector.as_ref(), self.cfg.handshake_timeout)
            .await
    }

    fn connected(&self, channel: ActorChannel, signature: &ConfigSignature) -> Connection {
        self.transition(ManagerState::Connected);
        let ep = channel.endpoint();
        self.bus.publish(
            Event::new(EventKind::Connected)
                .with_signature(signature.to_string())
                .with_endpoint(ep.address.to_string())
                .with_pid(ep.pid),
        );
        Connection::new(channel)
    }

    async fn discover(&self, signature: &ConfigSignature) -> Result<Option<ActorChannel>, ManagerError> {
        self.transition(ManagerState::Discovering);
        self.bus
            .publish(Event::new(EventKind::DiscoveryStarted).with_signature(signature.to_string()));

        let compatibility = self.compatibility.as_ref();
        let candidates = self
            .registry
            .find_endpoints(&|ep: &WorkerEndpoint| {
                ep.state == EndpointState::Idle && compatibility.is_compatible(signature, &ep.signature)
            })
            .await?;

        for ep in candidates {
            match self.open(&ep).await {
                Ok(channel) => {
                    self.transition(ManagerState::Reusing);
                    self.bus.publish(
                        Event::new(EventKind::EndpointReused)
                            .with_signature(signature.to_string())
                            .with_endpoint(ep.address.to_string())
                            .with_pid(ep.pid),
                    );
                    return Ok(Some(channel));
                }
                Err(e) => self.reject(&ep, signature, &e).await,
            }
        }
        Ok(None)
    }

    /// Records a failed candidate and optionally prunes dead entries.
    async fn reject(&self, ep: &WorkerEndpoint, signature: &ConfigSignature, err: &ConnectError) {
        self.bus.publish(
            Event::new(EventKind::CandidateRejected)
                .with_signature(signature.to_string())
                .with_endpoint(ep.address.to_string())
                .with_pid(ep.pid)
                .with_reason(err.to_string()),
        );
        if !self.cfg.prune_stale {
            return;
        }
        match self.registry.prune(self.probe.as_ref()).await {
            Ok(removed) => {
                for dead in removed {
                    self.bus.publish(
                        Event::new(EventKind::EndpointPruned)
                            .with_endpoint(dead.address.to_string())
                            .with_pid(dead.pid),
                    );
                }
            }
            Err(e) => warn!(error = %e, "registry prune failed"),
        }
    }

    async fn spawn(&self, signature: &ConfigSignature) -> Result<WorkerEndpoint, ManagerError> {
        self.transition(ManagerState::Spawning);

        let known: HashSet<(EndpointAddress, u32)> = self
            .registry
            .all()
            .await?
            .into_iter()
            .map(|ep| (ep.address, ep.pid))
            .collect();

        let request = SpawnRequest {
            working_dir: signature.working_dir.clone(),
            idle_timeout: signature.idle_timeout,
            env: signature.env.clone(),
            registry_dir: self.cfg.registry_dir.clone(),
        };
        let handle = self.launcher.spawn(&request)?;

        let mut requested = Event::new(EventKind::SpawnRequested)
            .with_signature(signature.to_string())
            .with_timeout(self.cfg.spawn_timeout);
        if let Some(pid) = handle.pid {
            requested = requested.with_pid(pid);
        }
        self.bus.publish(requested);

        let compatibility = self.compatibility.as_ref();
        let expected = |ep: &WorkerEndpoint| {
            matches!(ep.state, EndpointState::Idle | EndpointState::Busy)
                && !known.contains(&(ep.address.clone(), ep.pid))
                && compatibility.is_compatible(signature, &ep.signature)
        };

        match self
            .registry
            .await_registration(&expected, self.cfg.spawn_timeout, &self.cfg.poll)
            .await
        {
            Ok(ep) => {
                self.bus.publish(
                    Event::new(EventKind::EndpointRegistered)
                        .with_signature(signature.to_string())
                        .with_endpoint(ep.address.to_string())
                        .with_pid(ep.pid),
                );
                Ok(ep)
            }
            Err(RegistryError::DiscoveryTimeout { timeout }) => {
                self.bus.publish(
                    Event::new(EventKind::SpawnTimedOut)
                        .with_signature(signature.to_string())
                        .with_timeout(timeout),
                );
                Err(ManagerError::SpawnTimeout {
                    signature: signature.to_string(),
                    timeout,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if !self.state.lock().is_shutting_down() {
            self.events.abort();
        }
    }
}
