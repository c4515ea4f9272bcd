//! # Process registry: the shared directory of running workers.
//!
//! Every process on the host sees the same set of [`WorkerEndpoint`]s.
//! Workers write their own entry; clients only read, and occasionally prune
//! entries whose process is gone.
//!
//! ## Rules
//! - At most one live entry per address ([`RegistryError::AddressInUse`]).
//! - Only the owning pid may update or remove an entry ([`RegistryError::NotOwner`]).
//! - Reads are snapshots and may race with registrations; clients confirm
//!   liveness by connecting.
//! - Malformed entries are logged and skipped.
//!
//! ## Example
//! ```rust,no_run
//! use std::time::Duration;
//! use daemonlink::{BackoffPolicy, EndpointState, FileRegistry, ProcessRegistry, WorkerEndpoint};
//!
//! # async fn demo() -> Result<(), daemonlink::RegistryError> {
//! let registry = FileRegistry::open("/tmp/daemonlink-registry")?;
//! let ready = registry
//!     .await_registration(
//!         &|ep: &WorkerEndpoint| ep.state == EndpointState::Idle,
//!         Duration::from_secs(10),
//!         &BackoffPolicy::default(),
//!     )
//!     .await?;
//! println!("worker {} at {}", ready.pid, ready.address);
//! # Ok(())
//! # }
//! ```

mod endpoint;
mod file;
mod probe;
mod registration;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

pub use endpoint::{EndpointAddress, EndpointState, WorkerEndpoint};
pub use file::FileRegistry;
pub use probe::{LivenessProbe, ProcessProbe};
pub use registration::WorkerRegistration;

use crate::error::RegistryError;
use crate::policies::BackoffPolicy;

/// Predicate used to select endpoints.
pub type Criteria<'a> = &'a (dyn Fn(&WorkerEndpoint) -> bool + Send + Sync);

/// Shared, persistent directory of worker endpoints.
#[async_trait]
pub trait ProcessRegistry: Send + Sync + 'static {
    /// Every readable entry, oldest registration first.
    async fn all(&self) -> Result<Vec<WorkerEndpoint>, RegistryError>;

    /// Snapshot of the entries matching `criteria`.
    async fn find_endpoints(
        &self,
        criteria: Criteria<'_>,
    ) -> Result<Vec<WorkerEndpoint>, RegistryError> {
        Ok(self.all().await?.into_iter().filter(|ep| criteria(ep)).collect())
    }

    /// Entries advertising [`EndpointState::Idle`].
    async fn idle(&self) -> Result<Vec<WorkerEndpoint>, RegistryError> {
        self.find_endpoints(&|ep: &WorkerEndpoint| ep.state == EndpointState::Idle)
            .await
    }

    /// Entries advertising [`EndpointState::Busy`].
    async fn busy(&self) -> Result<Vec<WorkerEndpoint>, RegistryError> {
        self.find_endpoints(&|ep: &WorkerEndpoint| ep.state == EndpointState::Busy)
            .await
    }

    /// Adds or replaces the caller's own entry.
    async fn register(&self, endpoint: WorkerEndpoint) -> Result<(), RegistryError>;

    /// Changes the state of an entry owned by `pid`.
    async fn update_state(
        &self,
        address: &EndpointAddress,
        pid: u32,
        state: EndpointState,
    ) -> Result<(), RegistryError>;

    /// Removes an entry owned by `pid`. Returns `false` if there was none.
    async fn remove(&self, address: &EndpointAddress, pid: u32) -> Result<bool, RegistryError>;

    /// Removes entries whose pid `probe` reports dead and returns them.
    async fn prune(&self, probe: &dyn LivenessProbe) -> Result<Vec<WorkerEndpoint>, RegistryError>;

    /// Polls until an entry matching `expected` appears.
    ///
    /// Sleeps `poll.next(n)` between scans (never past the deadline) and fails
    /// with [`RegistryError::DiscoveryTimeout`] once `timeout` elapsed. A
    /// timeout too large to represent as a deadline waits without one.
    async fn await_registration(
        &self,
        expected: Criteria<'_>,
        timeout: Duration,
        poll: &BackoffPolicy,
    ) -> Result<WorkerEndpoint, RegistryError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut attempt: u32 = 0;

        loop {
            if let Some(ep) = self.find_endpoints(expected).await?.into_iter().next() {
                return Ok(ep);
            }
            let mut pause = poll.next(attempt);
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(RegistryError::DiscoveryTimeout { timeout });
                }
                pause = pause.min(deadline - now);
            }
            tokio::time::sleep(pause).await;
            attempt = attempt.saturating_add(1);
        }
    }
}
