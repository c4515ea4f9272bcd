use std::sync::Arc;

use tracing::warn;

use super::{EndpointAddress, EndpointState, ProcessRegistry, WorkerEndpoint};
use crate::error::RegistryError;

/// Worker-side handle to its own registry entry.
///
/// Dropping the guard without [`deregister`](Self::deregister) removes the
/// entry from a background task (requires a tokio runtime).
pub struct WorkerRegistration {
    registry: Arc<dyn ProcessRegistry>,
    address: EndpointAddress,
    pid: u32,
    released: bool,
}

impl WorkerRegistration {
    /// Registers `endpoint` and returns the guard that owns it.
    pub async fn register(
        registry: Arc<dyn ProcessRegistry>,
        endpoint: WorkerEndpoint,
    ) -> Result<Self, RegistryError> {
        let address = endpoint.address.clone();
        let pid = endpoint.pid;
        registry.register(endpoint).await?;
        Ok(Self {
            registry,
            address,
            pid,
            released: false,
        })
    }

    /// Registered address.
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Advertises that the worker accepts connections.
    pub async fn mark_idle(&self) -> Result<(), RegistryError> {
        self.set(EndpointState::Idle).await
    }

    /// Advertises that the worker is serving a client.
    pub async fn mark_busy(&self) -> Result<(), RegistryError> {
        self.set(EndpointState::Busy).await
    }

    /// Advertises that the worker is shutting down.
    pub async fn mark_stopped(&self) -> Result<(), RegistryError> {
        self.set(EndpointState::Stopped).await
    }

    /// Removes the entry now.
    pub async fn deregister(mut self) -> Result<bool, RegistryError> {
        self.released = true;
        self.registry.remove(&self.address, self.pid).await
    }

    async fn set(&self, state: EndpointState) -> Result<(), RegistryError> {
        self.registry.update_state(&self.address, self.pid, state).await
    }
}

impl Drop for WorkerRegistration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(address = %self.address, "registration dropped outside a runtime; entry left behind");
            return;
        };
        let registry = Arc::clone(&self.registry);
        let address = self.address.clone();
        let pid = self.pid;
        handle.spawn(async move {
            if let Err(e) = registry.remove(&address, pid).await {
                warn!(%address, error = %e, "failed to deregister worker");
            }
        });
    }
}
