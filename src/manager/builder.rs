use std::sync::Arc;

use parking_lot::Mutex;

use super::listener::EventListener;
use super::state::{ManagerState, SpawnGates};
use super::ConnectionManager;
use crate::actor::{ActorFactory, Connector, FramedConnector};
use crate::config::ManagerConfig;
use crate::error::{ConnectError, ManagerError};
use crate::events::Bus;
use crate::executor::ExecutorFactory;
use crate::launcher::Launcher;
use crate::registry::{FileRegistry, LivenessProbe, ProcessProbe, ProcessRegistry};
use crate::signature::{Compatibility, ExactMatch};
use crate::subscribers::Subscribe;

/// Assembles a [`ConnectionManager`].
///
/// Defaults: [`FileRegistry`] at `cfg.registry_dir`, [`FramedConnector`],
/// [`ExactMatch`] compatibility, [`ProcessProbe`] liveness, no subscribers.
pub struct ManagerBuilder {
    cfg: ManagerConfig,
    launcher: Arc<dyn Launcher>,
    registry: Option<Arc<dyn ProcessRegistry>>,
    connector: Arc<dyn Connector>,
    compatibility: Arc<dyn Compatibility>,
    probe: Arc<dyn LivenessProbe>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ManagerBuilder {
    pub(crate) fn new(cfg: ManagerConfig, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            cfg,
            launcher,
            registry: None,
            connector: Arc::new(FramedConnector),
            compatibility: Arc::new(ExactMatch),
            probe: Arc::new(ProcessProbe),
            subscribers: Vec::new(),
        }
    }

    /// Uses a custom registry instead of a [`FileRegistry`] at `cfg.registry_dir`.
    pub fn with_registry(mut self, registry: Arc<dyn ProcessRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses a custom transport connector.
    pub fn with_connector(mut self, connector: impl Connector) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Uses a custom reuse predicate.
    pub fn with_compatibility(mut self, compatibility: impl Compatibility) -> Self {
        self.compatibility = Arc::new(compatibility);
        self
    }

    /// Uses a custom liveness probe for registry pruning.
    pub fn with_probe(mut self, probe: impl LivenessProbe) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets a dedicated worker with a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the manager and starts its event listener.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Arc<ConnectionManager>, ManagerError> {
        let registry: Arc<dyn ProcessRegistry> = match self.registry {
            Some(r) => r,
            None => Arc::new(FileRegistry::open(&self.cfg.registry_dir)?),
        };

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let executor = ExecutorFactory::new(self.cfg.grace);
        let actors = ActorFactory::new(&executor).map_err(ConnectError::from)?;
        let events = EventListener::start(&bus, self.subscribers, self.cfg.grace);

        Ok(Arc::new(ConnectionManager {
            cfg: self.cfg,
            registry,
            launcher: self.launcher,
            connector: self.connector,
            compatibility: self.compatibility,
            probe: self.probe,
            executor,
            actors,
            events,
            bus,
            state: Mutex::new(ManagerState::Init),
            gates: SpawnGates::default(),
        }))
    }
}
