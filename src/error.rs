//! Error types used by the connection manager and the resources it owns.
//!
//! - [`RegistryError`] failures of the shared endpoint registry (including [`RegistryError::DiscoveryTimeout`]);
//! - [`ConnectError`] handshake failures against one candidate endpoint;
//! - [`ChannelError`] use of a stopped channel;
//! - [`PoolError`] work submitted to a stopped pool;
//! - [`LaunchError`] worker process could not be started;
//! - [`StopError`] / [`TeardownError`] resource shutdown failures (single and aggregated);
//! - [`ManagerError`] everything `connect()` can surface to the caller.
//!
//! Every enum exposes `as_label()`, a short stable snake_case label for logs/metrics.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the process registry.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Filesystem access to the registry failed.
    #[error("registry io error at {path}: {source}")]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// Underlying io error.
        #[source]
        source: io::Error,
    },

    /// The registry lock could not be acquired.
    #[error("failed to lock registry at {path}: {errno}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Errno reported by `flock`.
        errno: nix::errno::Errno,
    },

    /// Endpoint could not be serialized.
    #[error("failed to encode endpoint {address}: {source}")]
    Encode {
        /// Endpoint address.
        address: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// Another live process already owns this address.
    #[error("address {address} is owned by live process {pid}")]
    AddressInUse {
        /// Contested address.
        address: String,
        /// Pid of the current owner.
        pid: u32,
    },

    /// Caller tried to modify an entry owned by another process.
    #[error("process {pid} does not own endpoint {address}")]
    NotOwner {
        /// Endpoint address.
        address: String,
        /// Pid of the caller.
        pid: u32,
    },

    /// No entry exists for the address.
    #[error("no endpoint registered at {address}")]
    NotFound {
        /// Endpoint address.
        address: String,
    },

    /// No matching endpoint appeared before the deadline.
    #[error("no matching endpoint registered within {timeout:?}")]
    DiscoveryTimeout {
        /// The wait that elapsed.
        timeout: Duration,
    },
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use daemonlink::RegistryError;
    /// use std::time::Duration;
    ///
    /// let err = RegistryError::DiscoveryTimeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "registry_discovery_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::Io { .. } => "registry_io",
            RegistryError::Lock { .. } => "registry_lock",
            RegistryError::Encode { .. } => "registry_encode",
            RegistryError::AddressInUse { .. } => "registry_address_in_use",
            RegistryError::NotOwner { .. } => "registry_not_owner",
            RegistryError::NotFound { .. } => "registry_not_found",
            RegistryError::DiscoveryTimeout { .. } => "registry_discovery_timeout",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RegistryError::Io {
            path: path.into(),
            source,
        }
    }
}

/// # Errors produced while connecting to one endpoint.
///
/// During discovery these are absorbed: the manager moves on to the next
/// candidate or falls back to spawning.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Transport could not be established.
    #[error("connect to {address} failed: {source}")]
    Io {
        /// Endpoint address.
        address: String,
        /// Underlying io error.
        #[source]
        source: io::Error,
    },

    /// Transport did not come up within the handshake timeout.
    #[error("handshake with {address} timed out after {timeout:?}")]
    HandshakeTimeout {
        /// Endpoint address.
        address: String,
        /// Configured handshake timeout.
        timeout: Duration,
    },

    /// The connector cannot reach this kind of address.
    #[error("unsupported endpoint address {address}")]
    Unsupported {
        /// Endpoint address.
        address: String,
    },

    /// The dispatch pool refused the channel.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ConnectError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectError::Io { .. } => "connect_io",
            ConnectError::HandshakeTimeout { .. } => "connect_handshake_timeout",
            ConnectError::Unsupported { .. } => "connect_unsupported",
            ConnectError::Pool(_) => "connect_pool_stopped",
        }
    }
}

/// # Errors produced by channel/actor handles.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel was stopped; the message was not enqueued.
    #[error("channel '{channel}' is stopped")]
    Stopped {
        /// Channel/actor name.
        channel: String,
    },
}

impl ChannelError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::Stopped { .. } => "channel_stopped",
        }
    }
}

/// # Errors produced by execution pools.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool (or its factory) no longer accepts work.
    #[error("pool '{pool}' is stopped")]
    Stopped {
        /// Pool name.
        pool: String,
    },
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::Stopped { .. } => "pool_stopped",
        }
    }
}

/// # Errors produced when starting a worker process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The OS refused to start the program.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program path.
        program: PathBuf,
        /// Underlying io error.
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::Spawn { .. } => "launch_spawn",
        }
    }
}

/// # Failure of a single resource to stop.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StopError {
    /// Grace period elapsed; the listed parts were still running.
    #[error("shutdown grace {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the parts that did not stop in time.
        stuck: Vec<String>,
    },

    /// Resource reported a failure while stopping.
    #[error("stop failed: {reason}")]
    Failed {
        /// Failure description.
        reason: String,
    },

    /// Resource panicked while stopping.
    #[error("stop panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl StopError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StopError::GraceExceeded { .. } => "stop_grace_exceeded",
            StopError::Failed { .. } => "stop_failed",
            StopError::Panicked { .. } => "stop_panicked",
        }
    }
}

/// One failed resource inside a [`TeardownError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopFailure {
    /// Resource name as reported by [`Stoppable::name`](crate::Stoppable::name).
    pub resource: String,
    /// What went wrong.
    pub error: StopError,
}

/// # Aggregate of every resource that failed to stop during one teardown.
///
/// Never empty: a teardown with no failures returns `Ok(())`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct TeardownError {
    /// Failures in the order the resources were stopped.
    pub failures: Vec<StopFailure>,
}

impl TeardownError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        "teardown_failed"
    }

    /// Names of the resources that failed.
    pub fn resources(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.resource.as_str()).collect()
    }
}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resource(s) failed to stop", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.resource, failure.error)?;
        }
        Ok(())
    }
}

/// # Errors surfaced by [`ConnectionManager`](crate::ConnectionManager).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ManagerError {
    /// A worker was launched but never registered in time.
    ///
    /// The worker is not killed; it stays discoverable for the next attempt.
    #[error("spawned worker for {signature} did not register within {timeout:?}")]
    SpawnTimeout {
        /// Requested configuration signature (rendered).
        signature: String,
        /// The spawn timeout that elapsed.
        timeout: Duration,
    },

    /// A concurrent `connect` for the same signature tried to spawn a worker
    /// and failed; this caller shares that outcome instead of launching again.
    #[error("spawn for {signature} failed in a concurrent connect: {reason}")]
    SpawnFailed {
        /// Requested configuration signature (rendered).
        signature: String,
        /// The failure the spawning caller saw.
        reason: String,
    },

    /// Worker process could not be launched.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Registry failure other than the spawn wait timing out.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Connecting to the freshly spawned endpoint failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The manager was closed.
    #[error("connection manager is closed")]
    Closed,
}

impl ManagerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use daemonlink::ManagerError;
    ///
    /// assert_eq!(ManagerError::Closed.as_label(), "manager_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerError::SpawnTimeout { .. } => "manager_spawn_timeout",
            ManagerError::SpawnFailed { .. } => "manager_spawn_failed",
            ManagerError::Launch(e) => e.as_label(),
            ManagerError::Registry(e) => e.as_label(),
            ManagerError::Connect(e) => e.as_label(),
            ManagerError::Closed => "manager_closed",
        }
    }

    /// Indicates whether retrying `connect` later may succeed.
    ///
    /// `SpawnTimeout` and `DiscoveryTimeout` are retryable (a slow worker may
    /// register meanwhile); `Closed` and launch failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ManagerError::SpawnTimeout { .. }
                | ManagerError::Registry(RegistryError::DiscoveryTimeout { .. })
                | ManagerError::Connect(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_error_lists_every_failure() {
        let err = TeardownError {
            failures: vec![
                StopFailure {
                    resource: "actors".into(),
                    error: StopError::Failed {
                        reason: "boom".into(),
                    },
                },
                StopFailure {
                    resource: "executor".into(),
                    error: StopError::GraceExceeded {
                        grace: Duration::from_millis(5),
                        stuck: vec!["io".into()],
                    },
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("2 resource(s) failed to stop"));
        assert!(text.contains("actors: stop failed: boom"));
        assert!(text.contains("executor"));
        assert_eq!(err.resources(), vec!["actors", "executor"]);
    }

    #[test]
    fn retryable_classification() {
        let timeout = ManagerError::SpawnTimeout {
            signature: "s".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());
        assert!(!ManagerError::Closed.is_retryable());
        assert_eq!(timeout.as_label(), "manager_spawn_timeout");
    }
}
