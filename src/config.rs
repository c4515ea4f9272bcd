//! # Connection manager configuration.
//!
//! Provides [`ManagerConfig`] centralized settings for the manager and the
//! resources it owns, plus the [`IdleTimeout`] value handed to spawned workers.
//!
//! Config is used in two ways:
//! 1. **Manager creation**: `ConnectionManager::builder(config, launcher)`
//! 2. **Spawn requests**: the registry dir travels to the worker so it registers where the client looks.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::{BackoffPolicy, JitterPolicy};

/// Idle duration after which a spawned worker shuts itself down.
///
/// Immutable once built; passed to the launcher at spawn time and recorded in
/// the worker's [`ConfigSignature`](crate::ConfigSignature).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdleTimeout(#[serde(with = "millis")] Duration);

impl IdleTimeout {
    /// Default idle timeout: 3 hours.
    pub const DEFAULT: IdleTimeout = IdleTimeout(Duration::from_secs(3 * 60 * 60));

    /// Wraps a duration.
    pub const fn new(d: Duration) -> Self {
        Self(d)
    }

    /// Builds from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    /// Returns the wrapped duration.
    #[inline]
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Returns the duration in whole milliseconds (saturating).
    #[inline]
    pub fn as_millis(&self) -> u64 {
        self.0.as_millis().min(u128::from(u64::MAX)) as u64
    }
}

impl Default for IdleTimeout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
///
/// ## Field semantics
/// - `registry_dir`: shared directory holding endpoint records
/// - `grace`: per-pool shutdown grace during `close()`
/// - `spawn_timeout`: how long to wait for a spawned worker to register
/// - `handshake_timeout`: per-candidate transport connect timeout
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `poll`: registry polling schedule while waiting for a registration
/// - `prune_stale`: drop dead-pid entries when a candidate fails its handshake
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Directory of the shared process registry.
    pub registry_dir: PathBuf,

    /// Maximum time each pool gets to stop before it is reported stuck.
    pub grace: Duration,

    /// Maximum wait for a spawned worker to appear in the registry.
    ///
    /// Exceeding it fails `connect` with `ManagerError::SpawnTimeout`.
    pub spawn_timeout: Duration,

    /// Maximum time to establish the transport to one candidate.
    pub handshake_timeout: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Poll schedule used by `await_registration` (attempt `n` sleeps `poll.next(n)`).
    pub poll: BackoffPolicy,

    /// Whether a failed candidate triggers pruning of dead registry entries.
    pub prune_stale: bool,
}

impl ManagerConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the default registry location: `~/.daemonlink/registry`.
    ///
    /// Falls back to the system temp dir when no home directory is known.
    pub fn default_registry_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".daemonlink")
            .join("registry")
    }
}

impl Default for ManagerConfig {
    /// Default configuration:
    ///
    /// - `registry_dir = ~/.daemonlink/registry`
    /// - `grace = 10s`
    /// - `spawn_timeout = 30s`
    /// - `handshake_timeout = 5s`
    /// - `bus_capacity = 1024`
    /// - `poll = 25ms × 1.5 up to 1s, equal jitter`
    /// - `prune_stale = true`
    fn default() -> Self {
        Self {
            registry_dir: Self::default_registry_dir(),
            grace: Duration::from_secs(10),
            spawn_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(5),
            bus_capacity: 1024,
            poll: BackoffPolicy {
                first: Duration::from_millis(25),
                max: Duration::from_secs(1),
                factor: 1.5,
                jitter: JitterPolicy::Equal,
            },
            prune_stale: true,
        }
    }
}
