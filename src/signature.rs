//! # Worker configuration signatures and reuse compatibility.
//!
//! A [`ConfigSignature`] describes the configuration a worker was (or should be)
//! started with. The manager only reuses an endpoint whose recorded signature is
//! accepted by the configured [`Compatibility`] predicate.
//!
//! Matching is policy, not mechanism: [`ExactMatch`] is the default, and any
//! `Fn(&ConfigSignature, &ConfigSignature) -> bool` can be plugged in instead.
//!
//! ## Example
//! ```rust
//! use daemonlink::{Compatibility, ConfigSignature, ExactMatch, IdleTimeout};
//!
//! let wanted = ConfigSignature::new("/work", IdleTimeout::from_millis(60_000))
//!     .with_env("JAVA_HOME", "/opt/jdk");
//! let offered = wanted.clone();
//! assert!(ExactMatch.is_compatible(&wanted, &offered));
//!
//! // Ignore the environment entirely:
//! let loose = |a: &ConfigSignature, b: &ConfigSignature| a.working_dir == b.working_dir;
//! assert!(loose.is_compatible(&wanted, &ConfigSignature::new("/work", IdleTimeout::DEFAULT)));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::IdleTimeout;

/// Configuration a worker process runs with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigSignature {
    /// Working directory of the worker.
    pub working_dir: PathBuf,
    /// Idle timeout the worker was started with.
    pub idle_timeout: IdleTimeout,
    /// Environment fingerprint (sorted, so equality is order-independent).
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ConfigSignature {
    /// Creates a signature with an empty environment.
    pub fn new(working_dir: impl Into<PathBuf>, idle_timeout: IdleTimeout) -> Self {
        Self {
            working_dir: working_dir.into(),
            idle_timeout,
            env: BTreeMap::new(),
        }
    }

    /// Adds one environment entry.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ConfigSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dir={} idle={}ms env={}",
            self.working_dir.display(),
            self.idle_timeout.as_millis(),
            self.env.len()
        )
    }
}

/// Decides whether a running worker can serve a request.
pub trait Compatibility: Send + Sync + 'static {
    /// Returns `true` if a worker started with `offered` may serve `requested`.
    fn is_compatible(&self, requested: &ConfigSignature, offered: &ConfigSignature) -> bool;
}

/// Default policy: working directory, idle timeout and environment must all match.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExactMatch;

impl Compatibility for ExactMatch {
    fn is_compatible(&self, requested: &ConfigSignature, offered: &ConfigSignature) -> bool {
        requested == offered
    }
}

impl<F> Compatibility for F
where
    F: Fn(&ConfigSignature, &ConfigSignature) -> bool + Send + Sync + 'static,
{
    fn is_compatible(&self, requested: &ConfigSignature, offered: &ConfigSignature) -> bool {
        self(requested, offered)
    }
}
