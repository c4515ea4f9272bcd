use std::fmt::{self, Write as _};
use std::net::SocketAddr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::signature::ConfigSignature;

/// Where a worker accepts connections.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum EndpointAddress {
    /// TCP socket.
    Tcp(SocketAddr),
    /// Unix domain socket.
    Unix(PathBuf),
}

impl EndpointAddress {
    /// File-name-safe key, distinct for distinct addresses.
    ///
    /// ASCII alphanumerics are kept; every other byte becomes `_` followed by
    /// its two hex digits, so `_` itself is always escaped.
    ///
    /// ```
    /// use daemonlink::EndpointAddress;
    ///
    /// let addr = EndpointAddress::Tcp("127.0.0.1:4000".parse().unwrap());
    /// assert_eq!(addr.key(), "tcp_3a_2f_2f127_2e0_2e0_2e1_3a4000");
    /// ```
    pub fn key(&self) -> String {
        let (scheme, raw): (&str, Vec<u8>) = match self {
            EndpointAddress::Tcp(addr) => ("tcp://", addr.to_string().into_bytes()),
            EndpointAddress::Unix(path) => ("unix://", path.as_os_str().as_bytes().to_vec()),
        };

        let mut key = String::with_capacity(scheme.len() + raw.len() * 2);
        for &b in scheme.as_bytes().iter().chain(raw.iter()) {
            if b.is_ascii_alphanumeric() {
                key.push(char::from(b));
            } else {
                // writing to a String cannot fail
                let _ = write!(key, "_{b:02x}");
            }
        }
        key
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointAddress::Tcp(addr) => write!(f, "tcp://{addr}"),
            EndpointAddress::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl From<SocketAddr> for EndpointAddress {
    fn from(addr: SocketAddr) -> Self {
        EndpointAddress::Tcp(addr)
    }
}

/// Lifecycle state a worker advertises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    /// Process is up but not yet accepting work.
    Starting,
    /// Accepting connections.
    Idle,
    /// Serving a client.
    Busy,
    /// Shutting down.
    Stopped,
}

impl EndpointState {
    /// Stable snake_case label.
    pub fn as_label(&self) -> &'static str {
        match self {
            EndpointState::Starting => "starting",
            EndpointState::Idle => "idle",
            EndpointState::Busy => "busy",
            EndpointState::Stopped => "stopped",
        }
    }
}

/// One registry record describing a worker process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEndpoint {
    /// Connection address; unique within the registry.
    pub address: EndpointAddress,
    /// Owning process id.
    pub pid: u32,
    /// Advertised state.
    pub state: EndpointState,
    /// Configuration the worker runs with.
    pub signature: ConfigSignature,
    /// Registration time, milliseconds since the Unix epoch.
    pub registered_at_ms: u64,
}

impl WorkerEndpoint {
    /// New record in [`EndpointState::Starting`], stamped with the current time.
    pub fn new(address: impl Into<EndpointAddress>, pid: u32, signature: ConfigSignature) -> Self {
        let registered_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
            .unwrap_or(0);
        Self {
            address: address.into(),
            pid,
            state: EndpointState::Starting,
            signature,
            registered_at_ms,
        }
    }

    /// Replaces the state.
    #[must_use]
    pub fn with_state(mut self, state: EndpointState) -> Self {
        self.state = state;
        self
    }
}
