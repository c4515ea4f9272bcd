//! # Directory-backed registry.
//!
//! Layout:
//! ```text
//! <dir>/
//!   registry.lock                              exclusive flock held by writers
//!   tcp_3a_2f_2f127_2e0_2e0_2e1_3a4000.json    one WorkerEndpoint per address
//!   unix_3a_2f_2f_2ftmp_2fw_2esock.json
//! ```
//!
//! Readers never take the lock. Writers publish through a temp file plus
//! `rename`, so a reader sees either the old record or the new one.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use nix::fcntl::{Flock, FlockArg};
use tracing::warn;

use super::endpoint::{EndpointAddress, EndpointState, WorkerEndpoint};
use super::probe::{LivenessProbe, ProcessProbe};
use super::ProcessRegistry;
use crate::error::RegistryError;

const LOCK_FILE: &str = "registry.lock";
const ENTRY_EXT: &str = "json";

/// [`ProcessRegistry`] stored as one JSON file per endpoint.
#[derive(Clone)]
pub struct FileRegistry {
    store: Arc<Store>,
}

struct Store {
    dir: PathBuf,
    probe: Arc<dyn LivenessProbe>,
}

impl FileRegistry {
    /// Opens (creating if needed) the registry at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let dir = dir.into();
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&dir)
            .map_err(|e| RegistryError::io(&dir, e))?;
        Ok(Self {
            store: Arc::new(Store {
                dir,
                probe: Arc::new(ProcessProbe),
            }),
        })
    }

    /// Replaces the probe used to decide whether an address owner is alive.
    #[must_use]
    pub fn with_probe(self, probe: impl LivenessProbe) -> Self {
        Self {
            store: Arc::new(Store {
                dir: self.store.dir.clone(),
                probe: Arc::new(probe),
            }),
        }
    }

    /// Registry directory.
    pub fn dir(&self) -> &Path {
        &self.store.dir
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, RegistryError>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T, RegistryError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| RegistryError::io(&self.store.dir, io::Error::other(e)))?
    }
}

impl Store {
    fn entry_path(&self, address: &EndpointAddress) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXT}", address.key()))
    }

    fn lock(&self) -> Result<Flock<File>, RegistryError> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&path)
            .map_err(|e| RegistryError::io(&path, e))?;

        Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_file, errno)| RegistryError::Lock { path, errno })
    }

    /// Reads one record; missing or malformed files yield `None`.
    fn read_entry(&self, path: &Path) -> Result<Option<WorkerEndpoint>, RegistryError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RegistryError::io(path, e)),
        };
        match serde_json::from_str(&text) {
            Ok(ep) => Ok(Some(ep)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed registry entry");
                Ok(None)
            }
        }
    }

    /// Reads the record stored for `address`.
    ///
    /// A file whose record names another address is treated as absent.
    fn read_entry_for(&self, address: &EndpointAddress) -> Result<Option<WorkerEndpoint>, RegistryError> {
        let path = self.entry_path(address);
        match self.read_entry(&path)? {
            Some(ep) if ep.address == *address => Ok(Some(ep)),
            Some(ep) => {
                warn!(
                    path = %path.display(),
                    expected = %address,
                    found = %ep.address,
                    "registry entry holds a different address"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn read_all(&self) -> Result<Vec<WorkerEndpoint>, RegistryError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| RegistryError::io(&self.dir, e))?;
        let mut out = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| RegistryError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|x| x.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            match self.read_entry(&path) {
                Ok(Some(ep)) => out.push(ep),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable registry entry"),
            }
        }
        out.sort_by_key(|ep| ep.registered_at_ms);
        Ok(out)
    }

    fn write_entry(&self, ep: &WorkerEndpoint) -> Result<(), RegistryError> {
        let bytes = serde_json::to_vec_pretty(ep).map_err(|source| RegistryError::Encode {
            address: ep.address.to_string(),
            source,
        })?;
        let path = self.entry_path(&ep.address);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", ep.address.key(), ep.pid));

        let mut f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&tmp)
            .map_err(|e| RegistryError::io(&tmp, e))?;
        f.write_all(&bytes)
            .and_then(|()| f.sync_all())
            .map_err(|e| RegistryError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| RegistryError::io(&path, e))
    }

    fn register(&self, ep: WorkerEndpoint) -> Result<(), RegistryError> {
        let _lock = self.lock()?;
        if let Some(existing) = self.read_entry_for(&ep.address)? {
            if existing.pid != ep.pid && self.probe.is_alive(existing.pid) {
                return Err(RegistryError::AddressInUse {
                    address: ep.address.to_string(),
                    pid: existing.pid,
                });
            }
        }
        self.write_entry(&ep)
    }

    fn update_state(
        &self,
        address: &EndpointAddress,
        pid: u32,
        state: EndpointState,
    ) -> Result<(), RegistryError> {
        let _lock = self.lock()?;
        let Some(existing) = self.read_entry_for(address)? else {
            return Err(RegistryError::NotFound {
                address: address.to_string(),
            });
        };
        if existing.pid != pid {
            return Err(RegistryError::NotOwner {
                address: address.to_string(),
                pid,
            });
        }
        self.write_entry(&existing.with_state(state))
    }

    /// Removes the entry for `address` if `pid` owns it.
    ///
    /// `strict` turns an ownership mismatch into `NotOwner`; otherwise it is
    /// reported as "nothing removed".
    fn remove(&self, address: &EndpointAddress, pid: u32, strict: bool) -> Result<bool, RegistryError> {
        let _lock = self.lock()?;
        let Some(existing) = self.read_entry_for(address)? else {
            return Ok(false);
        };
        if existing.pid != pid {
            if strict {
                return Err(RegistryError::NotOwner {
                    address: address.to_string(),
                    pid,
                });
            }
            return Ok(false);
        }
        let path = self.entry_path(address);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RegistryError::io(&path, e)),
        }
    }
}

#[async_trait]
impl ProcessRegistry for FileRegistry {
    async fn all(&self) -> Result<Vec<WorkerEndpoint>, RegistryError> {
        self.blocking(|s| s.read_all()).await
    }

    async fn register(&self, endpoint: WorkerEndpoint) -> Result<(), RegistryError> {
        self.blocking(move |s| s.register(endpoint)).await
    }

    async fn update_state(
        &self,
        address: &EndpointAddress,
        pid: u32,
        state: EndpointState,
    ) -> Result<(), RegistryError> {
        let address = address.clone();
        self.blocking(move |s| s.update_state(&address, pid, state)).await
    }

    async fn remove(&self, address: &EndpointAddress, pid: u32) -> Result<bool, RegistryError> {
        let address = address.clone();
        self.blocking(move |s| s.remove(&address, pid, true)).await
    }

    async fn prune(&self, probe: &dyn LivenessProbe) -> Result<Vec<WorkerEndpoint>, RegistryError> {
        let dead: Vec<WorkerEndpoint> = self
            .all()
            .await?
            .into_iter()
            .filter(|ep| !probe.is_alive(ep.pid))
            .collect();
        if dead.is_empty() {
            return Ok(dead);
        }

        self.blocking(move |s| {
            let mut removed = Vec::with_capacity(dead.len());
            for ep in dead {
                // the address may have been re-registered by a new owner meanwhile
                if s.remove(&ep.address, ep.pid, false)? {
                    removed.push(ep);
                }
            }
            Ok(removed)
        })
        .await
    }
}
