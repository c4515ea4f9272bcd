//! # daemonlink
//!
//! **daemonlink** is the client side of a long-lived background worker ("daemon").
//!
//! It finds a running worker whose configuration fits the request, or starts
//! one, opens an ordered message channel to it, and tears down every
//! client-held resource when it is done, whether connecting worked or not.
//! What travels over the channel is up to the caller: frames are opaque bytes.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 connect(&ConfigSignature)                 close()
//!                            │                                 │
//! ┌──────────────────────────▼─────────────────────────────────▼──────┐
//! │  ConnectionManager                                                │
//! │  - SpawnGate per signature (coalesces concurrent spawns)          │
//! │  - Compatibility (reuse predicate, ExactMatch by default)         │
//! │  - Bus (broadcast events) ──► event listener ──► SubscriberSet    │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────────┐
//! │ProcessRegistry│  │   Launcher   │   │ ActorFactory                 │
//! │ (FileRegistry │  │(CommandLaunch│   │  └─ ActorChannel per endpoint│
//! │  + flock)     │  │ er, detached)│   │     (mailbox + reader task)  │
//! └──────────────┘   └──────────────┘   └──────────────┬───────────────┘
//!                                                      ▼
//!                                       ┌──────────────────────────────┐
//!                                       │ ExecutorFactory              │
//!                                       │  └─ named Pools ("actors")   │
//!                                       └──────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Init ──► Discovering ──► Reusing ──┐
//!               │                    ├──► Connected ──► Closing ──► Closed
//!               └────► Spawning ─────┘
//!
//! close(): stop_all([ActorFactory, ExecutorFactory]) ─► report ─► stop event listener
//! ```
//!
//! ## Features
//! | Area               | Description                                                  | Key types / traits                                  |
//! |--------------------|--------------------------------------------------------------|-----------------------------------------------------|
//! | **Manager**        | Discovery, reuse or spawn, connection, ordered teardown.     | [`ConnectionManager`], [`Connection`]               |
//! | **Registry**       | Host-wide directory of worker endpoints.                     | [`ProcessRegistry`], [`FileRegistry`], [`WorkerRegistration`] |
//! | **Channels**       | Ordered single-consumer mailboxes bound to transports.       | [`ActorFactory`], [`ActorChannel`], [`Handler`]     |
//! | **Pools**          | Named task pools stopped together within a grace period.     | [`ExecutorFactory`], [`Pool`]                       |
//! | **Teardown**       | Failure-tolerant ordered shutdown.                           | [`Stoppable`], [`teardown::stop_all`]               |
//! | **Launching**      | Detached worker processes carrying the idle timeout.         | [`Launcher`], [`CommandLauncher`]                   |
//! | **Subscriber API** | Hook into lifecycle events (logging, metrics, custom).       | [`Subscribe`], [`Event`]                            |
//! | **Configuration**  | Centralized settings and poll schedule.                      | [`ManagerConfig`], [`BackoffPolicy`]                |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] subscriber (renders events through `tracing`).
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use daemonlink::{CommandLauncher, ConfigSignature, ConnectionManager, IdleTimeout, ManagerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn daemonlink::Subscribe>> = vec![Arc::new(daemonlink::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn daemonlink::Subscribe>> = Vec::new();
//!
//!     let manager = ConnectionManager::builder(ManagerConfig::default(), CommandLauncher::new("worker"))
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     let signature = ConfigSignature::new("/src/project", IdleTimeout::DEFAULT)
//!         .with_env("JAVA_HOME", "/opt/jdk");
//!     let conn = manager.connect(&signature).await?;
//!     conn.send(&b"build"[..])?;
//!     while let Some(frame) = conn.recv().await {
//!         println!("{} bytes from worker", frame.len());
//!     }
//!
//!     manager.close().await?;
//!     Ok(())
//! }
//! ```
mod actor;
mod config;
mod error;
mod events;
mod executor;
mod launcher;
mod manager;
mod policies;
mod registry;
mod signature;
mod subscribers;
pub mod teardown;

// ---- Public re-exports ----

pub use actor::{
    Actor, ActorChannel, ActorFactory, Connector, Flow, FrameSink, FrameStream, FramedConnector, Handler,
    Transport,
};
pub use config::{IdleTimeout, ManagerConfig};
pub use error::{
    ChannelError, ConnectError, LaunchError, ManagerError, PoolError, RegistryError, StopError, StopFailure,
    TeardownError,
};
pub use events::{Bus, Event, EventKind};
pub use executor::{ExecutorFactory, Pool, Sizing, StopPolicy};
pub use launcher::{CommandLauncher, IDLE_TIMEOUT_ENV, Launcher, ProcessHandle, SpawnRequest};
pub use manager::{Connection, ConnectionManager, ManagerBuilder, ManagerState};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use registry::{
    Criteria, EndpointAddress, EndpointState, FileRegistry, LivenessProbe, ProcessProbe, ProcessRegistry,
    WorkerEndpoint, WorkerRegistration,
};
pub use signature::{Compatibility, ConfigSignature, ExactMatch};
pub use subscribers::{Subscribe, SubscriberSet};
pub use teardown::Stoppable;

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
