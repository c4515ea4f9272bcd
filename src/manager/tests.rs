use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::*;
use crate::config::IdleTimeout;
use crate::error::{ChannelError, LaunchError};
use crate::launcher::ProcessHandle;
use crate::policies::{BackoffPolicy, JitterPolicy};
use crate::registry::FileRegistry;
use crate::subscribers::Subscribe;

const DEAD_PID: u32 = u32::MAX - 1;

/// Starts an in-process worker that echoes every frame back.
async fn start_worker() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut framed = Framed::new(sock, LengthDelimitedCodec::new());
                while let Some(Ok(frame)) = framed.next().await {
                    if framed.send(frame.freeze()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// Address nobody listens on.
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[derive(Clone, Copy)]
enum Mode {
    RegisterAfter(Duration),
    Never,
}

/// Launcher that "starts" an in-process worker and registers it like a real one would.
struct FakeLauncher {
    spawns: Arc<AtomicUsize>,
    registry: Arc<FileRegistry>,
    mode: Mode,
}

impl Launcher for FakeLauncher {
    fn spawn(&self, request: &SpawnRequest) -> Result<ProcessHandle, LaunchError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        let Mode::RegisterAfter(delay) = self.mode else {
            return Ok(ProcessHandle { pid: None });
        };

        let registry = Arc::clone(&self.registry);
        let signature = ConfigSignature {
            working_dir: request.working_dir.clone(),
            idle_timeout: request.idle_timeout,
            env: request.env.clone(),
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let addr = start_worker().await;
            registry
                .register(WorkerEndpoint::new(addr, std::process::id(), signature).with_state(EndpointState::Idle))
                .await
                .unwrap();
        });
        Ok(ProcessHandle {
            pid: Some(std::process::id()),
        })
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    registry: Arc<FileRegistry>,
    spawns: Arc<AtomicUsize>,
    manager: Arc<ConnectionManager>,
}

fn config(dir: &Path) -> ManagerConfig {
    ManagerConfig {
        registry_dir: dir.to_path_buf(),
        grace: Duration::from_secs(1),
        spawn_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(1),
        bus_capacity: 256,
        poll: BackoffPolicy {
            first: Duration::from_millis(5),
            max: Duration::from_millis(50),
            factor: 1.5,
            jitter: JitterPolicy::None,
        },
        prune_stale: true,
    }
}

fn harness_with(mode: Mode, tweak: impl FnOnce(&mut ManagerConfig), subscribers: Vec<Arc<dyn Subscribe>>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(FileRegistry::open(dir.path()).unwrap());
    let spawns = Arc::new(AtomicUsize::new(0));

    let mut cfg = config(dir.path());
    tweak(&mut cfg);

    let launcher = FakeLauncher {
        spawns: Arc::clone(&spawns),
        registry: Arc::clone(&registry),
        mode,
    };
    let manager = ConnectionManager::builder(cfg, launcher)
        .with_registry(registry.clone())
        .with_subscribers(subscribers)
        .build()
        .unwrap();

    Harness {
        _dir: dir,
        registry,
        spawns,
        manager,
    }
}

fn harness(mode: Mode) -> Harness {
    harness_with(mode, |_| {}, Vec::new())
}

fn signature() -> ConfigSignature {
    ConfigSignature::new("/work/project", IdleTimeout::from_millis(60_000)).with_env("JAVA_HOME", "/opt/jdk")
}

#[tokio::test]
async fn spawns_a_worker_and_connects_once_it_registers() {
    let h = harness(Mode::RegisterAfter(Duration::from_millis(50)));

    let conn = h.manager.connect(&signature()).await.unwrap();
    assert_eq!(h.spawns.load(Ordering::SeqCst), 1);
    assert_eq!(h.manager.state(), ManagerState::Connected);

    conn.send(Bytes::from_static(b"hello")).unwrap();
    assert_eq!(conn.recv().await.as_deref(), Some(&b"hello"[..]));

    h.manager.close().await.unwrap();
}

#[tokio::test]
async fn reuses_an_idle_compatible_worker_without_launching() {
    let h = harness(Mode::Never);
    let addr = start_worker().await;
    h.registry
        .register(WorkerEndpoint::new(addr, std::process::id(), signature()).with_state(EndpointState::Idle))
        .await
        .unwrap();

    let conn = h.manager.connect(&signature()).await.unwrap();
    assert_eq!(h.spawns.load(Ordering::SeqCst), 0);
    assert_eq!(conn.endpoint().address, EndpointAddress::Tcp(addr));

    h.manager.close().await.unwrap();
}

#[tokio::test]
async fn incompatible_workers_are_not_reused() {
    let h = harness(Mode::RegisterAfter(Duration::from_millis(10)));
    let addr = start_worker().await;
    let other = ConfigSignature::new("/elsewhere", IdleTimeout::from_millis(60_000));
    h.registry
        .register(WorkerEndpoint::new(addr, std::process::id(), other).with_state(EndpointState::Idle))
        .await
        .unwrap();

    let conn = h.manager.connect(&signature()).await.unwrap();
    assert_eq!(h.spawns.load(Ordering::SeqCst), 1);
    assert_ne!(conn.endpoint().address, EndpointAddress::Tcp(addr));

    h.manager.close().await.unwrap();
}

#[tokio::test]
async fn skips_a_stale_entry_and_prunes_it() {
    let h = harness(Mode::Never);

    let mut stale = WorkerEndpoint::new(closed_port().await, DEAD_PID, signature()).with_state(EndpointState::Idle);
    stale.registered_at_ms = 0;
    h.registry.register(stale.clone()).await.unwrap();

    let live = start_worker().await;
    h.registry
        .register(WorkerEndpoint::new(live, std::process::id(), signature()).with_state(EndpointState::Idle))
        .await
        .unwrap();

    let conn = h.manager.connect(&signature()).await.unwrap();
    assert_eq!(conn.endpoint().address, EndpointAddress::Tcp(live));
    assert_eq!(h.spawns.load(Ordering::SeqCst), 0);

    let left = h.registry.all().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].address, EndpointAddress::Tcp(live));

    h.manager.close().await.unwrap();
}

#[tokio::test]
async fn unregistered_spawn_times_out() {
    let h = harness_with(
        Mode::Never,
        |cfg| cfg.spawn_timeout = Duration::from_millis(100),
        Vec::new(),
    );

    let err = h.manager.connect(&signature()).await.unwrap_err();
    assert!(matches!(err, ManagerError::SpawnTimeout { .. }), "got {err:?}");
    assert!(err.is_retryable());
    assert_eq!(h.spawns.load(Ordering::SeqCst), 1);

    h.manager.close().await.unwrap();
}

#[tokio::test]
async fn concurrent_identical_connects_spawn_once() {
    let h = harness(Mode::RegisterAfter(Duration::from_millis(100)));
    let sig = signature();

    let (a, b) = tokio::join!(h.manager.connect(&sig), h.manager.connect(&sig));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(h.spawns.load(Ordering::SeqCst), 1);
    assert_eq!(a.endpoint().address, b.endpoint().address);

    h.manager.close().await.unwrap();
}

#[tokio::test]
async fn concurrent_connects_share_a_failed_spawn() {
    let timeout = Duration::from_millis(300);
    let h = harness_with(Mode::Never, |cfg| cfg.spawn_timeout = timeout, Vec::new());
    let sig = signature();

    let started = std::time::Instant::now();
    let (a, b) = tokio::join!(h.manager.connect(&sig), h.manager.connect(&sig));
    let elapsed = started.elapsed();

    assert_eq!(a.unwrap_err().as_label(), "manager_spawn_timeout");
    assert_eq!(b.unwrap_err().as_label(), "manager_spawn_timeout");
    assert_eq!(h.spawns.load(Ordering::SeqCst), 1);
    assert!(elapsed < timeout * 2, "waited {elapsed:?}");

    h.manager.close().await.unwrap();
}

#[tokio::test]
async fn queued_caller_gets_a_concurrent_launch_failure() {
    struct Broken(Arc<AtomicUsize>);

    impl Launcher for Broken {
        fn spawn(&self, _: &SpawnRequest) -> Result<ProcessHandle, LaunchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(LaunchError::Spawn {
                program: "/nonexistent/worker".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let spawns = Arc::new(AtomicUsize::new(0));
    let manager = ConnectionManager::builder(config(dir.path()), Broken(spawns.clone()))
        .build()
        .unwrap();
    let sig = signature();

    let (a, b) = tokio::join!(manager.connect(&sig), manager.connect(&sig));
    let mut labels = [a.unwrap_err().as_label(), b.unwrap_err().as_label()];
    labels.sort_unstable();

    assert_eq!(labels, ["launch_spawn", "manager_spawn_failed"]);
    assert_eq!(spawns.load(Ordering::SeqCst), 1);

    manager.close().await.unwrap();
}

#[tokio::test]
async fn unbounded_spawn_timeout_still_connects() {
    let h = harness_with(
        Mode::RegisterAfter(Duration::from_millis(20)),
        |cfg| cfg.spawn_timeout = Duration::MAX,
        Vec::new(),
    );

    let conn = h.manager.connect(&signature()).await.unwrap();
    assert_eq!(h.spawns.load(Ordering::SeqCst), 1);
    conn.send(Bytes::from_static(b"ping")).unwrap();
    assert_eq!(conn.recv().await.as_deref(), Some(&b"ping"[..]));

    h.manager.close().await.unwrap();
}

#[tokio::test]
async fn gates_are_released_after_connect() {
    let h = harness(Mode::RegisterAfter(Duration::from_millis(10)));

    let _conn = h.manager.connect(&signature()).await.unwrap();
    assert_eq!(h.manager.gates.len(), 0);

    let other = ConfigSignature::new("/other", IdleTimeout::from_millis(1_000));
    let _ = h.manager.connect(&other).await.unwrap();
    assert_eq!(h.manager.gates.len(), 0);

    h.manager.close().await.unwrap();
}

#[tokio::test]
async fn close_is_idempotent_and_terminal() {
    let h = harness(Mode::RegisterAfter(Duration::from_millis(10)));
    let conn = h.manager.connect(&signature()).await.unwrap();

    h.manager.close().await.unwrap();
    assert_eq!(h.manager.state(), ManagerState::Closed);
    h.manager.close().await.unwrap();

    assert!(conn.is_closed());
    assert!(matches!(conn.send(&b"late"[..]), Err(ChannelError::Stopped { .. })));
    assert!(matches!(
        h.manager.connect(&signature()).await,
        Err(ManagerError::Closed)
    ));
}

struct Recorder {
    seen: Arc<parking_lot::Mutex<Vec<EventKind>>>,
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &Event) {
        self.seen.lock().push(ev.kind);
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test]
async fn lifecycle_events_reach_subscribers_before_close_returns() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let h = harness_with(
        Mode::RegisterAfter(Duration::from_millis(10)),
        |_| {},
        vec![Arc::new(Recorder { seen: seen.clone() })],
    );

    let _conn = h.manager.connect(&signature()).await.unwrap();
    h.manager.close().await.unwrap();

    let seen = seen.lock().clone();
    for kind in [
        EventKind::DiscoveryStarted,
        EventKind::SpawnRequested,
        EventKind::EndpointRegistered,
        EventKind::Connected,
        EventKind::CloseRequested,
        EventKind::Closed,
    ] {
        assert!(seen.contains(&kind), "missing {kind:?} in {seen:?}");
    }
    let connected = seen.iter().position(|k| *k == EventKind::Connected);
    let closed = seen.iter().position(|k| *k == EventKind::Closed);
    assert!(connected < closed);
}
