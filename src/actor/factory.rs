use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::actor::{Actor, ActorControl, Handler, bind};
use super::channel::{ActorChannel, ChannelDispatcher, read_frames};
use super::transport::{Connector, Transport};
use crate::error::{ConnectError, PoolError, StopError};
use crate::executor::{ExecutorFactory, Pool, Sizing, StopPolicy};
use crate::registry::WorkerEndpoint;
use crate::teardown::Stoppable;

const ACTOR_POOL: &str = "actors";

/// Creates actors and endpoint channels, and stops them all on teardown.
///
/// Dispatch loops and frame readers run on the executor's `actors` pool.
pub struct ActorFactory {
    pool: Pool,
    grace: Duration,
    live: Mutex<Vec<ActorControl>>,
    stopped: AtomicBool,
}

impl ActorFactory {
    /// Creates a factory running on `executor`'s `actors` pool.
    pub fn new(executor: &ExecutorFactory) -> Result<Self, PoolError> {
        let pool = executor.get_or_create_with(ACTOR_POOL, Sizing::Unbounded, StopPolicy::Drain)?;
        Ok(Self {
            pool,
            grace: executor.grace(),
            live: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        })
    }

    /// Spawns a dispatch loop for `handler` and returns its handle.
    pub fn create_actor<H: Handler>(&self, name: &str, handler: H) -> Result<Actor<H::Message>, PoolError> {
        let mut live = self.live.lock();
        if self.stopped.load(Ordering::Acquire) {
            return Err(self.stopped_error());
        }
        live.retain(|c| !c.is_finished());

        let (actor, control, run) = bind(name, handler);
        self.pool.spawn(run)?;
        live.push(control);
        Ok(actor)
    }

    /// Connects to `endpoint` and binds the transport to a new channel actor.
    ///
    /// The connect is bounded by `handshake_timeout`.
    pub async fn create_channel(
        &self,
        endpoint: &WorkerEndpoint,
        connector: &dyn Connector,
        handshake_timeout: Duration,
    ) -> Result<ActorChannel, ConnectError> {
        let address = endpoint.address.to_string();

        let transport = match tokio::time::timeout(handshake_timeout, connector.connect(&endpoint.address)).await {
            Err(_elapsed) => {
                return Err(ConnectError::HandshakeTimeout {
                    address,
                    timeout: handshake_timeout,
                });
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::Unsupported => {
                return Err(ConnectError::Unsupported { address });
            }
            Ok(Err(source)) => return Err(ConnectError::Io { address, source }),
            Ok(Ok(t)) => t,
        };

        let Transport { sink, stream } = transport;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let actor = self.create_actor(
            &address,
            ChannelDispatcher {
                address: address.clone(),
                sink,
                inbound: Some(inbound_tx),
            },
        )?;

        if let Err(e) = self.pool.spawn(read_frames(stream, actor.clone(), actor.token())) {
            actor.stop();
            return Err(e.into());
        }
        Ok(ActorChannel::new(endpoint.clone(), actor, inbound_rx))
    }

    /// Number of actors whose dispatch loop has not finished.
    pub fn live(&self) -> usize {
        let mut live = self.live.lock();
        live.retain(|c| !c.is_finished());
        live.len()
    }

    fn stopped_error(&self) -> PoolError {
        PoolError::Stopped {
            pool: ACTOR_POOL.to_string(),
        }
    }
}

#[async_trait]
impl Stoppable for ActorFactory {
    fn name(&self) -> &str {
        ACTOR_POOL
    }

    async fn stop(&self) -> Result<(), StopError> {
        let controls: Vec<ActorControl> = {
            let mut live = self.live.lock();
            self.stopped.store(true, Ordering::Release);
            std::mem::take(&mut *live)
        };
        for c in &controls {
            c.stop();
        }

        if self.pool.stop(self.grace).await {
            return Ok(());
        }
        let stuck = controls
            .iter()
            .filter(|c| !c.is_finished())
            .map(|c| c.name.to_string())
            .collect();
        Err(StopError::GraceExceeded {
            grace: self.grace,
            stuck,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Flow;
    use crate::config::IdleTimeout;
    use crate::error::ChannelError;
    use crate::signature::ConfigSignature;
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};
    use std::io;
    use tokio::io::DuplexStream;
    use tokio_util::codec::{Framed, LengthDelimitedCodec};

    /// Hands out the client half of a pre-made duplex pipe.
    struct PipeConnector {
        client: Mutex<Option<DuplexStream>>,
    }

    #[async_trait]
    impl Connector for PipeConnector {
        async fn connect(&self, _address: &crate::registry::EndpointAddress) -> io::Result<Transport> {
            let io = self
                .client
                .lock()
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "pipe already used"))?;
            Ok(Transport::framed(io))
        }
    }

    struct NeverConnector;

    #[async_trait]
    impl Connector for NeverConnector {
        async fn connect(&self, _address: &crate::registry::EndpointAddress) -> io::Result<Transport> {
            std::future::pending().await
        }
    }

    fn pipe() -> (PipeConnector, Framed<DuplexStream, LengthDelimitedCodec>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (
            PipeConnector {
                client: Mutex::new(Some(client)),
            },
            Framed::new(server, LengthDelimitedCodec::new()),
        )
    }

    fn endpoint() -> WorkerEndpoint {
        WorkerEndpoint::new(
            std::net::SocketAddr::from(([127, 0, 0, 1], 7000)),
            1,
            ConfigSignature::new("/w", IdleTimeout::DEFAULT),
        )
    }

    fn factory() -> (ExecutorFactory, ActorFactory) {
        let executor = ExecutorFactory::new(Duration::from_secs(1));
        let actors = ActorFactory::new(&executor).unwrap();
        (executor, actors)
    }

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        type Message = tokio::sync::oneshot::Sender<&'static str>;

        async fn handle(&mut self, reply: Self::Message) -> Flow {
            let _ = reply.send("pong");
            Flow::Continue
        }
    }

    #[tokio::test]
    async fn actors_run_on_the_pool_and_stop_with_the_factory() {
        let (executor, actors) = factory();
        let echo = actors.create_actor("echo", Echo).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        echo.send(tx).unwrap();
        assert_eq!(rx.await.unwrap(), "pong");
        assert_eq!(actors.live(), 1);

        Stoppable::stop(&actors).await.unwrap();
        assert!(echo.is_stopped());
        assert_eq!(actors.live(), 0);
        assert!(actors.create_actor("late", Echo).is_err());
        assert!(executor.stop_all().await.is_empty());
    }

    #[tokio::test]
    async fn channel_preserves_send_order() {
        let (_executor, actors) = factory();
        let (connector, mut server) = pipe();
        let chan = actors
            .create_channel(&endpoint(), &connector, Duration::from_secs(1))
            .await
            .unwrap();

        for i in 0..200u32 {
            chan.send(Bytes::from(i.to_be_bytes().to_vec())).unwrap();
        }
        for i in 0..200u32 {
            let frame = server.next().await.unwrap().unwrap();
            assert_eq!(&frame[..], &i.to_be_bytes());
        }
    }

    #[tokio::test]
    async fn inbound_frames_reach_recv_in_order() {
        let (_executor, actors) = factory();
        let (connector, mut server) = pipe();
        let chan = actors
            .create_channel(&endpoint(), &connector, Duration::from_secs(1))
            .await
            .unwrap();

        server.send(Bytes::from_static(b"one")).await.unwrap();
        server.send(Bytes::from_static(b"two")).await.unwrap();
        drop(server);

        assert_eq!(chan.recv().await.as_deref(), Some(&b"one"[..]));
        assert_eq!(chan.recv().await.as_deref(), Some(&b"two"[..]));
        assert_eq!(chan.recv().await, None);
        assert!(chan.is_stopped());
    }

    #[tokio::test]
    async fn channel_stop_is_idempotent() {
        let (_executor, actors) = factory();
        let (connector, _server) = pipe();
        let chan = actors
            .create_channel(&endpoint(), &connector, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(chan.stop());
        assert!(!chan.stop());
        assert!(chan.is_stopped());
        assert!(matches!(chan.send(&b"late"[..]), Err(ChannelError::Stopped { .. })));
        assert_eq!(chan.recv().await, None);
    }

    #[tokio::test]
    async fn handshake_timeout_is_typed() {
        let (_executor, actors) = factory();
        let err = actors
            .create_channel(&endpoint(), &NeverConnector, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::HandshakeTimeout { .. }));
    }

    #[tokio::test]
    async fn connect_failure_is_typed() {
        let (_executor, actors) = factory();
        let (connector, _server) = pipe();
        connector.client.lock().take();
        let err = actors
            .create_channel(&endpoint(), &connector, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "connect_io");
    }
}
