//! # Actor-backed channel to one worker endpoint.
//!
//! Outbound sends and inbound frames share one mailbox, so everything touching
//! the transport runs on a single logical thread:
//!
//! ```text
//! ActorChannel::send(b) ──► Dispatch::Outbound(b) ──┐
//!                                                   ├─► [mailbox] ─► ChannelDispatcher ─► sink
//! reader task ── frame ──► Dispatch::Inbound(f) ────┤                        └──────────► inbound queue ─► recv()
//!             ── EOF/err ─► Dispatch::RemoteClosed ─┘
//! ```

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::actor::{Actor, Flow, Handler};
use super::transport::{FrameSink, FrameStream};
use crate::error::ChannelError;
use crate::registry::WorkerEndpoint;

/// Mailbox item of a channel.
pub(crate) enum Dispatch {
    Outbound(Bytes),
    Inbound(Bytes),
    RemoteClosed(Option<String>),
}

/// Owns the write half and forwards inbound frames to the consumer.
pub(crate) struct ChannelDispatcher {
    pub(crate) address: String,
    pub(crate) sink: FrameSink,
    pub(crate) inbound: Option<mpsc::UnboundedSender<Bytes>>,
}

#[async_trait]
impl Handler for ChannelDispatcher {
    type Message = Dispatch;

    async fn handle(&mut self, msg: Dispatch) -> Flow {
        match msg {
            Dispatch::Outbound(frame) => match self.sink.send(frame).await {
                Ok(()) => Flow::Continue,
                Err(e) => {
                    warn!(address = %self.address, error = %e, "write failed; stopping channel");
                    Flow::Stop
                }
            },
            Dispatch::Inbound(frame) => {
                if let Some(inbound) = &self.inbound {
                    // receiver gone means nobody reads; the frame is dropped
                    let _ = inbound.send(frame);
                }
                Flow::Continue
            }
            Dispatch::RemoteClosed(reason) => {
                debug!(address = %self.address, reason = ?reason, "remote closed channel");
                Flow::Stop
            }
        }
    }

    async fn on_stop(&mut self) {
        self.inbound = None;
        if let Err(e) = self.sink.close().await {
            debug!(address = %self.address, error = %e, "close after stop failed");
        }
    }
}

/// Reads frames until EOF, error or cancellation and posts them to the mailbox.
pub(crate) async fn read_frames(
    mut stream: FrameStream,
    mailbox: Actor<Dispatch>,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            next = stream.next() => next,
        };
        let msg = match next {
            Some(Ok(frame)) => Dispatch::Inbound(frame.freeze()),
            Some(Err(e)) => Dispatch::RemoteClosed(Some(e.to_string())),
            None => Dispatch::RemoteClosed(None),
        };
        let last = matches!(msg, Dispatch::RemoteClosed(_));
        if mailbox.send(msg).is_err() || last {
            return;
        }
    }
}

/// Logical connection to one worker endpoint.
///
/// Sends never wait; delivery to the worker happens in send order. After
/// [`stop`](Self::stop) (or a remote close) sends fail with
/// [`ChannelError::Stopped`] and [`recv`](Self::recv) drains what already
/// arrived, then returns `None`.
pub struct ActorChannel {
    endpoint: WorkerEndpoint,
    actor: Actor<Dispatch>,
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl ActorChannel {
    pub(crate) fn new(
        endpoint: WorkerEndpoint,
        actor: Actor<Dispatch>,
        inbound: mpsc::UnboundedReceiver<Bytes>,
    ) -> Self {
        Self {
            endpoint,
            actor,
            inbound: Mutex::new(inbound),
        }
    }

    /// Enqueues one outbound frame.
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<(), ChannelError> {
        self.actor.send(Dispatch::Outbound(payload.into()))
    }

    /// Next inbound frame, or `None` once the channel stopped and the queue is empty.
    pub async fn recv(&self) -> Option<Bytes> {
        self.inbound.lock().await.recv().await
    }

    /// Stops the channel. Returns `true` if this call performed the stop.
    pub fn stop(&self) -> bool {
        self.actor.stop()
    }

    /// True once stopped locally or by the remote side.
    pub fn is_stopped(&self) -> bool {
        self.actor.is_stopped()
    }

    /// Endpoint this channel is bound to.
    pub fn endpoint(&self) -> &WorkerEndpoint {
        &self.endpoint
    }
}

impl fmt::Debug for ActorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorChannel")
            .field("endpoint", &self.endpoint.address.to_string())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
