//! # Single-consumer mailbox.
//!
//! An [`Actor`] owns an unbounded FIFO mailbox drained by one dispatch task.
//! The [`Handler`] is driven strictly sequentially: a message is handed to
//! `handle` only after the previous call returned.
//!
//! ## Flow
//! ```text
//! send(msg) ──► [mailbox] ──► dispatch loop ──► handler.handle(msg) ─► Flow::Continue
//!                                   │                                   Flow::Stop ──┐
//! stop() ──► cancel token ──────────┴──► exit at next message boundary ◄─────────────┘
//!                                              └─► handler.on_stop()
//! ```
//!
//! Pending messages are not drained after `stop()`; later sends fail with
//! [`ChannelError::Stopped`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;

/// Outcome of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep processing the mailbox.
    Continue,
    /// Stop the actor after this message.
    Stop,
}

/// Message processor driven by an [`Actor`].
#[async_trait]
pub trait Handler: Send + 'static {
    /// Mailbox item type.
    type Message: Send + 'static;

    /// Handles one message. Never called concurrently with itself.
    async fn handle(&mut self, msg: Self::Message) -> Flow;

    /// Called once after the dispatch loop exits.
    async fn on_stop(&mut self) {}
}

/// Shared lifecycle flags of one actor.
#[derive(Clone)]
pub(crate) struct ActorControl {
    pub(crate) name: Arc<str>,
    pub(crate) token: CancellationToken,
    stopped: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl ActorControl {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            token: CancellationToken::new(),
            stopped: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Marks the actor stopped; returns `true` on the first call.
    pub(crate) fn stop(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        self.token.cancel();
        first
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// True once `on_stop` returned.
    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Handle to a running actor. Clones share the same mailbox.
pub struct Actor<M> {
    tx: mpsc::UnboundedSender<M>,
    control: ActorControl,
}

impl<M> Clone for Actor<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            control: self.control.clone(),
        }
    }
}

impl<M: Send + 'static> Actor<M> {
    /// Enqueues a message without waiting.
    pub fn send(&self, msg: M) -> Result<(), ChannelError> {
        if self.control.is_stopped() {
            return Err(self.stopped_error());
        }
        self.tx.send(msg).map_err(|_| self.stopped_error())
    }

    /// Stops the actor. Returns `true` if this call performed the stop.
    pub fn stop(&self) -> bool {
        self.control.stop()
    }

    /// True once the actor stopped (explicitly or by its handler).
    pub fn is_stopped(&self) -> bool {
        self.control.is_stopped()
    }

    /// Actor name.
    pub fn name(&self) -> &str {
        &self.control.name
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.control.token.clone()
    }

    fn stopped_error(&self) -> ChannelError {
        ChannelError::Stopped {
            channel: self.control.name.to_string(),
        }
    }
}

/// Builds the mailbox and the dispatch future; the caller decides where it runs.
pub(crate) fn bind<H: Handler>(
    name: &str,
    handler: H,
) -> (
    Actor<H::Message>,
    ActorControl,
    impl Future<Output = ()> + Send + use<H>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let control = ActorControl::new(name);
    let actor = Actor {
        tx,
        control: control.clone(),
    };
    let run = dispatch(handler, rx, control.clone());
    (actor, control, run)
}

async fn dispatch<H: Handler>(
    mut handler: H,
    mut rx: mpsc::UnboundedReceiver<H::Message>,
    control: ActorControl,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = control.token.cancelled() => break,
            msg = rx.recv() => msg,
        };
        let Some(msg) = msg else { break };
        if handler.handle(msg).await == Flow::Stop {
            break;
        }
    }

    control.stop();
    rx.close();
    handler.on_stop().await;
    control.finished.store(true, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collect {
        seen: Vec<u32>,
        out: Option<tokio::sync::oneshot::Sender<Vec<u32>>>,
    }

    #[async_trait]
    impl Handler for Collect {
        type Message = u32;

        async fn handle(&mut self, msg: u32) -> Flow {
            self.seen.push(msg);
            if msg == u32::MAX { Flow::Stop } else { Flow::Continue }
        }

        async fn on_stop(&mut self) {
            if let Some(out) = self.out.take() {
                let _ = out.send(std::mem::take(&mut self.seen));
            }
        }
    }

    #[tokio::test]
    async fn handler_sees_messages_in_order_and_can_stop_itself() {
        let (out, seen) = tokio::sync::oneshot::channel();
        let (actor, control, run) = bind("collect", Collect { seen: Vec::new(), out: Some(out) });
        let task = tokio::spawn(run);

        for i in 0..100 {
            actor.send(i).unwrap();
        }
        actor.send(u32::MAX).unwrap();

        let seen = seen.await.unwrap();
        assert_eq!(seen.len(), 101);
        assert!(seen[..100].iter().copied().eq(0..100));
        task.await.unwrap();

        assert!(control.is_finished());
        assert!(actor.is_stopped());
        assert_eq!(
            actor.send(1),
            Err(ChannelError::Stopped { channel: "collect".into() })
        );
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (out, _seen) = tokio::sync::oneshot::channel();
        let (actor, control, run) = bind("idle", Collect { seen: Vec::new(), out: Some(out) });
        let task = tokio::spawn(run);

        assert!(actor.stop());
        assert!(!actor.stop());
        task.await.unwrap();
        assert!(control.is_finished());
        assert!(actor.send(3).is_err());
    }
}
