use bytes::Bytes;

use crate::actor::ActorChannel;
use crate::error::ChannelError;
use crate::registry::WorkerEndpoint;

/// A live connection to a worker, returned by
/// [`ConnectionManager::connect`](crate::ConnectionManager::connect).
///
/// Dropping the connection stops its channel.
#[derive(Debug)]
pub struct Connection {
    channel: ActorChannel,
}

impl Connection {
    pub(crate) fn new(channel: ActorChannel) -> Self {
        Self { channel }
    }

    /// Enqueues one frame for the worker. Never waits.
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<(), ChannelError> {
        self.channel.send(payload)
    }

    /// Next frame from the worker, `None` once the connection is closed and drained.
    pub async fn recv(&self) -> Option<Bytes> {
        self.channel.recv().await
    }

    /// Closes the connection. Idempotent.
    pub fn close(&self) {
        self.channel.stop();
    }

    /// True once closed locally, by the worker, or by manager teardown.
    pub fn is_closed(&self) -> bool {
        self.channel.is_stopped()
    }

    /// Endpoint this connection is bound to.
    pub fn endpoint(&self) -> &WorkerEndpoint {
        self.channel.endpoint()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.channel.stop();
    }
}
