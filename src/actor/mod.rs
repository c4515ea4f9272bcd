//! # Actors and endpoint channels.
//!
//! - [`Actor`] / [`Handler`] an unbounded mailbox with one sequential consumer
//! - [`ActorChannel`] an actor bound to a framed [`Transport`]
//! - [`ActorFactory`] creates both on the executor's `actors` pool and stops them on teardown
//! - [`Connector`] / [`FramedConnector`] how transports are opened

#[allow(clippy::module_inception)]
mod actor;
mod channel;
mod factory;
mod transport;

pub use actor::{Actor, Flow, Handler};
pub use channel::ActorChannel;
pub use factory::ActorFactory;
pub use transport::{Connector, FrameSink, FrameStream, FramedConnector, Transport};
