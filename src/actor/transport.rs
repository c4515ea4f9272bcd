//! # Framed transports.
//!
//! A [`Transport`] is a pair of boxed halves carrying length-delimited frames
//! of opaque bytes. [`Connector`] turns an [`EndpointAddress`] into one;
//! [`FramedConnector`] does it over TCP and Unix sockets.

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Sink, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::registry::EndpointAddress;

/// Outbound half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = io::Error> + Send>>;
/// Inbound half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = io::Result<BytesMut>> + Send>>;

/// Established, framed connection to a worker.
pub struct Transport {
    /// Outbound frames.
    pub sink: FrameSink,
    /// Inbound frames.
    pub stream: FrameStream,
}

impl Transport {
    /// Wraps a byte stream with [`LengthDelimitedCodec`] framing.
    pub fn framed<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = Framed::new(io, LengthDelimitedCodec::new()).split();
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Opens transports to worker endpoints.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects to `address`.
    ///
    /// Return an error of kind [`io::ErrorKind::Unsupported`] for address
    /// kinds this connector cannot reach.
    async fn connect(&self, address: &EndpointAddress) -> io::Result<Transport>;
}

/// TCP and Unix socket connector.
#[derive(Clone, Copy, Debug, Default)]
pub struct FramedConnector;

#[async_trait]
impl Connector for FramedConnector {
    async fn connect(&self, address: &EndpointAddress) -> io::Result<Transport> {
        match address {
            EndpointAddress::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                stream.set_nodelay(true)?;
                Ok(Transport::framed(stream))
            }
            EndpointAddress::Unix(path) => Ok(Transport::framed(UnixStream::connect(path).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_frames_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = EndpointAddress::Tcp(listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(sock, LengthDelimitedCodec::new());
            let frame = framed.next().await.unwrap().unwrap();
            framed.send(frame.freeze()).await.unwrap();
        });

        let mut t = FramedConnector.connect(&addr).await.unwrap();
        t.sink.send(Bytes::from_static(b"ping")).await.unwrap();
        let echoed = t.stream.next().await.unwrap().unwrap();
        assert_eq!(&echoed[..], b"ping");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_an_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = EndpointAddress::Tcp(listener.local_addr().unwrap());
        drop(listener);

        assert!(FramedConnector.connect(&addr).await.is_err());
    }
}
