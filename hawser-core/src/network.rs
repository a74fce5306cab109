//! Pluggable networking behind a provider trait.
//!
//! Endpoints never touch `tokio::net` directly; they go through
//! [`NetworkProvider`] so tests can substitute a failing or scripted
//! transport without opening sockets. [`TokioNetwork`] is the real
//! implementation used in production.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Factory for outbound connections and listening sockets.
///
/// Single-threaded design, so no `Send` bounds; `Clone` lets one provider be
/// shared by every connection task an endpoint spawns.
#[async_trait(?Send)]
pub trait NetworkProvider: Clone {
    /// Byte-stream type produced by this provider.
    type Stream: AsyncRead + AsyncWrite + Unpin + 'static;
    /// Listener type produced by [`NetworkProvider::bind`].
    type Listener: NetworkListener<Stream = Self::Stream> + 'static;

    /// Bind a listening socket. `addr` uses `host:port` syntax; port 0 asks
    /// the OS for an ephemeral port, readable afterwards via
    /// [`NetworkListener::local_addr`].
    async fn bind(&self, addr: &str) -> io::Result<Self::Listener>;

    /// Open an outbound connection to `addr`.
    async fn connect(&self, addr: &str) -> io::Result<Self::Stream>;
}

/// A bound listening socket.
#[async_trait(?Send)]
pub trait NetworkListener {
    /// Byte-stream type produced by [`NetworkListener::accept`].
    type Stream: AsyncRead + AsyncWrite + Unpin + 'static;

    /// Wait for the next inbound connection.
    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;

    /// The address this listener is actually bound to, including the real
    /// port when the bind requested port 0.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Real TCP networking via tokio.
#[derive(Debug, Clone, Default)]
pub struct TokioNetwork;

impl TokioNetwork {
    /// Create a tokio-backed network provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl NetworkProvider for TokioNetwork {
    type Stream = tokio::net::TcpStream;
    type Listener = TokioTcpListener;

    async fn bind(&self, addr: &str) -> io::Result<Self::Listener> {
        let inner = tokio::net::TcpListener::bind(addr).await?;
        Ok(TokioTcpListener { inner })
    }

    async fn connect(&self, addr: &str) -> io::Result<Self::Stream> {
        tokio::net::TcpStream::connect(addr).await
    }
}

/// [`NetworkListener`] over a real `tokio::net::TcpListener`.
#[derive(Debug)]
pub struct TokioTcpListener {
    inner: tokio::net::TcpListener,
}

#[async_trait(?Send)]
impl NetworkListener for TokioTcpListener {
    type Stream = tokio::net::TcpStream;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        self.inner.accept().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bind_port_zero_reports_real_port() {
        let network = TokioNetwork::new();
        let listener = network.bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_connect_and_accept_roundtrip() {
        let network = TokioNetwork::new();
        let listener = network.bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let mut client = network
            .connect(&addr.to_string())
            .await
            .expect("connect");
        let (mut server, peer_addr) = listener.accept().await.expect("accept");
        assert_eq!(peer_addr.ip(), addr.ip());

        client.write_all(b"ahoy").await.expect("write");
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.expect("read");
        assert_eq!(&buf, b"ahoy");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let network = TokioNetwork::new();
        // Bind then drop to get a port that is very likely closed.
        let port = {
            let listener = network.bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("local addr").port()
        };
        let result = network.connect(&format!("127.0.0.1:{port}")).await;
        assert!(result.is_err());
    }
}
