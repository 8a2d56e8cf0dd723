#![forbid(unsafe_code)]

//! Transport factory seam.
//!
//! The pool establishes sockets through a [`Connect`] implementation. The
//! default is [`TlsConnector`] (TCP + rustls with ALPN verification);
//! callers supply their own to tunnel through proxies, and the test suite
//! injects a plain-TCP connector in front of a local mock server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Object-safe alias for the byte stream a connector produces.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Boxed transport stream handed to the HTTP/2 layer.
pub type IoStream = Box<dyn Io>;

/// Factory for the byte stream underlying one connection.
#[async_trait]
pub trait Connect: Send + Sync {
    /// Establish a fresh transport stream to the configured peer.
    async fn connect(&self) -> io::Result<IoStream>;
}

/// TCP + TLS connector; verifies that ALPN negotiated `h2`.
pub struct TlsConnector {
    config: Arc<rustls::ClientConfig>,
    host: String,
    port: u16,
}

impl TlsConnector {
    /// Connector for `host:port` using the given rustls config.
    pub fn new(config: Arc<rustls::ClientConfig>, host: impl Into<String>, port: u16) -> Self {
        Self {
            config,
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Connect for TlsConnector {
    async fn connect(&self) -> io::Result<IoStream> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tcp.set_nodelay(true)?;

        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let connector = tokio_rustls::TlsConnector::from(Arc::clone(&self.config));
        let stream = connector.connect(server_name, tcp).await?;

        match stream.get_ref().1.alpn_protocol() {
            Some(proto) if proto == b"h2" => Ok(Box::new(stream)),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("peer did not negotiate h2 (got {other:?})"),
            )),
        }
    }
}

/// Plain TCP connector for local mock servers.
pub struct PlainConnector {
    addr: SocketAddr,
}

impl PlainConnector {
    /// Connector for a fixed socket address, no TLS.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl Connect for PlainConnector {
    async fn connect(&self) -> io::Result<IoStream> {
        let tcp = TcpStream::connect(self.addr).await?;
        tcp.set_nodelay(true)?;
        Ok(Box::new(tcp))
    }
}
