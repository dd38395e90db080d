//! Transport primitives for the collector connection.

use std::{
    fs,
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

use native_tls::{Certificate, TlsConnector, TlsStream};

/// Collector address with optional TLS settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address to connect to.
    pub host: String,
    /// TCP port number.
    pub port: u16,
    /// TLS configuration, when the connection must be encrypted.
    pub tls: Option<TlsOptions>,
}

impl Endpoint {
    /// Plain TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: None,
        }
    }

    fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|iter| iter.collect())
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// TLS connection options.
///
/// The peer is always verified: only the CA in `ca_file` is trusted and the
/// certificate must be issued for `domain`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsOptions {
    /// Domain name presented and verified during the handshake.
    pub domain: String,
    /// PEM encoded CA certificate trusted for the collector.
    pub ca_file: PathBuf,
}

impl TlsOptions {
    fn connector(&self) -> io::Result<TlsConnector> {
        let pem = fs::read(&self.ca_file)?;
        let ca = Certificate::from_pem(&pem).map_err(io::Error::other)?;
        TlsConnector::builder()
            .disable_built_in_roots(true)
            .add_root_certificate(ca)
            .build()
            .map_err(io::Error::other)
    }
}

/// Open collector connection.
pub enum ActiveConnection {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ActiveConnection {
    fn tcp(&self) -> &TcpStream {
        match self {
            ActiveConnection::PlainTcp(stream) => stream,
            ActiveConnection::Tls(stream) => stream.get_ref(),
        }
    }

    /// Update the write timeout for the underlying socket.
    pub fn set_write_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.tcp().set_write_timeout(Some(timeout))
    }

    /// Close the connection, sending a TLS close_notify first when encrypted.
    pub fn shutdown(&mut self) -> io::Result<()> {
        self.flush()?;
        match self {
            ActiveConnection::PlainTcp(stream) => stream.shutdown(Shutdown::Both),
            ActiveConnection::Tls(stream) => {
                stream.shutdown()?;
                stream.get_ref().shutdown(Shutdown::Both)
            }
        }
    }
}

impl Write for ActiveConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.write(buf),
            ActiveConnection::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.flush(),
            ActiveConnection::Tls(stream) => stream.flush(),
        }
    }
}

impl std::fmt::Debug for ActiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ActiveConnection::PlainTcp(_) => "tcp",
            ActiveConnection::Tls(_) => "tls",
        };
        f.debug_struct("ActiveConnection")
            .field("kind", &kind)
            .field("peer", &self.tcp().peer_addr().ok())
            .finish()
    }
}

/// Connect to the first reachable resolved address.
///
/// The error of the last failed address is returned unchanged so callers can
/// tell a refused connection from a timeout.
fn connect_tcp(endpoint: &Endpoint, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in endpoint.socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{endpoint} did not resolve to any address"),
        )
    }))
}

/// Establish a collector connection.
///
/// The CA file is read before any network I/O, so a bad TLS configuration
/// fails without touching the collector.
pub fn connect_endpoint(
    endpoint: &Endpoint,
    connect_timeout: Duration,
) -> io::Result<ActiveConnection> {
    let Some(tls) = &endpoint.tls else {
        return connect_tcp(endpoint, connect_timeout).map(ActiveConnection::PlainTcp);
    };
    let connector = tls.connector()?;
    let stream = connect_tcp(endpoint, connect_timeout)?;
    stream.set_read_timeout(Some(connect_timeout))?;
    stream.set_write_timeout(Some(connect_timeout))?;
    let stream = connector
        .connect(&tls.domain, stream)
        .map_err(io::Error::other)?;
    stream.get_ref().set_read_timeout(None)?;
    Ok(ActiveConnection::Tls(Box::new(stream)))
}
