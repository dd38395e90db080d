//! Ownership of the single long-lived collector connection.

use std::{
    io::{self, Write},
    time::Duration,
};

use log::debug;

use super::transport::{ActiveConnection, Endpoint, connect_endpoint};

/// Opens streams to the collector.
///
/// [`TcpConnector`] is the production implementation; the trait exists so
/// the retry logic can be driven against scripted failures.
pub trait Connect: Send {
    type Stream: Write + Send;

    /// Open a new stream.
    fn connect(&self) -> io::Result<Self::Stream>;

    /// Human readable description of the destination, used in diagnostics.
    fn destination(&self) -> String;

    /// Gracefully close a stream that is no longer needed.
    fn disconnect(&self, mut stream: Self::Stream) -> io::Result<()> {
        stream.flush()
    }
}

/// Connects to an [`Endpoint`] over TCP, optionally wrapped in TLS.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    endpoint: Endpoint,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl TcpConnector {
    pub fn new(endpoint: Endpoint, connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            write_timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Connect for TcpConnector {
    type Stream = ActiveConnection;

    fn connect(&self) -> io::Result<ActiveConnection> {
        let stream = connect_endpoint(&self.endpoint, self.connect_timeout)?;
        stream.set_write_timeout(self.write_timeout)?;
        Ok(stream)
    }

    fn destination(&self) -> String {
        self.endpoint.to_string()
    }

    fn disconnect(&self, mut stream: ActiveConnection) -> io::Result<()> {
        stream.shutdown()
    }
}

/// Lazily opened, reusable connection.
///
/// The stream is created on the first call to
/// [`connection`](ConnectionManager::connection) and handed out again on
/// every later call until [`reset`](ConnectionManager::reset) discards it.
pub struct ConnectionManager<C: Connect = TcpConnector> {
    connector: C,
    stream: Option<C::Stream>,
    connects: u64,
    resets: u64,
}

impl<C: Connect> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            stream: None,
            connects: 0,
            resets: 0,
        }
    }

    /// Return the open stream, connecting first if there is none.
    pub fn connection(&mut self) -> io::Result<&mut C::Stream> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                debug!("connecting to {}", self.connector.destination());
                let stream = self.connector.connect()?;
                self.connects += 1;
                stream
            }
        };
        Ok(self.stream.insert(stream))
    }

    /// Drop the current stream without closing it gracefully.
    pub fn reset(&mut self) {
        self.resets += 1;
        self.stream = None;
    }

    /// Flush and close the current stream, if any.
    pub fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(stream) => self.connector.disconnect(stream),
            None => Ok(()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Number of streams successfully opened so far.
    pub fn connect_count(&self) -> u64 {
        self.connects
    }

    /// Number of times [`reset`](Self::reset) has been called.
    pub fn reset_count(&self) -> u64 {
        self.resets
    }

    pub fn destination(&self) -> String {
        self.connector.destination()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

impl<C: Connect> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("destination", &self.connector.destination())
            .field("connected", &self.stream.is_some())
            .field("connects", &self.connects)
            .field("resets", &self.resets)
            .finish()
    }
}
