//! Public forwarder type exported by the crate.

use std::path::PathBuf;

use log::warn;
use parking_lot::Mutex;

use crate::{
    chunk::decode_chunk,
    config::{ConfigError, ForwarderConfig, RetryPolicy},
    delivery::{Connect, DeliveryEngine, Sleep, TcpConnector, ThreadSleep},
    dispatcher::{BatchDispatcher, DeliveryReport},
    error::ForwardError,
    record::LogRecord,
};

/// Forwards batches of tagged records to the collector.
///
/// Deliveries are serialised through an internal mutex: concurrent calls to
/// [`deliver`](Forwarder::deliver) wait for each other, so the shared
/// connection is never written from two threads at once.
pub struct Forwarder<C: Connect = TcpConnector, S: Sleep = ThreadSleep> {
    dispatcher: Mutex<BatchDispatcher<C, S>>,
    destination: String,
}

impl Forwarder {
    /// Build a forwarder from validated configuration.
    ///
    /// No connection is made until the first record needs sending.
    pub fn new(config: ForwarderConfig) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint()?;
        let connector = TcpConnector::new(endpoint, config.connect_timeout, config.write_timeout);
        Ok(Self::with_parts(config.path, connector, config.retry, ThreadSleep))
    }
}

impl<C: Connect, S: Sleep> Forwarder<C, S> {
    /// Assemble a forwarder from its collaborators.
    pub fn with_parts(
        token_dir: impl Into<PathBuf>,
        connector: C,
        policy: RetryPolicy,
        sleeper: S,
    ) -> Self {
        let destination = connector.destination();
        let engine = DeliveryEngine::with_sleeper(connector, policy, sleeper);
        Self {
            dispatcher: Mutex::new(BatchDispatcher::new(token_dir, engine)),
            destination,
        }
    }

    /// Deliver a decoded batch.
    pub fn deliver(&self, batch: &[LogRecord]) -> Result<DeliveryReport, ForwardError> {
        self.dispatcher.lock().deliver(batch)
    }

    /// Decode a MessagePack chunk and deliver its records.
    pub fn deliver_chunk(&self, chunk: &[u8]) -> Result<DeliveryReport, ForwardError> {
        let batch = decode_chunk(chunk)?;
        self.deliver(&batch)
    }

    /// Close the collector connection.
    ///
    /// A later delivery reconnects on demand.
    pub fn shutdown(&self) {
        if let Err(err) = self.dispatcher.lock().engine_mut().close() {
            warn!("failed to close connection to {}: {err}", self.destination);
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Whether a collector connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.dispatcher.lock().engine().connections().is_connected()
    }
}

impl<C: Connect, S: Sleep> Drop for Forwarder<C, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C: Connect, S: Sleep> std::fmt::Debug for Forwarder<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("destination", &self.destination)
            .finish()
    }
}
