//! Resilient delivery of lines to the collector.
//!
//! [`ConnectionManager`] owns one lazily opened stream (plain TCP or TLS)
//! that is reused across records and batches. [`DeliveryEngine`] writes each
//! line through it; when the connection is refused, times out or breaks, the
//! stream is discarded and the write is retried with exponential backoff
//! until the retry ceiling is reached.

mod backoff;
mod connection;
mod engine;
mod transport;

#[cfg(test)]
mod tests;

pub use backoff::{DeliveryAttempt, Sleep, ThreadSleep};
pub use connection::{Connect, ConnectionManager, TcpConnector};
pub use engine::{DeliveryEngine, LINE_TERMINATOR, is_retryable};
pub use transport::{ActiveConnection, Endpoint, TlsOptions, connect_endpoint};
