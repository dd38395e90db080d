//! Token-routing log forwarder.
//!
//! Batches of tagged records are matched against a directory of `*.token`
//! credential files and each record's `message` is written, followed by the
//! matching token, as one line over a persistent TCP or TLS connection to a
//! log collector. Connection-level failures are retried with exponential
//! backoff before the batch is failed back to the host.

pub mod chunk;
pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod file_config;
pub mod forwarder;
pub mod record;
pub mod tokens;
pub mod worker;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use chunk::{ChunkError, decode_chunk, encode_entry};
pub use config::{ConfigError, ForwarderBuilder, ForwarderConfig, RetryPolicy};
pub use delivery::{
    Connect, ConnectionManager, DeliveryAttempt, DeliveryEngine, Endpoint, Sleep, TcpConnector,
    ThreadSleep, TlsOptions,
};
pub use dispatcher::{BatchDispatcher, DeliveryReport};
pub use error::{DeliveryFailure, ForwardError, SendError};
pub use file_config::load_config_file;
pub use forwarder::Forwarder;
pub use record::{Batch, LogRecord, format_line};
pub use tokens::{TokenError, TokenMap, load_tokens};
pub use worker::{DeliveryWorker, WorkerError};
