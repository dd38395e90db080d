//! Line delivery with bounded retries.

use std::io::{self, Write};

use log::{error, warn};

use crate::{
    config::RetryPolicy,
    error::{DeliveryFailure, SendError},
};

use super::{
    backoff::{DeliveryAttempt, Sleep, ThreadSleep},
    connection::{Connect, ConnectionManager, TcpConnector},
};

/// Record separator appended to every line.
pub const LINE_TERMINATOR: &[u8] = b"\n";

/// Whether `err` indicates a broken or unreachable connection.
///
/// Only these failures reset the connection and are retried; anything else is
/// returned to the caller on first occurrence.
pub fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

/// Writes lines to the collector, reconnecting and backing off on failure.
pub struct DeliveryEngine<C: Connect = TcpConnector, S: Sleep = ThreadSleep> {
    connections: ConnectionManager<C>,
    policy: RetryPolicy,
    sleeper: S,
}

impl<C: Connect> DeliveryEngine<C, ThreadSleep> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self::with_sleeper(connector, policy, ThreadSleep)
    }
}

impl<C: Connect, S: Sleep> DeliveryEngine<C, S> {
    /// Build an engine that waits between attempts using `sleeper`.
    pub fn with_sleeper(connector: C, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            connections: ConnectionManager::new(connector),
            policy,
            sleeper,
        }
    }

    /// Write `line` followed by [`LINE_TERMINATOR`].
    ///
    /// Connection-level failures discard the stream and are retried after
    /// `base * 2^retry`. Once the policy's retry ceiling is exceeded the last
    /// error is returned as [`SendError::Exhausted`]. Other errors are
    /// returned immediately as [`SendError::Transport`].
    pub fn send(&mut self, line: &str) -> Result<(), SendError> {
        let mut attempt = DeliveryAttempt::new(self.policy);
        loop {
            let err = match self.write_line(line) {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            if !is_retryable(&err) {
                return Err(SendError::Transport {
                    destination: self.connections.destination(),
                    source: err,
                });
            }
            let Some(delay) = attempt.next_delay() else {
                let failure = DeliveryFailure {
                    destination: self.connections.destination(),
                    retries: attempt.retries(),
                    source: err,
                };
                error!("{failure}");
                return Err(failure.into());
            };
            self.connections.reset();
            warn!(
                "could not push logs to {}, retrying in {delay:?} ({}/{}): {err}",
                self.connections.destination(),
                attempt.retries(),
                self.policy.max_retries,
            );
            self.sleeper.sleep(delay);
        }
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + LINE_TERMINATOR.len());
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(LINE_TERMINATOR);
        let stream = self.connections.connection()?;
        stream.write_all(&buf)?;
        stream.flush()
    }

    /// Close the connection gracefully.
    pub fn close(&mut self) -> io::Result<()> {
        self.connections.close()
    }

    pub fn connections(&self) -> &ConnectionManager<C> {
        &self.connections
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }
}

impl<C: Connect, S: Sleep> std::fmt::Debug for DeliveryEngine<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("connections", &self.connections)
            .field("policy", &self.policy)
            .finish()
    }
}
