//! Background thread running deliveries off the caller's thread.
//!
//! Hosts that must not block on network I/O submit batches through a
//! [`DeliveryWorker`]. Batches are processed one at a time in submission
//! order; each submission returns a receiver for that batch's outcome.

use std::{thread, time::Duration};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use log::warn;
use thiserror::Error;

use crate::{
    delivery::{Connect, Sleep},
    dispatcher::DeliveryReport,
    error::ForwardError,
    forwarder::Forwarder,
    record::Batch,
};

/// Default bounded queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
/// Default wait for the worker to acknowledge shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of one submitted batch.
pub type BatchResult = Result<DeliveryReport, ForwardError>;

/// Errors returned when a batch cannot be queued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("delivery queue is full")]
    QueueFull,
    #[error("delivery worker has been closed")]
    Closed,
}

/// Commands processed by the worker thread.
enum WorkerCommand {
    Deliver(Batch, Sender<BatchResult>),
    Flush(Sender<()>),
    Shutdown(Sender<()>),
}

/// Owns a [`Forwarder`] on a dedicated thread.
pub struct DeliveryWorker {
    tx: Option<Sender<WorkerCommand>>,
    handle: Option<thread::JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl DeliveryWorker {
    /// Move `forwarder` onto a new thread with the default queue capacity.
    pub fn spawn<C, S>(forwarder: Forwarder<C, S>) -> Self
    where
        C: Connect + 'static,
        S: Sleep + 'static,
    {
        Self::with_capacity(forwarder, DEFAULT_QUEUE_CAPACITY)
    }

    /// Move `forwarder` onto a new thread fed by a queue of `capacity` batches.
    pub fn with_capacity<C, S>(forwarder: Forwarder<C, S>, capacity: usize) -> Self
    where
        C: Connect + 'static,
        S: Sleep + 'static,
    {
        let (tx, rx) = bounded(capacity.max(1));
        let handle = thread::spawn(move || worker_loop(rx, forwarder));
        Self {
            tx: Some(tx),
            handle: Some(handle),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Bound how long [`close`](Self::close) waits for in-flight work.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Queue `batch` for delivery without blocking.
    pub fn submit(&self, batch: Batch) -> Result<Receiver<BatchResult>, WorkerError> {
        let tx = self.tx.as_ref().ok_or(WorkerError::Closed)?;
        let (reply_tx, reply_rx) = bounded(1);
        match tx.try_send(WorkerCommand::Deliver(batch, reply_tx)) {
            Ok(()) => Ok(reply_rx),
            Err(TrySendError::Full(_)) => Err(WorkerError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::Closed),
        }
    }

    /// Wait until every batch queued before this call has been processed.
    ///
    /// Returns `false` when the worker is closed or does not answer within
    /// `timeout`.
    pub fn flush(&self, timeout: Duration) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send_timeout(WorkerCommand::Flush(ack_tx), timeout).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    /// Process pending batches, close the connection and join the thread.
    ///
    /// Waits at most the shutdown timeout. A worker still busy after that is
    /// detached and finishes its queue in the background.
    pub fn close(&mut self) {
        if self.request_shutdown() {
            self.join_worker();
        } else if self.handle.take().is_some() {
            warn!(
                "DeliveryWorker: worker did not stop within {:?}; detaching",
                self.shutdown_timeout
            );
        }
    }

    /// Ask the worker to stop and wait for its acknowledgement.
    ///
    /// Returns `true` when the worker has stopped or was never running.
    fn request_shutdown(&mut self) -> bool {
        let Some(tx) = self.tx.take() else {
            return true;
        };
        let (ack_tx, ack_rx) = bounded(1);
        match tx.send_timeout(WorkerCommand::Shutdown(ack_tx), self.shutdown_timeout) {
            Ok(()) => ack_rx.recv_timeout(self.shutdown_timeout).is_ok(),
            Err(SendTimeoutError::Disconnected(_)) => true,
            Err(SendTimeoutError::Timeout(_)) => false,
        }
    }

    fn join_worker(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.join().is_err() {
            warn!("DeliveryWorker: worker thread panicked");
        }
    }
}

fn worker_loop<C: Connect, S: Sleep>(rx: Receiver<WorkerCommand>, forwarder: Forwarder<C, S>) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            WorkerCommand::Deliver(batch, reply) => {
                let result = forwarder.deliver(&batch);
                if let Err(err) = &result {
                    warn!("DeliveryWorker: batch of {} records failed: {err}", batch.len());
                }
                let _ = reply.send(result);
            }
            WorkerCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            WorkerCommand::Shutdown(ack) => {
                forwarder.shutdown();
                let _ = ack.send(());
                return;
            }
        }
    }
}

impl Drop for DeliveryWorker {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DeliveryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryWorker")
            .field("open", &self.tx.is_some())
            .finish()
    }
}
