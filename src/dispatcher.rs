//! Batch dispatch: token lookup and line delivery for each record.

use std::path::{Path, PathBuf};

use log::debug;

use crate::{
    delivery::{Connect, DeliveryEngine, Sleep, TcpConnector, ThreadSleep},
    error::ForwardError,
    record::{LogRecord, format_line},
    tokens::load_tokens,
};

/// Outcome of a successfully processed batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Lines written to the collector.
    pub sent: usize,
    /// Records whose tag matched no token key.
    pub unresolved: usize,
    /// Records that were not a mapping or had no `message` field.
    pub malformed: usize,
}

impl DeliveryReport {
    /// Records that were dropped without an error.
    pub fn skipped(&self) -> usize {
        self.unresolved + self.malformed
    }
}

/// Drives a [`DeliveryEngine`] over the records of a batch.
pub struct BatchDispatcher<C: Connect = TcpConnector, S: Sleep = ThreadSleep> {
    token_dir: PathBuf,
    engine: DeliveryEngine<C, S>,
}

impl<C: Connect, S: Sleep> BatchDispatcher<C, S> {
    pub fn new(token_dir: impl Into<PathBuf>, engine: DeliveryEngine<C, S>) -> Self {
        Self {
            token_dir: token_dir.into(),
            engine,
        }
    }

    /// Deliver `batch` in order.
    ///
    /// The token directory is rescanned once per call. Records that are not
    /// mappings, whose tag matches no token, or that lack a `message` field
    /// are skipped. The first delivery error aborts the rest of the batch.
    pub fn deliver(&mut self, batch: &[LogRecord]) -> Result<DeliveryReport, ForwardError> {
        let tokens = load_tokens(&self.token_dir)?;
        let mut report = DeliveryReport::default();
        for record in batch {
            if !record.is_mapping() {
                debug!("skipping record tagged {:?}: body is not a mapping", record.tag);
                report.malformed += 1;
                continue;
            }
            let Some(token) = tokens.resolve(&record.tag) else {
                debug!("skipping record tagged {:?}: no matching token", record.tag);
                report.unresolved += 1;
                continue;
            };
            let Some(message) = record.message() else {
                debug!("skipping record tagged {:?}: no message field", record.tag);
                report.malformed += 1;
                continue;
            };
            self.engine.send(&format_line(&message, token))?;
            report.sent += 1;
        }
        Ok(report)
    }

    pub fn token_dir(&self) -> &Path {
        &self.token_dir
    }

    pub fn engine(&self) -> &DeliveryEngine<C, S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DeliveryEngine<C, S> {
        &mut self.engine
    }
}
