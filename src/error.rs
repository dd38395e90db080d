//! Error types surfaced to the host.

use std::io;

use thiserror::Error;

use crate::{chunk::ChunkError, tokens::TokenError};

/// A line could not be delivered after every retry was spent.
#[derive(Debug, Error)]
#[error("could not push logs to {destination} after {retries} retries: {source}")]
pub struct DeliveryFailure {
    /// Collector the line was destined for.
    pub destination: String,
    /// Retries performed before giving up.
    pub retries: u32,
    /// Transport error of the last attempt.
    pub source: io::Error,
}

/// Failure of a single [`send`](crate::DeliveryEngine::send).
#[derive(Debug, Error)]
pub enum SendError {
    /// Retryable failures persisted past the retry ceiling.
    #[error(transparent)]
    Exhausted(#[from] DeliveryFailure),
    /// A failure that is not worth retrying, returned on first occurrence.
    #[error("transport error while writing to {destination}: {source}")]
    Transport {
        destination: String,
        source: io::Error,
    },
}

/// Errors that abort delivery of a batch.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The token directory or one of its files could not be read.
    #[error(transparent)]
    Tokens(#[from] TokenError),
    /// A record could not be delivered after every retry.
    #[error(transparent)]
    Delivery(DeliveryFailure),
    /// A record hit a transport error that is not retried.
    #[error("transport error while writing to {destination}: {source}")]
    Transport {
        destination: String,
        source: io::Error,
    },
    /// The host chunk could not be decoded.
    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

impl From<SendError> for ForwardError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Exhausted(failure) => ForwardError::Delivery(failure),
            SendError::Transport {
                destination,
                source,
            } => ForwardError::Transport {
                destination,
                source,
            },
        }
    }
}

impl From<DeliveryFailure> for ForwardError {
    fn from(failure: DeliveryFailure) -> Self {
        ForwardError::Delivery(failure)
    }
}
