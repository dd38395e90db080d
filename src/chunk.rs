//! MessagePack chunk codec.
//!
//! Hosts buffer each record as a two element MessagePack array
//! `[tag, record]` and hand over the concatenation of those entries as a
//! chunk. Map keys must be strings.

use std::io::Cursor;

use rmp_serde::Serializer;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::record::{Batch, LogRecord};

/// Failures while encoding or decoding chunk entries.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("failed to encode chunk entry: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode chunk entry at byte {offset}: {source}")]
    Decode {
        offset: u64,
        source: rmp_serde::decode::Error,
    },
}

/// Encode one `[tag, record]` entry.
pub fn encode_entry(tag: &str, record: &Value) -> Result<Vec<u8>, ChunkError> {
    let mut buf = Vec::with_capacity(64);
    (tag, record).serialize(&mut Serializer::new(&mut buf))?;
    Ok(buf)
}

/// Decode every entry in `chunk`, preserving order.
pub fn decode_chunk(chunk: &[u8]) -> Result<Batch, ChunkError> {
    let mut cursor = Cursor::new(chunk);
    let mut batch = Batch::new();
    while cursor.position() < chunk.len() as u64 {
        let offset = cursor.position();
        let (tag, body): (String, Value) = rmp_serde::from_read(&mut cursor)
            .map_err(|source| ChunkError::Decode { offset, source })?;
        batch.push(LogRecord::new(tag, body));
    }
    Ok(batch)
}
