//! Token discovery and tag resolution.
//!
//! Credentials live in a directory of `*.token` files. The file stem is the
//! key that gets matched against record tags and the first line of the file
//! is the token itself. The directory is rescanned for every batch so that
//! tokens can be added or rotated without restarting the forwarder.

mod directory;
mod map;


use std::{io, path::PathBuf};

use thiserror::Error;

pub use directory::{TOKEN_SUFFIX, load_tokens, read_token};
pub use map::TokenMap;

/// Errors raised while building a [`TokenMap`] from disk.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token directory itself could not be listed.
    #[error("failed to read token directory {}: {source}", .path.display())]
    Directory { path: PathBuf, source: io::Error },
    /// A `*.token` file was found but could not be read.
    #[error("failed to read token file {}: {source}", .path.display())]
    File { path: PathBuf, source: io::Error },
}
