//! Test-only helpers shared across unit and integration tests.
//!
//! Compiled for unit tests and behind the `test-util` feature, which the
//! crate enables on itself as a dev-dependency.

mod scripted;

pub use scripted::{RecordingSleep, ScriptedConnector, ScriptedStream};
