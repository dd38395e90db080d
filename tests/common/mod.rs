//! Helpers shared by the integration tests.
#![allow(dead_code)]

pub mod collector;
pub mod fixtures;

pub use collector::LineCollector;
pub use fixtures::token_dir;
