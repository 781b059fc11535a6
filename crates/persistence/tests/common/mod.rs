//! Test infrastructure for the persistence layer.
//!
//! Every test runs against a fresh [`InMemoryEngine`](grafeas_persistence::engine::InMemoryEngine)
//! so that engine state and injected failures never leak between tests.

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
