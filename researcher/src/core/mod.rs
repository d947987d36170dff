//! Deterministic, pure logic for research requests.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod breakdown;
pub mod citations;
pub mod slug;
pub mod stage;
pub mod types;
