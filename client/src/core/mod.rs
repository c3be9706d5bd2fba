//! Deterministic, pure logic shared by the farm client.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod budget;
pub mod flags;
pub mod partition;
pub mod types;
