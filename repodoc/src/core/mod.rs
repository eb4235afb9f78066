//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod evidence;
pub mod machine;
pub mod policy;
pub mod report;
pub mod state;
pub mod verdict;
