//! Iterative requirements-document synthesis for a source repository.
//!
//! A run seeds evidence from the repository, asks an oracle for a draft
//! document, has the oracle judge it, and gathers more evidence through a
//! closed set of read-only capabilities until the document is judged complete
//! or the iteration ceiling is hit. The layout keeps a strict separation:
//!
//! - **[`core`]**: pure logic (run state, phase machine, convergence policy,
//!   verdict parsing, evidence and report rendering).
//! - **[`io`]**: side effects (config, oracle backends, prompts, seed
//!   collection, persistence).
//! - **[`capabilities`]**: the registry of inspection capabilities.
//!
//! [`steps`] wraps one oracle interaction each; [`engine`] owns the run state
//! and drives the phase machine.

pub mod capabilities;
pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod steps;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
