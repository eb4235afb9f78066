//! Stable exit codes for the `repodoc` CLI.

/// The run completed and outputs were written.
pub const OK: i32 = 0;
/// The run ended in the error state (unreadable repository, oracle or storage failure).
pub const FAILED: i32 = 1;
/// Invalid invocation or configuration; nothing was run.
pub const INVALID: i32 = 2;
