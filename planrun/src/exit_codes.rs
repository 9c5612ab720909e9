//! Stable exit codes for planrun CLI commands.

/// Command succeeded; for runs, every step succeeded.
pub const OK: i32 = 0;
/// Invalid input, config or plan text, or the run was aborted before any step
/// (for example an untrusted workspace).
pub const INVALID: i32 = 1;
/// The run completed but at least one step failed (after any repairs).
pub const FAILED: i32 = 2;
