//! Sandboxed plan execution engine.
//!
//! A plan is a goal, a root directory and an ordered list of declarative
//! steps (`mkdir`, `write`, `append`, `edit`, `shell`, `install`). Plans come
//! from an external generator as untrusted text and are executed under
//! explicit safety gates, with content snapshots for undo and a bounded
//! repair loop that feeds failures back to the generator. The architecture
//! keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan coercion, sandbox
//!   resolution, hashing, reports). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem actions, subprocesses,
//!   snapshots, configuration, the generator backend).
//!
//! Orchestration modules ([`execute`], [`repair`], [`session`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod repair;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
