//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects (the sandbox only folds path
//! components lexically). They operate on in-memory data and return
//! deterministic outputs suitable for tests.

pub mod errors;
pub mod hash;
pub mod plan;
pub mod report;
pub mod sandbox;
