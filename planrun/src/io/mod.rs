//! I/O adapters: filesystem actions, subprocesses, snapshots, the plan
//! generator, and configuration.

pub mod actions;
pub mod config;
pub mod generator;
pub mod history;
pub mod init;
pub mod listing;
pub mod process;
pub mod prompt;
pub mod snapshot;
