//! # machina-exec
//!
//! Execution policies for the machina runtime.
//!
//! This crate provides:
//! - [`SyncExecutor`]: the caller drives the machine one `step` at a time;
//!   no threads, no blocking
//! - [`AsyncExecutor`]: one dedicated worker thread per root machine,
//!   blocked on the event queue, with an optional observer hook
//! - [`WorkerConfig`]: worker tunables with YAML file and environment
//!   overrides

pub mod config;
pub mod error;
pub mod sync;
pub mod worker;

pub use config::{ConfigError, WorkerConfig};
pub use error::ExecError;
pub use sync::{Step, SyncExecutor};
pub use worker::AsyncExecutor;
