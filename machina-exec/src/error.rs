//! Executor error types.

use machina_core::MachineError;
use machina_event::QueueError;
use thiserror::Error;

/// Errors from the execution policies.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("executor already started")]
    AlreadyStarted,

    #[error("executor is not running")]
    NotStarted,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
