//! Queue error types.

use thiserror::Error;

/// Errors from the event queue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was stopped while a consumer was waiting on it. The queue
    /// keeps signalling this from `next` until `reset` is called.
    #[error("event queue interrupted")]
    Interrupted,
}
