//! Core error types.

use machina_event::EventId;
use thiserror::Error;

/// Failure raised by user hooks and actions. The runtime treats any error
/// from a hook as fatal for the dispatch episode.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result of entry/exit hooks and transition actions.
pub type HookResult = Result<(), HookError>;

/// Errors from machine definition and dispatch.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("invalid machine definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("machine '{machine}' is {state}; {operation} is not valid")]
    InvalidLifecycle {
        machine: String,
        state: &'static str,
        operation: &'static str,
    },

    #[error("machine '{machine}' is not running")]
    NotRunning { machine: String },

    #[error("{hook} failed in state '{state}' on event {event}: {source}")]
    ActionFault {
        hook: &'static str,
        state: String,
        event: EventId,
        #[source]
        source: HookError,
    },

}
