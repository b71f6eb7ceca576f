//! # machina-core
//!
//! Hierarchical state machine dispatcher.
//!
//! This crate provides:
//! - Machine definition and validation ([`MachineBuilder`])
//! - The transition table: `(from-state, event) → (to, action?, guard?)`
//! - The dispatcher: guard evaluation, exit/action/entry sequencing, and
//!   innermost-first delivery through nested machines
//! - Orthogonal composition of two peer machines over one event stream
//!
//! Machines are driven by an execution policy from `machina-exec`: either
//! stepped by the caller or run on a dedicated worker thread.

pub mod builder;
pub mod error;
pub mod machine;
pub mod orthogonal;
pub mod state;
pub mod table;

pub use builder::MachineBuilder;
pub use error::{HookError, HookResult, MachineError};
pub use machine::{Dispatch, Lifecycle, Machine, StateMachine};
pub use orthogonal::Orthogonal;
pub use state::{NoBehavior, Node, State, StateBehavior, StateId};
pub use table::{Action, Guard, Transition, TransitionKind, TransitionTable};
