//! # machina-event
//!
//! Event values and the shared event queue for the machina runtime.
//!
//! This crate provides:
//! - The [`Event`] value type (identity by integer id, opaque JSON payload)
//! - Process-unique event id allocation
//! - The [`EventQueue`]: a thread-safe FIFO with push-to-front and an
//!   interruptible blocking dequeue

pub mod error;
pub mod event;
pub mod queue;

pub use error::QueueError;
pub use event::{Event, EventId, NULL_EVENT_ID};
pub use queue::EventQueue;
