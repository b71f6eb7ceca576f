//! Synchronous execution policy: the caller drives the machine.

use crate::error::ExecError;
use machina_core::{Dispatch, Lifecycle, Machine};
use machina_event::{Event, EventQueue};
use std::sync::Arc;
use tracing::warn;

/// Outcome of a single [`SyncExecutor::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The queue was empty or the machine was not running; nothing ran.
    Idle,
    /// One event was dequeued and dispatched.
    Dispatched(Dispatch),
    /// The machine stood at its stop state and was retired.
    Terminated,
}

/// Caller-stepped driver around a machine and its event queue.
///
/// Intended for test harnesses and cooperative schedulers: `step` performs
/// at most one dispatcher iteration and never blocks. No threads are
/// created.
pub struct SyncExecutor<M: Machine> {
    machine: M,
    queue: Arc<EventQueue>,
    processed: u64,
}

impl<M: Machine> SyncExecutor<M> {
    /// Wraps a machine with a fresh queue.
    pub fn new(machine: M) -> Self {
        Self::with_queue(machine, Arc::new(EventQueue::new()))
    }

    /// Wraps a machine around an existing (possibly shared) queue.
    pub fn with_queue(machine: M, queue: Arc<EventQueue>) -> Self {
        Self {
            machine,
            queue,
            processed: 0,
        }
    }

    /// Starts the wrapped machine.
    pub fn start(&mut self) -> Result<(), ExecError> {
        self.queue.reset();
        self.machine.start()?;
        Ok(())
    }

    /// Stops the wrapped machine.
    pub fn stop(&mut self) -> Result<(), ExecError> {
        self.machine.stop()?;
        Ok(())
    }

    /// Appends an event to the queue.
    pub fn send_event(&self, event: Event) {
        self.queue.add_back(event);
    }

    /// Performs at most one dispatcher iteration. An empty queue returns
    /// [`Step::Idle`] immediately without blocking.
    pub fn step(&mut self) -> Result<Step, ExecError> {
        if self.machine.lifecycle() != Lifecycle::Running {
            return Ok(Step::Idle);
        }
        if self.machine.at_stop_state() {
            self.machine.retire();
            return Ok(Step::Terminated);
        }

        let Some(event) = self.queue.try_next()? else {
            return Ok(Step::Idle);
        };

        let outcome = match self.machine.dispatch(&event) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.queue.stop();
                return Err(e.into());
            }
        };
        self.processed += 1;

        if outcome == Dispatch::Unhandled {
            warn!(
                machine = %self.machine.name(),
                event = event.id,
                "unhandled event discarded"
            );
        }
        Ok(Step::Dispatched(outcome))
    }

    /// Steps until the queue drains or the machine terminates. Returns the
    /// number of events dispatched.
    pub fn drain(&mut self) -> Result<u64, ExecError> {
        let mut dispatched = 0;
        loop {
            match self.step()? {
                Step::Dispatched(_) => dispatched += 1,
                Step::Idle | Step::Terminated => return Ok(dispatched),
            }
        }
    }

    /// Total events dispatched by this executor.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// The shared queue, for external producers.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }
}
