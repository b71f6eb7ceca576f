//! Orthogonal composition: two peer machines over one event stream.

use crate::error::{HookError, MachineError};
use crate::machine::{Dispatch, Lifecycle, Machine, StateMachine};
use crate::state::StateId;
use machina_event::{Event, EventId};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Two peer state machines composed as one node.
///
/// Both peers share the enclosing event stream. Each event is routed to
/// the first peer whose recognized-event set contains it; the peer
/// declared first wins ties. An event consumed by one peer is never
/// re-delivered to the other, and an event neither recognizes is reported
/// unhandled to the enclosing level.
pub struct Orthogonal {
    pub(crate) id: StateId,
    name: String,
    first: StateMachine,
    second: StateMachine,
    recognized: BTreeSet<EventId>,
}

impl Orthogonal {
    /// Composes two peers. `first` takes precedence when both recognize
    /// the same event.
    pub fn new(name: impl Into<String>, first: StateMachine, second: StateMachine) -> Self {
        let recognized = first
            .recognized_events()
            .union(second.recognized_events())
            .copied()
            .collect();
        Self {
            id: 0,
            name: name.into(),
            first,
            second,
            recognized,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The peer declared first.
    pub fn first(&self) -> &StateMachine {
        &self.first
    }

    /// The peer declared second.
    pub fn second(&self) -> &StateMachine {
        &self.second
    }

    /// Union of both peers' recognized-event sets.
    pub fn recognized_events(&self) -> &BTreeSet<EventId> {
        &self.recognized
    }

    /// Entry hook when used as a composite state: the first peer enters,
    /// then the second.
    pub(crate) fn enter(&mut self, event: &Event) -> Result<(), HookError> {
        self.first.enter(event)?;
        self.second.enter(event)?;
        debug!(machine = %self.name, "orthogonal pair entered");
        Ok(())
    }

    /// Exit hook when used as a composite state: peers exit in declaration
    /// order.
    pub(crate) fn exit(&mut self, event: &Event) -> Result<(), HookError> {
        self.first.exit(event)?;
        self.second.exit(event)?;
        debug!(machine = %self.name, "orthogonal pair exited");
        Ok(())
    }

    /// Routes one event to the peer that recognizes it. A peer that has
    /// already retired at its stop state no longer receives events.
    pub(crate) fn route(&mut self, event: &Event) -> Result<Dispatch, MachineError> {
        let peer = if self.first.lifecycle() == Lifecycle::Running
            && self.first.recognized_events().contains(&event.id)
        {
            &mut self.first
        } else if self.second.lifecycle() == Lifecycle::Running
            && self.second.recognized_events().contains(&event.id)
        {
            &mut self.second
        } else {
            return Ok(Dispatch::Unhandled);
        };

        let outcome = peer.dispatch(event)?;
        if peer.at_stop_state() {
            peer.retire();
        }
        Ok(outcome)
    }
}

impl Machine for Orthogonal {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<(), MachineError> {
        self.first.start()?;
        self.second.start()
    }

    fn stop(&mut self) -> Result<(), MachineError> {
        if self.lifecycle() != Lifecycle::Running {
            return Err(MachineError::InvalidLifecycle {
                machine: self.name.clone(),
                state: self.lifecycle().as_str(),
                operation: "stop",
            });
        }
        if self.first.lifecycle() == Lifecycle::Running {
            self.first.stop()?;
        }
        if self.second.lifecycle() == Lifecycle::Running {
            self.second.stop()?;
        }
        Ok(())
    }

    fn dispatch(&mut self, event: &Event) -> Result<Dispatch, MachineError> {
        self.route(event)
    }

    /// Running while either peer runs; terminated if either peer faulted.
    fn lifecycle(&self) -> Lifecycle {
        let (a, b) = (self.first.lifecycle(), self.second.lifecycle());
        if a == Lifecycle::Terminated || b == Lifecycle::Terminated {
            Lifecycle::Terminated
        } else if a == Lifecycle::Running || b == Lifecycle::Running {
            Lifecycle::Running
        } else {
            Lifecycle::Idle
        }
    }

    fn at_stop_state(&self) -> bool {
        self.first.at_stop_state() && self.second.at_stop_state()
    }

    fn retire(&mut self) {
        self.first.retire();
        self.second.retire();
    }

    fn reset(&mut self) -> Result<(), MachineError> {
        if self.first.lifecycle() == Lifecycle::Terminated {
            self.first.reset()?;
        }
        if self.second.lifecycle() == Lifecycle::Terminated {
            self.second.reset()?;
        }
        Ok(())
    }

    fn current_state_name(&self) -> Option<String> {
        match (
            Machine::current_state_name(&self.first),
            Machine::current_state_name(&self.second),
        ) {
            (None, None) => None,
            (a, b) => Some(format!(
                "{}/{}",
                a.as_deref().unwrap_or("-"),
                b.as_deref().unwrap_or("-")
            )),
        }
    }

    fn recognized_events(&self) -> &BTreeSet<EventId> {
        &self.recognized
    }
}

impl fmt::Debug for Orthogonal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orthogonal")
            .field("name", &self.name)
            .field("first", &self.first)
            .field("second", &self.second)
            .finish()
    }
}
