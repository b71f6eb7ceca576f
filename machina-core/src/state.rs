//! States and the node kinds of the machine tree.

use crate::error::HookResult;
use crate::machine::StateMachine;
use crate::orthogonal::Orthogonal;
use machina_event::Event;
use std::fmt;

/// Stable identifier of a state within its declaring machine. Transition
/// entries reference states by id, never by address, so state storage may
/// move freely.
pub type StateId = u32;

/// Entry/exit behavior attached to a leaf state.
///
/// Hooks receive the triggering event (the null event on automatic
/// start/stop). `execute` runs after entry completes; for leaf states it is
/// typically a no-op. Returning an error from any hook terminates dispatch
/// and moves the machine to `Terminated`.
///
/// Hooks must not attempt to drive the machine they belong to: blocking on
/// the machine's own event queue from a hook deadlocks the dispatcher.
pub trait StateBehavior: Send {
    /// Invoked when the state is entered.
    fn on_entry(&mut self, event: &Event) -> HookResult {
        let _ = event;
        Ok(())
    }

    /// Invoked when the state is exited.
    fn on_exit(&mut self, event: &Event) -> HookResult {
        let _ = event;
        Ok(())
    }

    /// Invoked after entry completes.
    fn execute(&mut self) -> HookResult {
        Ok(())
    }
}

/// Behavior with no effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBehavior;

impl StateBehavior for NoBehavior {}

/// A leaf state: a name, a stable id, and its behavior hooks.
pub struct State {
    pub(crate) id: StateId,
    pub(crate) name: String,
    pub(crate) behavior: Box<dyn StateBehavior>,
}

impl State {
    /// Creates a leaf state with no entry/exit effects.
    pub fn new(id: StateId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            behavior: Box::new(NoBehavior),
        }
    }

    /// Creates a leaf state with behavior hooks.
    pub fn with_behavior(
        id: StateId,
        name: impl Into<String>,
        behavior: impl StateBehavior + 'static,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            behavior: Box::new(behavior),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// A node in the machine tree.
///
/// The three kinds share the entry/exit capability set and are told apart
/// by a single match in the dispatcher.
pub enum Node {
    /// A leaf state.
    Leaf(State),
    /// A nested machine acting as a composite state.
    Machine(StateMachine),
    /// Two peer machines acting as one composite state.
    Orthogonal(Orthogonal),
}

impl Node {
    pub fn id(&self) -> StateId {
        match self {
            Node::Leaf(state) => state.id,
            Node::Machine(machine) => machine.id,
            Node::Orthogonal(pair) => pair.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Leaf(state) => &state.name,
            Node::Machine(machine) => machine.name(),
            Node::Orthogonal(pair) => pair.name(),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Leaf(state) => write!(f, "Leaf({})", state.name),
            Node::Machine(machine) => write!(f, "Machine({})", machine.name()),
            Node::Orthogonal(pair) => write!(f, "Orthogonal({})", pair.name()),
        }
    }
}
