//! Builder for machine definitions.

use crate::error::MachineError;
use crate::machine::{Lifecycle, StateMachine};
use crate::orthogonal::Orthogonal;
use crate::state::{Node, State, StateBehavior, StateId};
use crate::table::{Transition, TransitionTable};
use machina_event::EventId;
use std::collections::{BTreeSet, HashMap};

/// Builder for a [`StateMachine`] definition: states, composite children,
/// start/stop states, and transition declarations.
///
/// `build` validates the definition: the initial state must be declared,
/// every transition endpoint must name a declared state, and state ids
/// must be unique.
pub struct MachineBuilder {
    name: String,
    initial: Option<StateId>,
    stop: Option<StateId>,
    states: HashMap<StateId, Node>,
    duplicates: Vec<StateId>,
    table: TransitionTable,
}

impl MachineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: None,
            stop: None,
            states: HashMap::new(),
            duplicates: Vec::new(),
            table: TransitionTable::new(),
        }
    }

    /// Declares a leaf state with no entry/exit effects.
    pub fn state(self, id: StateId, name: impl Into<String>) -> Self {
        self.node(Node::Leaf(State::new(id, name)))
    }

    /// Declares a leaf state with behavior hooks.
    pub fn state_with(
        self,
        id: StateId,
        name: impl Into<String>,
        behavior: impl StateBehavior + 'static,
    ) -> Self {
        self.node(Node::Leaf(State::with_behavior(id, name, behavior)))
    }

    /// Declares a nested machine as a composite state. Entering the state
    /// starts the machine; exiting it stops it.
    pub fn child(self, id: StateId, mut machine: StateMachine) -> Self {
        machine.id = id;
        self.node(Node::Machine(machine))
    }

    /// Declares an orthogonal pair as a composite state.
    pub fn orthogonal(self, id: StateId, mut pair: Orthogonal) -> Self {
        pair.id = id;
        self.node(Node::Orthogonal(pair))
    }

    fn node(mut self, node: Node) -> Self {
        let id = node.id();
        if self.states.insert(id, node).is_some() {
            self.duplicates.push(id);
        }
        self
    }

    /// Sets the initial state (required).
    pub fn initial(mut self, id: StateId) -> Self {
        self.initial = Some(id);
        self
    }

    /// Sets the stop state (optional). A machine standing at its stop
    /// state is retired by its driver before the next dequeue.
    pub fn stop_state(mut self, id: StateId) -> Self {
        self.stop = Some(id);
        self
    }

    /// Declares a transition rule for `(from, event)`. Redeclaring the
    /// same key overwrites the earlier rule.
    pub fn transition(mut self, from: StateId, event: EventId, rule: Transition) -> Self {
        self.table.add(from, event, rule);
        self
    }

    /// Builds and validates the machine.
    pub fn build(self) -> Result<StateMachine, MachineError> {
        if !self.duplicates.is_empty() {
            return Err(MachineError::InvalidDefinition {
                reason: format!("duplicate state ids: {:?}", self.duplicates),
            });
        }

        let start = self.initial.ok_or_else(|| MachineError::InvalidDefinition {
            reason: "no initial state declared".to_string(),
        })?;
        if !self.states.contains_key(&start) {
            return Err(MachineError::InvalidDefinition {
                reason: format!("initial state {start} is not a declared state"),
            });
        }
        if let Some(stop) = self.stop {
            if !self.states.contains_key(&stop) {
                return Err(MachineError::InvalidDefinition {
                    reason: format!("stop state {stop} is not a declared state"),
                });
            }
        }
        for (from, event, to, _) in self.table.rows() {
            if !self.states.contains_key(&from) {
                return Err(MachineError::InvalidDefinition {
                    reason: format!("transition source {from} (event {event}) is not a declared state"),
                });
            }
            if !self.states.contains_key(&to) {
                return Err(MachineError::InvalidDefinition {
                    reason: format!("transition target {to} (event {event}) is not a declared state"),
                });
            }
        }

        let mut recognized: BTreeSet<EventId> = self.table.recognized_events().clone();
        for node in self.states.values() {
            match node {
                Node::Machine(machine) => recognized.extend(machine.recognized_events()),
                Node::Orthogonal(pair) => recognized.extend(pair.recognized_events()),
                Node::Leaf(_) => {}
            }
        }

        Ok(StateMachine {
            id: 0,
            name: self.name,
            start,
            stop: self.stop,
            current: None,
            lifecycle: Lifecycle::Idle,
            states: self.states,
            table: self.table,
            recognized,
        })
    }
}
