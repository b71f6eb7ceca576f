//! The state machine dispatcher.

use crate::error::{HookError, MachineError};
use crate::state::{Node, StateId};
use crate::table::{TransitionKind, TransitionTable};
use machina_event::{Event, EventId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, error, info};

/// Meta-state of a machine.
///
/// ```text
/// Idle --start--> Running --stop/reach-stop-state--> Idle
/// Running --fault--> Terminated --reset--> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Constructed or stopped; no current state.
    #[default]
    Idle,
    /// Dispatching; the current state is set.
    Running,
    /// A hook or action faulted; `reset` returns the machine to idle.
    Terminated,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Running => "running",
            Lifecycle::Terminated => "terminated",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A full exit/action/entry transition ran.
    Transitioned { from: StateId, to: StateId },
    /// An internal rule ran its action; exit/entry were skipped.
    Internal { state: StateId },
    /// A guard rejected the rule; the event was consumed but inert.
    GuardRejected { state: StateId },
    /// No rule matched anywhere in the hierarchy below and including this
    /// machine.
    Unhandled,
}

/// Capability set shared by the dispatchable node kinds, and the seam the
/// execution policies drive.
pub trait Machine: Send {
    fn name(&self) -> &str;

    /// Enters the start state (or starts both peers). Valid only from
    /// `Idle`.
    fn start(&mut self) -> Result<(), MachineError>;

    /// Exits the current state and returns to `Idle`. Valid only from
    /// `Running`.
    fn stop(&mut self) -> Result<(), MachineError>;

    /// Dispatches one event through the hierarchy, innermost active state
    /// first.
    fn dispatch(&mut self, event: &Event) -> Result<Dispatch, MachineError>;

    fn lifecycle(&self) -> Lifecycle;

    /// True while running with the current state equal to the declared
    /// stop state.
    fn at_stop_state(&self) -> bool;

    /// Returns a running machine standing at its stop state to idle. Exit
    /// hooks do not run; reaching the stop state ends the episode.
    fn retire(&mut self);

    /// Clears a terminated machine back to idle.
    fn reset(&mut self) -> Result<(), MachineError>;

    /// Name of the current state, if running.
    fn current_state_name(&self) -> Option<String>;

    /// Event ids this machine or any nested machine has a rule for.
    fn recognized_events(&self) -> &BTreeSet<EventId>;
}

/// A hierarchical state machine: current state, transition table, and the
/// owned tree of state nodes.
///
/// Machines are built with [`crate::MachineBuilder`] and driven by an
/// execution policy from `machina-exec` (or stepped directly in tests).
/// The dispatcher delivers each event to the most deeply nested running
/// machine first and climbs one level per miss; a miss at the root is
/// reported as [`Dispatch::Unhandled`] for the driver to log and discard.
pub struct StateMachine {
    pub(crate) id: StateId,
    pub(crate) name: String,
    pub(crate) start: StateId,
    pub(crate) stop: Option<StateId>,
    pub(crate) current: Option<StateId>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) states: HashMap<StateId, Node>,
    pub(crate) table: TransitionTable,
    pub(crate) recognized: BTreeSet<EventId>,
}

impl StateMachine {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Id of the current state, if running.
    pub fn current_state(&self) -> Option<StateId> {
        self.current
    }

    /// Resolves a state id to its declared name.
    pub fn state_name(&self, id: StateId) -> Option<&str> {
        self.states.get(&id).map(Node::name)
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Starts the machine: `Idle → Running`, current state becomes the
    /// start state, and its entry hook runs with the null event. Entering
    /// a composite start state starts its nested machine in turn.
    pub fn start(&mut self) -> Result<(), MachineError> {
        match self.lifecycle {
            Lifecycle::Idle => {}
            other => {
                return Err(MachineError::InvalidLifecycle {
                    machine: self.name.clone(),
                    state: other.as_str(),
                    operation: "start",
                })
            }
        }

        info!(machine = %self.name, "starting");
        self.lifecycle = Lifecycle::Running;
        self.current = Some(self.start);

        let null = Event::null();
        if let Err(source) = self.enter_node(self.start, &null) {
            self.current = None;
            return Err(self.fault("entry hook", self.start, &null, source));
        }
        Ok(())
    }

    /// Stops the machine: exits the current state (recursively stopping
    /// nested machines) and returns to `Idle`.
    pub fn stop(&mut self) -> Result<(), MachineError> {
        match self.lifecycle {
            Lifecycle::Running => {}
            other => {
                return Err(MachineError::InvalidLifecycle {
                    machine: self.name.clone(),
                    state: other.as_str(),
                    operation: "stop",
                })
            }
        }

        if let Some(current) = self.current {
            let null = Event::null();
            if let Err(source) = self.exit_node(current, &null) {
                return Err(self.fault("exit hook", current, &null, source));
            }
            self.current = None;
        }
        self.lifecycle = Lifecycle::Idle;
        info!(machine = %self.name, "stopped");
        Ok(())
    }

    /// True while running with the current state equal to the declared
    /// stop state. Drivers check this before each dequeue, so a transition
    /// landing on the stop state ends the episode on the next iteration.
    pub fn at_stop_state(&self) -> bool {
        self.lifecycle == Lifecycle::Running && self.stop.is_some() && self.current == self.stop
    }

    /// Returns a running machine standing at its stop state to idle
    /// without running exit hooks.
    pub fn retire(&mut self) {
        if self.lifecycle == Lifecycle::Running {
            info!(machine = %self.name, "reached stop state");
            self.current = None;
            self.lifecycle = Lifecycle::Idle;
        }
    }

    /// Clears a terminated machine back to idle.
    pub fn reset(&mut self) -> Result<(), MachineError> {
        match self.lifecycle {
            Lifecycle::Terminated => {
                self.current = None;
                self.lifecycle = Lifecycle::Idle;
                Ok(())
            }
            other => Err(MachineError::InvalidLifecycle {
                machine: self.name.clone(),
                state: other.as_str(),
                operation: "reset",
            }),
        }
    }

    /// Event ids this machine or any nested machine has a rule for.
    pub fn recognized_events(&self) -> &BTreeSet<EventId> {
        &self.recognized
    }

    /// Dispatches one event. The most deeply nested running machine sees
    /// it first; a miss climbs one level per pass. Exit, action, entry,
    /// and execute run to completion before this returns, so no event is
    /// observed between those phases.
    pub fn dispatch(&mut self, event: &Event) -> Result<Dispatch, MachineError> {
        if self.lifecycle != Lifecycle::Running {
            return Err(MachineError::NotRunning {
                machine: self.name.clone(),
            });
        }
        let current = self.current.ok_or_else(|| MachineError::NotRunning {
            machine: self.name.clone(),
        })?;

        match self.states.get_mut(&current) {
            Some(Node::Machine(child)) if child.lifecycle == Lifecycle::Running => {
                match child.dispatch(event)? {
                    Dispatch::Unhandled => {}
                    handled => {
                        if child.at_stop_state() {
                            child.retire();
                        }
                        return Ok(handled);
                    }
                }
            }
            Some(Node::Orthogonal(pair)) => match pair.route(event)? {
                Dispatch::Unhandled => {}
                handled => return Ok(handled),
            },
            _ => {}
        }

        self.dispatch_local(current, event)
    }

    /// Tries this machine's own table for `(current, event)`.
    fn dispatch_local(&mut self, current: StateId, event: &Event) -> Result<Dispatch, MachineError> {
        let (to, kind) = match self.table.next(current, event.id) {
            None => return Ok(Dispatch::Unhandled),
            Some(rule) => {
                if let Some(guard) = &rule.guard {
                    if !guard(event) {
                        debug!(
                            machine = %self.name,
                            state = current,
                            event = event.id,
                            "guard rejected transition"
                        );
                        return Ok(Dispatch::GuardRejected { state: current });
                    }
                }
                (rule.to, rule.kind)
            }
        };

        if kind == TransitionKind::Internal {
            let action_result = match self.table.next(current, event.id) {
                Some(rule) => match rule.action.as_mut() {
                    Some(action) => action(event),
                    None => Ok(()),
                },
                None => Ok(()),
            };
            if let Err(source) = action_result {
                return Err(self.fault("action", current, event, source));
            }
            debug!(machine = %self.name, state = current, event = event.id, "internal transition");
            return Ok(Dispatch::Internal { state: current });
        }

        if let Err(source) = self.exit_node(current, event) {
            return Err(self.fault("exit hook", current, event, source));
        }

        let action_result = match self.table.next(current, event.id) {
            Some(rule) => match rule.action.as_mut() {
                Some(action) => action(event),
                None => Ok(()),
            },
            None => Ok(()),
        };
        if let Err(source) = action_result {
            return Err(self.fault("action", current, event, source));
        }

        self.current = Some(to);
        if let Err(source) = self.enter_node(to, event) {
            self.current = Some(current);
            return Err(self.fault("entry hook", to, event, source));
        }

        debug!(
            machine = %self.name,
            from = self.state_name(current).unwrap_or("?"),
            to = self.state_name(to).unwrap_or("?"),
            event = event.id,
            "transitioned"
        );
        Ok(Dispatch::Transitioned { from: current, to })
    }

    /// Entry hook of this machine when used as a composite state: starting
    /// the nested machine is the entry action.
    pub(crate) fn enter(&mut self, _event: &Event) -> Result<(), HookError> {
        debug!(machine = %self.name, "entering composite state");
        self.start().map_err(Into::into)
    }

    /// Exit hook of this machine when used as a composite state. A nested
    /// machine that already retired at its stop state has nothing to do.
    pub(crate) fn exit(&mut self, _event: &Event) -> Result<(), HookError> {
        debug!(machine = %self.name, "exiting composite state");
        if self.lifecycle == Lifecycle::Running {
            self.stop().map_err(Into::into)
        } else {
            Ok(())
        }
    }

    fn enter_node(&mut self, id: StateId, event: &Event) -> Result<(), HookError> {
        let name = self.name.clone();
        match self.states.get_mut(&id) {
            Some(Node::Leaf(state)) => {
                debug!(machine = %name, state = %state.name, "entering");
                state.behavior.on_entry(event)?;
                state.behavior.execute()
            }
            Some(Node::Machine(child)) => child.enter(event),
            Some(Node::Orthogonal(pair)) => pair.enter(event),
            None => Err(format!("machine '{name}' has no state with id {id}").into()),
        }
    }

    fn exit_node(&mut self, id: StateId, event: &Event) -> Result<(), HookError> {
        let name = self.name.clone();
        match self.states.get_mut(&id) {
            Some(Node::Leaf(state)) => {
                debug!(machine = %name, state = %state.name, "exiting");
                state.behavior.on_exit(event)
            }
            Some(Node::Machine(child)) => child.exit(event),
            Some(Node::Orthogonal(pair)) => pair.exit(event),
            None => Err(format!("machine '{name}' has no state with id {id}").into()),
        }
    }

    /// Records a hook failure: logs it, terminates the machine, and builds
    /// the error for the driver (which stops the queue).
    fn fault(
        &mut self,
        hook: &'static str,
        state: StateId,
        event: &Event,
        source: HookError,
    ) -> MachineError {
        self.lifecycle = Lifecycle::Terminated;
        let state_name = self
            .state_name(state)
            .unwrap_or("?")
            .to_string();
        error!(
            machine = %self.name,
            state = %state_name,
            event = event.id,
            error = %source,
            "{hook} failed; terminating dispatch"
        );
        MachineError::ActionFault {
            hook,
            state: state_name,
            event: event.id,
            source,
        }
    }

    /// Renders the transition table as stable diagnostic lines
    /// `<fromName>,<eventId>:<toName>`.
    pub fn render_table(&self) -> Vec<String> {
        self.table
            .rows()
            .into_iter()
            .map(|(from, event, to, _)| {
                format!(
                    "{},{}:{}",
                    self.state_name(from).unwrap_or("?"),
                    event,
                    self.state_name(to).unwrap_or("?")
                )
            })
            .collect()
    }

    /// Logs the transition table at info level, one line per rule.
    pub fn print(&self) {
        for line in self.render_table() {
            info!(machine = %self.name, "{line}");
        }
    }
}

impl Machine for StateMachine {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<(), MachineError> {
        StateMachine::start(self)
    }

    fn stop(&mut self) -> Result<(), MachineError> {
        StateMachine::stop(self)
    }

    fn dispatch(&mut self, event: &Event) -> Result<Dispatch, MachineError> {
        StateMachine::dispatch(self, event)
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn at_stop_state(&self) -> bool {
        StateMachine::at_stop_state(self)
    }

    fn retire(&mut self) {
        StateMachine::retire(self)
    }

    fn reset(&mut self) -> Result<(), MachineError> {
        StateMachine::reset(self)
    }

    fn current_state_name(&self) -> Option<String> {
        self.current
            .and_then(|id| self.state_name(id))
            .map(str::to_string)
    }

    fn recognized_events(&self) -> &BTreeSet<EventId> {
        &self.recognized
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("lifecycle", &self.lifecycle)
            .field("current", &self.current)
            .field("states", &self.states.len())
            .field("transitions", &self.table.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MachineBuilder;
    use crate::error::HookResult;
    use crate::state::StateBehavior;
    use crate::table::Transition;
    use std::sync::{Arc, Mutex};

    const A: StateId = 1;
    const B: StateId = 2;

    const GO: EventId = 10;
    const BACK: EventId = 11;
    const LOOP: EventId = 12;
    const TICK: EventId = 13;

    #[derive(Clone, Default)]
    struct Trace(Arc<Mutex<Vec<String>>>);

    impl Trace {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct Hooks {
        name: &'static str,
        trace: Trace,
    }

    impl StateBehavior for Hooks {
        fn on_entry(&mut self, event: &Event) -> HookResult {
            self.trace.push(format!("enter {} on {}", self.name, event.id));
            Ok(())
        }

        fn on_exit(&mut self, event: &Event) -> HookResult {
            self.trace.push(format!("exit {} on {}", self.name, event.id));
            Ok(())
        }
    }

    fn hooks(name: &'static str, trace: &Trace) -> Hooks {
        Hooks {
            name,
            trace: trace.clone(),
        }
    }

    fn two_state_machine(trace: &Trace) -> StateMachine {
        let action_trace = trace.clone();
        MachineBuilder::new("m")
            .state_with(A, "a", hooks("a", trace))
            .state_with(B, "b", hooks("b", trace))
            .initial(A)
            .transition(
                A,
                GO,
                Transition::external(B).with_action(move |event| {
                    action_trace.push(format!("action go on {}", event.id));
                    Ok(())
                }),
            )
            .transition(B, BACK, Transition::external(A))
            .build()
            .unwrap()
    }

    #[test]
    fn test_start_enters_initial_state_with_null_event() {
        let trace = Trace::default();
        let mut machine = two_state_machine(&trace);

        machine.start().unwrap();

        assert_eq!(machine.lifecycle(), Lifecycle::Running);
        assert_eq!(machine.current_state(), Some(A));
        assert_eq!(trace.take(), vec!["enter a on 0"]);
    }

    #[test]
    fn test_double_start_is_invalid_lifecycle() {
        let trace = Trace::default();
        let mut machine = two_state_machine(&trace);
        machine.start().unwrap();

        let result = machine.start();
        assert!(matches!(
            result,
            Err(MachineError::InvalidLifecycle { operation: "start", .. })
        ));
        assert_eq!(machine.current_state(), Some(A));
    }

    #[test]
    fn test_stop_before_start_is_invalid_lifecycle() {
        let trace = Trace::default();
        let mut machine = two_state_machine(&trace);

        let result = machine.stop();
        assert!(matches!(
            result,
            Err(MachineError::InvalidLifecycle { operation: "stop", .. })
        ));
    }

    #[test]
    fn test_transition_orders_exit_action_entry() {
        let trace = Trace::default();
        let mut machine = two_state_machine(&trace);
        machine.start().unwrap();
        trace.take();

        let outcome = machine.dispatch(&Event::new(GO)).unwrap();

        assert_eq!(outcome, Dispatch::Transitioned { from: A, to: B });
        assert_eq!(machine.current_state(), Some(B));
        assert_eq!(
            trace.take(),
            vec!["exit a on 10", "action go on 10", "enter b on 10"]
        );
    }

    #[test]
    fn test_guard_rejection_consumes_event_without_hooks() {
        let trace = Trace::default();
        let mut machine = MachineBuilder::new("m")
            .state_with(A, "a", hooks("a", &trace))
            .state_with(B, "b", hooks("b", &trace))
            .initial(A)
            .transition(A, GO, Transition::external(B).with_guard(|_| false))
            .build()
            .unwrap();
        machine.start().unwrap();
        trace.take();

        let outcome = machine.dispatch(&Event::new(GO)).unwrap();

        assert_eq!(outcome, Dispatch::GuardRejected { state: A });
        assert_eq!(machine.current_state(), Some(A));
        assert_eq!(trace.take(), Vec::<String>::new());
    }

    #[test]
    fn test_guard_sees_event_payload() {
        let mut machine = MachineBuilder::new("m")
            .state(A, "a")
            .state(B, "b")
            .initial(A)
            .transition(
                A,
                GO,
                Transition::external(B).with_guard(|event| event.payload["armed"] == true),
            )
            .build()
            .unwrap();
        machine.start().unwrap();

        let rejected = machine.dispatch(&Event::new(GO)).unwrap();
        assert_eq!(rejected, Dispatch::GuardRejected { state: A });

        let armed = Event::with_payload(GO, serde_json::json!({"armed": true}));
        let outcome = machine.dispatch(&armed).unwrap();
        assert_eq!(outcome, Dispatch::Transitioned { from: A, to: B });
    }

    #[test]
    fn test_self_loop_reruns_exit_and_entry() {
        let trace = Trace::default();
        let mut machine = MachineBuilder::new("m")
            .state_with(A, "a", hooks("a", &trace))
            .initial(A)
            .transition(A, LOOP, Transition::external(A))
            .build()
            .unwrap();
        machine.start().unwrap();
        trace.take();

        machine.dispatch(&Event::new(LOOP)).unwrap();

        assert_eq!(trace.take(), vec!["exit a on 12", "enter a on 12"]);
    }

    #[test]
    fn test_internal_transition_skips_exit_and_entry() {
        let trace = Trace::default();
        let action_trace = trace.clone();
        let mut machine = MachineBuilder::new("m")
            .state_with(A, "a", hooks("a", &trace))
            .initial(A)
            .transition(
                A,
                TICK,
                Transition::internal().with_action(move |_| {
                    action_trace.push("tick");
                    Ok(())
                }),
            )
            .build()
            .unwrap();
        machine.start().unwrap();
        trace.take();

        let outcome = machine.dispatch(&Event::new(TICK)).unwrap();

        assert_eq!(outcome, Dispatch::Internal { state: A });
        assert_eq!(machine.current_state(), Some(A));
        assert_eq!(trace.take(), vec!["tick"]);
    }

    #[test]
    fn test_unhandled_event_reported() {
        let trace = Trace::default();
        let mut machine = two_state_machine(&trace);
        machine.start().unwrap();

        let outcome = machine.dispatch(&Event::new(99)).unwrap();

        assert_eq!(outcome, Dispatch::Unhandled);
        assert_eq!(machine.current_state(), Some(A));
    }

    #[test]
    fn test_action_fault_terminates_and_keeps_pre_state() {
        let trace = Trace::default();
        let mut machine = MachineBuilder::new("m")
            .state_with(A, "a", hooks("a", &trace))
            .state_with(B, "b", hooks("b", &trace))
            .initial(A)
            .transition(
                A,
                GO,
                Transition::external(B).with_action(|_| Err("device unavailable".into())),
            )
            .build()
            .unwrap();
        machine.start().unwrap();
        trace.take();

        let result = machine.dispatch(&Event::new(GO));

        assert!(matches!(
            result,
            Err(MachineError::ActionFault { hook: "action", .. })
        ));
        assert_eq!(machine.lifecycle(), Lifecycle::Terminated);
        assert_eq!(machine.current_state(), Some(A));
        // The exit ran before the fault; the target was never entered.
        assert_eq!(trace.take(), vec!["exit a on 10"]);
    }

    #[test]
    fn test_entry_fault_rolls_back_current_state() {
        struct FailingEntry;
        impl StateBehavior for FailingEntry {
            fn on_entry(&mut self, _event: &Event) -> HookResult {
                Err("refused".into())
            }
        }

        let mut machine = MachineBuilder::new("m")
            .state(A, "a")
            .state_with(B, "b", FailingEntry)
            .initial(A)
            .transition(A, GO, Transition::external(B))
            .build()
            .unwrap();
        machine.start().unwrap();

        let result = machine.dispatch(&Event::new(GO));

        assert!(matches!(
            result,
            Err(MachineError::ActionFault { hook: "entry hook", .. })
        ));
        assert_eq!(machine.lifecycle(), Lifecycle::Terminated);
        assert_eq!(machine.current_state(), Some(A));
    }

    #[test]
    fn test_start_entry_fault_leaves_current_none() {
        struct FailingEntry;
        impl StateBehavior for FailingEntry {
            fn on_entry(&mut self, _event: &Event) -> HookResult {
                Err("refused".into())
            }
        }

        let mut machine = MachineBuilder::new("m")
            .state_with(A, "a", FailingEntry)
            .state(B, "b")
            .initial(A)
            .transition(A, GO, Transition::external(B))
            .build()
            .unwrap();

        let result = machine.start();

        assert!(matches!(
            result,
            Err(MachineError::ActionFault { hook: "entry hook", .. })
        ));
        assert_eq!(machine.lifecycle(), Lifecycle::Terminated);
        // The start state was never entered; the machine is in no state.
        assert_eq!(machine.current_state(), None);
    }

    #[test]
    fn test_terminated_machine_requires_reset() {
        let mut machine = MachineBuilder::new("m")
            .state(A, "a")
            .initial(A)
            .transition(A, GO, Transition::internal().with_action(|_| Err("boom".into())))
            .build()
            .unwrap();
        machine.start().unwrap();
        machine.dispatch(&Event::new(GO)).unwrap_err();
        assert_eq!(machine.lifecycle(), Lifecycle::Terminated);

        assert!(matches!(
            machine.dispatch(&Event::new(GO)),
            Err(MachineError::NotRunning { .. })
        ));
        assert!(machine.start().is_err());

        machine.reset().unwrap();
        assert_eq!(machine.lifecycle(), Lifecycle::Idle);
        machine.start().unwrap();
        assert_eq!(machine.current_state(), Some(A));
    }

    fn nested_machines(trace: &Trace) -> StateMachine {
        const INNER: StateId = 1;
        const DONE: StateId = 2;

        let child = MachineBuilder::new("child")
            .state_with(INNER, "inner", hooks("inner", trace))
            .state_with(DONE, "done", hooks("done", trace))
            .initial(INNER)
            .stop_state(DONE)
            .transition(INNER, GO, Transition::external(DONE))
            .build()
            .unwrap();

        MachineBuilder::new("parent")
            .child(A, child)
            .state_with(B, "outside", hooks("outside", trace))
            .initial(A)
            .transition(A, BACK, Transition::external(B))
            .build()
            .unwrap()
    }

    #[test]
    fn test_entering_composite_starts_nested_machine() {
        let trace = Trace::default();
        let mut parent = nested_machines(&trace);

        parent.start().unwrap();

        assert_eq!(parent.current_state(), Some(A));
        assert_eq!(trace.take(), vec!["enter inner on 0"]);
        match parent.states.get(&A) {
            Some(Node::Machine(child)) => {
                assert_eq!(child.lifecycle(), Lifecycle::Running);
                assert_eq!(child.current_state(), Some(1));
            }
            other => panic!("expected nested machine, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_machine_handles_event_first() {
        let trace = Trace::default();
        let mut parent = nested_machines(&trace);
        parent.start().unwrap();
        trace.take();

        let outcome = parent.dispatch(&Event::new(GO)).unwrap();

        assert_eq!(outcome, Dispatch::Transitioned { from: 1, to: 2 });
        // The parent's own state is untouched by the child's transition.
        assert_eq!(parent.current_state(), Some(A));
        assert_eq!(trace.take(), vec!["exit inner on 10", "enter done on 10"]);
    }

    #[test]
    fn test_child_at_stop_state_is_retired() {
        let trace = Trace::default();
        let mut parent = nested_machines(&trace);
        parent.start().unwrap();

        parent.dispatch(&Event::new(GO)).unwrap();

        match parent.states.get(&A) {
            Some(Node::Machine(child)) => {
                assert_eq!(child.lifecycle(), Lifecycle::Idle);
                assert_eq!(child.current_state(), None);
            }
            other => panic!("expected nested machine, got {other:?}"),
        }
    }

    #[test]
    fn test_parent_handles_event_the_child_misses() {
        let trace = Trace::default();
        let mut parent = nested_machines(&trace);
        parent.start().unwrap();
        trace.take();

        // BACK is not in the child's table; the parent's rule fires and the
        // composite exit stops the child.
        let event = Event::with_payload(BACK, serde_json::json!({"reason": "escalate"}));
        let outcome = parent.dispatch(&event).unwrap();

        assert_eq!(outcome, Dispatch::Transitioned { from: A, to: B });
        assert_eq!(parent.current_state(), Some(B));
        assert_eq!(
            trace.take(),
            vec!["exit inner on 0", "enter outside on 11"]
        );
    }

    #[test]
    fn test_render_table_lines() {
        let trace = Trace::default();
        let machine = two_state_machine(&trace);

        assert_eq!(machine.render_table(), vec!["a,10:b", "b,11:a"]);
    }

    #[test]
    fn test_stop_exits_current_state() {
        let trace = Trace::default();
        let mut machine = two_state_machine(&trace);
        machine.start().unwrap();
        trace.take();

        machine.stop().unwrap();

        assert_eq!(machine.lifecycle(), Lifecycle::Idle);
        assert_eq!(machine.current_state(), None);
        assert_eq!(trace.take(), vec!["exit a on 0"]);
    }

    #[test]
    fn test_stop_exit_fault_keeps_current_state() {
        struct FailingExit;
        impl StateBehavior for FailingExit {
            fn on_exit(&mut self, _event: &Event) -> HookResult {
                Err("still busy".into())
            }
        }

        let mut machine = MachineBuilder::new("m")
            .state_with(A, "a", FailingExit)
            .state(B, "b")
            .initial(A)
            .transition(A, GO, Transition::external(B))
            .build()
            .unwrap();
        machine.start().unwrap();

        let result = machine.stop();

        assert!(matches!(
            result,
            Err(MachineError::ActionFault { hook: "exit hook", .. })
        ));
        assert_eq!(machine.lifecycle(), Lifecycle::Terminated);
        // The exit never completed; the machine is still in its state.
        assert_eq!(machine.current_state(), Some(A));
    }

    #[test]
    fn test_start_stop_cycles_keep_recognized_events() {
        let trace = Trace::default();
        let mut machine = two_state_machine(&trace);
        let before: Vec<_> = machine.recognized_events().iter().copied().collect();

        for _ in 0..3 {
            machine.start().unwrap();
            machine.stop().unwrap();
        }

        let after: Vec<_> = machine.recognized_events().iter().copied().collect();
        assert_eq!(before, after);
    }
}
