//! Transition rules indexed by `(from-state, event)`.

use crate::error::HookResult;
use crate::state::StateId;
use machina_event::{Event, EventId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Effect invoked between exit and entry of a transition.
pub type Action = Box<dyn FnMut(&Event) -> HookResult + Send>;

/// Predicate gating a transition. A missing guard means always taken.
pub type Guard = Box<dyn Fn(&Event) -> bool + Send>;

/// Whether a transition re-runs exit/entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionKind {
    /// Exit the source, run the action, enter the target. Self-loops
    /// re-run exit and entry.
    #[default]
    External,
    /// Stay in the source without exit/entry; only the action runs.
    Internal,
}

/// A declared transition rule: target state plus optional action and
/// guard.
pub struct Transition {
    pub(crate) to: StateId,
    pub(crate) action: Option<Action>,
    pub(crate) guard: Option<Guard>,
    pub(crate) kind: TransitionKind,
}

impl Transition {
    /// A full transition to `to`: exit, action, entry.
    pub fn external(to: StateId) -> Self {
        Self {
            to,
            action: None,
            guard: None,
            kind: TransitionKind::External,
        }
    }

    /// An internal transition: the source state is kept, exit/entry are
    /// skipped, only the action runs. The source state is filled in when
    /// the rule is declared.
    pub fn internal() -> Self {
        Self {
            to: StateId::MAX,
            action: None,
            guard: None,
            kind: TransitionKind::Internal,
        }
    }

    /// Attaches an action.
    pub fn with_action(mut self, action: impl FnMut(&Event) -> HookResult + Send + 'static) -> Self {
        self.action = Some(Box::new(action));
        self
    }

    /// Attaches a guard.
    pub fn with_guard(mut self, guard: impl Fn(&Event) -> bool + Send + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Target state id.
    pub fn to(&self) -> StateId {
        self.to
    }

    /// External or internal.
    pub fn kind(&self) -> TransitionKind {
        self.kind
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("to", &self.to)
            .field("kind", &self.kind)
            .field("has_action", &self.action.is_some())
            .field("has_guard", &self.guard.is_some())
            .finish()
    }
}

/// Mapping `(from-state, event) → Transition`.
///
/// Keys are unique; redeclaring a key overwrites the earlier rule. The
/// table also maintains the set of event ids it recognizes, consulted by
/// orthogonal routing.
#[derive(Debug, Default)]
pub struct TransitionTable {
    entries: HashMap<(StateId, EventId), Transition>,
    recognized: BTreeSet<EventId>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a transition. An internal rule keeps `from` as its target.
    pub fn add(&mut self, from: StateId, event: EventId, mut transition: Transition) {
        if transition.kind == TransitionKind::Internal {
            transition.to = from;
        }
        self.recognized.insert(event);
        self.entries.insert((from, event), transition);
    }

    /// Looks up the rule for `(from, event)`.
    pub fn next(&mut self, from: StateId, event: EventId) -> Option<&mut Transition> {
        self.entries.get_mut(&(from, event))
    }

    /// Returns true if a rule exists for `(from, event)`.
    pub fn contains(&self, from: StateId, event: EventId) -> bool {
        self.entries.contains_key(&(from, event))
    }

    /// Event ids for which at least one from-state has an entry.
    pub fn recognized_events(&self) -> &BTreeSet<EventId> {
        &self.recognized
    }

    /// Number of declared rules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rules as `(from, event, to, kind)` rows in stable `(from, event)`
    /// order.
    pub fn rows(&self) -> Vec<(StateId, EventId, StateId, TransitionKind)> {
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .map(|((from, event), t)| (*from, *event, t.to, t.kind))
            .collect();
        rows.sort_unstable_by_key(|(from, event, _, _)| (*from, *event));
        rows
    }
}
