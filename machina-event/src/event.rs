//! Event values and id allocation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

/// Identifier of an event. Event identity, ordering, and hashing are by id
/// alone; the payload never participates.
pub type EventId = u32;

/// Id reserved for the null event passed to entry/exit hooks on automatic
/// start/stop transitions. Caller-chosen ids must not use it.
pub const NULL_EVENT_ID: EventId = 0;

static NEXT_EVENT_ID: AtomicU32 = AtomicU32::new(1);

/// An event routed through the runtime.
///
/// Events are cheap values: clone freely, share across threads. The payload
/// is opaque to the runtime and reaches entry/exit hooks, actions, and
/// guards untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event identity.
    pub id: EventId,

    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Event {
    /// Creates an event with a caller-chosen id and no payload.
    pub fn new(id: EventId) -> Self {
        Self {
            id,
            payload: Value::Null,
        }
    }

    /// Creates an event with a caller-chosen id and a payload.
    pub fn with_payload(id: EventId, payload: Value) -> Self {
        Self { id, payload }
    }

    /// Creates an event with a process-unique id.
    ///
    /// This is the only id-allocation source; mixing allocated and
    /// caller-chosen ids in one machine is the caller's responsibility.
    pub fn fresh() -> Self {
        Self::new(NEXT_EVENT_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// The event delivered to entry/exit hooks when a machine starts or
    /// stops without a triggering event.
    pub fn null() -> Self {
        Self::new(NULL_EVENT_ID)
    }

    /// Returns true for the null event.
    pub fn is_null(&self) -> bool {
        self.id == NULL_EVENT_ID
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
