//! The shared event queue.
//!
//! One queue is shared by a root machine and all of its descendants; it
//! outlives every machine that borrows it. A single mutex protects the
//! deque and the stopped flag; a condition variable wakes blocked
//! consumers.

use crate::error::QueueError;
use crate::event::Event;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<Event>,
    stopped: bool,
}

/// Thread-safe FIFO with push-to-front and an interruptible blocking
/// dequeue.
///
/// Multiple producers and multiple consumers are supported; ordering among
/// concurrent producers is whatever the lock grants them. Consumers observe
/// FIFO among back-inserts; a front-insert is returned ahead of anything
/// already waiting.
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty queue with room for `capacity` events before
    /// reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                stopped: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Appends an event and wakes one waiter.
    pub fn add_back(&self, event: Event) {
        let mut inner = self.inner.lock();
        inner.items.push_back(event);
        self.ready.notify_one();
    }

    /// Prepends an event and wakes one waiter.
    ///
    /// Used to return an event to the head of the stream: the next `next`
    /// call observes it before anything already queued.
    pub fn add_front(&self, event: Event) {
        let mut inner = self.inner.lock();
        inner.items.push_front(event);
        self.ready.notify_one();
    }

    /// Blocks until an event is available or the queue is stopped.
    ///
    /// A stopped queue signals [`QueueError::Interrupted`] even while
    /// events remain queued; they are retained for a later `reset`.
    pub fn next(&self) -> Result<Event, QueueError> {
        let mut inner = self.inner.lock();
        loop {
            if inner.stopped {
                return Err(QueueError::Interrupted);
            }
            if let Some(event) = inner.items.pop_front() {
                return Ok(event);
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Non-blocking dequeue for caller-stepped execution. Returns `None`
    /// when the queue is empty.
    pub fn try_next(&self) -> Result<Option<Event>, QueueError> {
        let mut inner = self.inner.lock();
        if inner.stopped {
            return Err(QueueError::Interrupted);
        }
        Ok(inner.items.pop_front())
    }

    /// Marks the queue stopped and wakes every waiter.
    ///
    /// Queued events are retained; `next` signals interruption until
    /// `reset`.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        debug!(pending = inner.items.len(), "event queue stopped");
        self.ready.notify_all();
    }

    /// Clears the stopped flag; the queue becomes usable again with its
    /// retained events intact.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = false;
        debug!(pending = inner.items.len(), "event queue reset");
    }

    /// Returns true once `stop` has been called and `reset` has not.
    pub fn interrupted(&self) -> bool {
        self.inner.lock().stopped
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Returns true when no events are queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}
