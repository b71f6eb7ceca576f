//! Asynchronous execution policy: a dedicated worker thread per root
//! machine.

use crate::config::WorkerConfig;
use crate::error::ExecError;
use machina_core::{Dispatch, Lifecycle, Machine};
use machina_event::{Event, EventQueue, QueueError};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

/// Observer hook invoked immediately before each blocking dequeue.
type Observer = Arc<dyn Fn() + Send + Sync>;

struct Shared<M> {
    machine: Mutex<M>,
    queue: Arc<EventQueue>,
    interrupt: AtomicBool,
    processed: AtomicU64,
}

/// Thread-driven driver around a machine and its event queue.
///
/// `start` starts the machine and spawns one worker thread; nested
/// machines share it, and dispatch inside one root is strictly
/// sequential. `stop` interrupts the worker, stops the queue, and joins.
/// Dropping a still-running executor performs the same orderly shutdown
/// with a logged warning.
pub struct AsyncExecutor<M: Machine + 'static> {
    shared: Arc<Shared<M>>,
    worker: Option<JoinHandle<()>>,
    config: WorkerConfig,
    observer: Option<Observer>,
}

impl<M: Machine + 'static> AsyncExecutor<M> {
    /// Wraps a machine with the default configuration.
    pub fn new(machine: M) -> Self {
        Self::with_config(machine, WorkerConfig::default())
    }

    /// Wraps a machine with explicit worker tunables.
    pub fn with_config(machine: M, config: WorkerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                machine: Mutex::new(machine),
                queue: Arc::new(EventQueue::with_capacity(config.queue_capacity)),
                interrupt: AtomicBool::new(false),
                processed: AtomicU64::new(0),
            }),
            worker: None,
            config,
            observer: None,
        }
    }

    /// Installs a notify hook invoked immediately before each blocking
    /// dequeue. Notification is best-effort: a panicking hook is caught,
    /// logged, and swallowed.
    pub fn with_observer(mut self, notify: impl Fn() + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(notify));
        self
    }

    /// Starts the machine and spawns the worker thread.
    pub fn start(&mut self) -> Result<(), ExecError> {
        if self.worker.is_some() {
            return Err(ExecError::AlreadyStarted);
        }

        self.shared.machine.lock().start()?;
        self.shared.interrupt.store(false, Ordering::SeqCst);
        self.shared.queue.reset();

        let shared = Arc::clone(&self.shared);
        let observer = self.observer.clone();
        let warn_unhandled = self.config.warn_unhandled;
        let handle = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker_loop(shared, observer, warn_unhandled))?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Interrupts the worker, stops the queue, and joins the thread.
    ///
    /// A transition in flight completes before the worker observes the
    /// interrupt; queued events are retained for a later `reset` and
    /// restart.
    pub fn stop(&mut self) -> Result<(), ExecError> {
        let Some(handle) = self.worker.take() else {
            return Err(ExecError::NotStarted);
        };

        self.shared.interrupt.store(true, Ordering::SeqCst);
        self.shared.queue.stop();
        if handle.join().is_err() {
            error!("worker thread panicked during shutdown");
        }

        let mut machine = self.shared.machine.lock();
        if machine.lifecycle() == Lifecycle::Running {
            machine.stop()?;
        }
        Ok(())
    }

    /// Appends an event to the queue.
    pub fn send_event(&self, event: Event) {
        self.shared.queue.add_back(event);
    }

    /// The shared queue, for external producers.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.shared.queue
    }

    /// Name of the current state, read through the dispatcher lock.
    pub fn current_state(&self) -> Option<String> {
        self.shared.machine.lock().current_state_name()
    }

    /// Meta-state of the wrapped machine.
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.machine.lock().lifecycle()
    }

    /// Total events dispatched by the worker.
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::Relaxed)
    }

    /// True while a worker thread is attached.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Runs `f` against the wrapped machine under the dispatcher lock.
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.shared.machine.lock())
    }
}

impl<M: Machine + 'static> Drop for AsyncExecutor<M> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            warn!("executor dropped while running; shutting down worker");
            if let Err(e) = self.stop() {
                error!(error = %e, "shutdown from drop failed");
            }
        }
    }
}

fn worker_loop<M: Machine>(shared: Arc<Shared<M>>, observer: Option<Observer>, warn_unhandled: bool) {
    debug!("worker started");
    loop {
        if shared.interrupt.load(Ordering::SeqCst) {
            debug!("worker interrupted");
            break;
        }

        {
            let mut machine = shared.machine.lock();
            if machine.at_stop_state() {
                machine.retire();
                shared.interrupt.store(true, Ordering::SeqCst);
                break;
            }
        }

        if let Some(notify) = &observer {
            if catch_unwind(AssertUnwindSafe(|| notify())).is_err() {
                warn!("observer notify panicked; continuing");
            }
        }

        let event = match shared.queue.next() {
            Ok(event) => event,
            Err(QueueError::Interrupted) => {
                if shared.interrupt.load(Ordering::SeqCst) {
                    debug!("exiting event loop on interrupt");
                } else {
                    error!("event queue stopped without a local interrupt");
                }
                break;
            }
        };

        let mut machine = shared.machine.lock();
        match machine.dispatch(&event) {
            Ok(Dispatch::Unhandled) => {
                shared.processed.fetch_add(1, Ordering::Relaxed);
                if warn_unhandled {
                    warn!(
                        machine = %machine.name(),
                        event = event.id,
                        "unhandled event discarded"
                    );
                } else {
                    debug!(
                        machine = %machine.name(),
                        event = event.id,
                        "unhandled event discarded"
                    );
                }
            }
            Ok(_) => {
                shared.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(machine = %machine.name(), error = %e, "dispatch fault; stopping worker");
                shared.queue.stop();
                shared.interrupt.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
    debug!("worker exited");
}
