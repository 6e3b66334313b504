//! Event delivery on a dedicated worker thread.
//!
//! The reader task only enqueues; listeners run on the
//! `bidi-event-dispatch` thread in arrival order, so a slow listener can
//! delay other events but never a command reply.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::protocol::{Event, EventFilter};
use crate::transport::Subscription;
use crate::transport::listeners::ListenerSet;

// ============================================================================
// Constants
// ============================================================================

/// Name of the worker thread.
const WORKER_NAME: &str = "bidi-event-dispatch";

// ============================================================================
// EventDispatcher
// ============================================================================

/// Queue plus single consumer thread for unsolicited events.
pub struct EventDispatcher {
    listeners: ListenerSet<Event>,
    queue: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    stopped: Arc<AtomicBool>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Creates the dispatcher and starts its worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    pub fn start() -> Result<Arc<Self>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let stopped = Arc::new(AtomicBool::new(false));
        let listeners: ListenerSet<Event> = ListenerSet::default();

        let dispatcher = Arc::new(Self {
            listeners: listeners.clone(),
            queue: Mutex::new(Some(tx)),
            stopped: Arc::clone(&stopped),
        });

        thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    if stopped.load(Ordering::Acquire) {
                        break;
                    }

                    trace!(method = %event.method, "Dispatching event");
                    let panicked = listeners.notify(&event);
                    if panicked > 0 {
                        error!(method = %event.method, panicked, "Event listener panicked");
                    }
                }
                debug!("Event worker terminated");
            })
            .map_err(Error::Io)?;

        Ok(dispatcher)
    }

    /// Registers a listener for events passing `filter`.
    pub fn on(
        &self,
        filter: impl Into<EventFilter>,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Subscription {
        let filter = filter.into();
        self.listeners.add(Arc::new(move |event: &Event| {
            if filter.matches(event) {
                handler(event);
            }
        }))
    }

    /// Hands an event to the worker without waiting.
    ///
    /// Returns `false` if the dispatcher has been shut down.
    pub fn enqueue(&self, event: Event) -> bool {
        match self.queue.lock().as_ref() {
            Some(queue) => queue.send(event).is_ok(),
            None => {
                trace!(method = %event.method, "Event dropped after shutdown");
                false
            }
        }
    }

    /// Number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stops the worker and drops queued events. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.lock().take();
        self.listeners.clear();
        debug!("Event dispatcher stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================
