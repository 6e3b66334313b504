//! Listener registry with cancellation handles.
//!
//! Registering a callback returns a [`Subscription`]; calling
//! [`Subscription::unsubscribe`] removes exactly that callback. Dropping
//! the handle leaves the callback registered.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::identifiers::ListenerId;

// ============================================================================
// Types
// ============================================================================

/// Shared listener callback.
pub(crate) type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registered callbacks in registration order.
type Entries<T> = RwLock<Vec<(ListenerId, Callback<T>)>>;

// ============================================================================
// ListenerSet
// ============================================================================

/// Ordered set of callbacks notified with a borrowed value.
pub(crate) struct ListenerSet<T: ?Sized> {
    entries: Arc<Entries<T>>,
}

impl<T: ?Sized> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<T: ?Sized + 'static> ListenerSet<T> {
    /// Registers a callback.
    pub(crate) fn add(&self, callback: Callback<T>) -> Subscription {
        let id = ListenerId::next();
        self.entries.write().push((id, callback));

        let weak: Weak<Entries<T>> = Arc::downgrade(&self.entries);
        Subscription {
            id,
            remove: Box::new(move |id| {
                weak.upgrade().is_some_and(|entries| {
                    let mut entries = entries.write();
                    let before = entries.len();
                    entries.retain(|(entry_id, _)| *entry_id != id);
                    entries.len() != before
                })
            }),
        }
    }

    /// Calls every callback with `value`.
    ///
    /// Callbacks run outside the lock, so a callback may register or
    /// unsubscribe listeners. A panicking callback does not stop the
    /// others. Returns the number of callbacks that panicked.
    pub(crate) fn notify(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> = self
            .entries
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        snapshot
            .iter()
            .filter(|callback| catch_unwind(AssertUnwindSafe(|| callback(value))).is_err())
            .count()
    }

    /// Number of registered callbacks.
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Removes every callback.
    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle to a registered listener.
pub struct Subscription {
    id: ListenerId,
    remove: Box<dyn Fn(ListenerId) -> bool + Send + Sync>,
}

impl Subscription {
    /// Returns the listener id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes the listener.
    ///
    /// Returns `false` if it was already gone (e.g. the owning connection
    /// has shut down).
    pub fn unsubscribe(self) -> bool {
        (self.remove)(self.id)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_in_registration_order() {
        let set: ListenerSet<str> = ListenerSet::default();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            let _ = set.add(Arc::new(move |value: &str| {
                seen.lock().push(format!("{tag}:{value}"));
            }));
        }

        assert_eq!(set.notify("x"), 0);
        assert_eq!(*seen.lock(), vec!["a:x", "b:x", "c:x"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let set: ListenerSet<u32> = ListenerSet::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let first = {
            let hits = Arc::clone(&hits);
            set.add(Arc::new(move |_: &u32| {
                hits.fetch_add(1, Ordering::SeqCst);
            }))
        };
        let _second = {
            let hits = Arc::clone(&hits);
            set.add(Arc::new(move |_: &u32| {
                hits.fetch_add(10, Ordering::SeqCst);
            }))
        };

        assert!(first.unsubscribe());
        set.notify(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_unsubscribe_after_clear_returns_false() {
        let set: ListenerSet<u32> = ListenerSet::default();
        let subscription = set.add(Arc::new(|_: &u32| {}));
        set.clear();
        assert!(!subscription.unsubscribe());
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let set: ListenerSet<u32> = ListenerSet::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let _ = set.add(Arc::new(|_: &u32| panic!("listener failure")));
        let _ = {
            let hits = Arc::clone(&hits);
            set.add(Arc::new(move |_: &u32| {
                hits.fetch_add(1, Ordering::SeqCst);
            }))
        };

        assert_eq!(set.notify(&7), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_notify() {
        let set: ListenerSet<u32> = ListenerSet::default();
        let slot: Arc<parking_lot::Mutex<Option<Subscription>>> =
            Arc::new(parking_lot::Mutex::new(None));

        let subscription = {
            let slot = Arc::clone(&slot);
            set.add(Arc::new(move |_: &u32| {
                if let Some(subscription) = slot.lock().take() {
                    subscription.unsubscribe();
                }
            }))
        };
        *slot.lock() = Some(subscription);

        set.notify(&1);
        assert_eq!(set.len(), 0);
    }
}
