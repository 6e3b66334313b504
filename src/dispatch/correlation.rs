//! Command/reply correlation.
//!
//! Maps an outgoing [`CommandId`] to the callback waiting for its reply.
//! Replies are resolved on the transport's reader task, in arrival order.
//!
//! # Entry Lifecycle
//!
//! 1. `register` - Inserted before the command frame is sent
//! 2. `resolve` - Error replies may be absorbed and the command resent
//! 3. Removed on terminal reply, caller timeout, or `fail_all`

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{Command, Response};
use crate::transport::Transport;

use super::retry::RetryPolicy;

// ============================================================================
// Types
// ============================================================================

/// Callback receiving the terminal outcome of one command.
///
/// Runs on the transport's reader task and must not block.
pub type ResponseCallback = Box<dyn FnOnce(Result<Reply>) + Send>;

/// Pending commands keyed by id.
type PendingMap = FxHashMap<CommandId, PendingEntry>;

// ============================================================================
// Reply
// ============================================================================

/// A terminal reply together with the frame it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Parsed reply.
    pub response: Response,
    /// Frame text exactly as received.
    pub frame: String,
}

// ============================================================================
// PendingEntry
// ============================================================================

/// One in-flight command.
struct PendingEntry {
    command: Command,
    callback: ResponseCallback,
}

impl fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEntry")
            .field("id", &self.command.id)
            .field("method", &self.command.method)
            .field("retry_count", &self.command.retry_count())
            .finish_non_exhaustive()
    }
}

/// What `resolve` decided while holding the lock.
enum Outcome {
    Retry { frame: Result<String>, attempt: u32 },
    Deliver(PendingEntry),
    Unknown,
}

// ============================================================================
// CorrelationDispatcher
// ============================================================================

/// Pending-command map plus retry policy.
///
/// The lock is never held while a callback runs or a frame is sent.
pub struct CorrelationDispatcher {
    pending: Mutex<PendingMap>,
    retry: RetryPolicy,
    transport: Transport,
}

impl fmt::Debug for CorrelationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationDispatcher")
            .field("pending", &self.pending_count())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl CorrelationDispatcher {
    /// Creates a dispatcher that resends through `transport`.
    #[must_use]
    pub fn new(transport: Transport, retry: RetryPolicy) -> Self {
        Self {
            pending: Mutex::new(PendingMap::default()),
            retry,
            transport,
        }
    }

    /// Returns the retry policy in effect.
    #[inline]
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Registers a command before it is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateCommand`] if the id is already pending.
    pub fn register(&self, command: Command, callback: ResponseCallback) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.contains_key(&command.id) {
            return Err(Error::DuplicateCommand {
                command_id: command.id,
            });
        }

        trace!(id = %command.id, method = %command.method, "Registered pending command");
        pending.insert(command.id, PendingEntry { command, callback });
        Ok(())
    }

    /// Removes a pending entry without calling its callback.
    ///
    /// Returns `true` if the entry existed.
    pub fn remove(&self, id: CommandId) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Returns `true` if `id` is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: CommandId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    /// Number of in-flight commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Handles one reply from the reader task.
    ///
    /// `frame` is the text the reply was parsed from.
    pub fn resolve(&self, response: Response, frame: &str) {
        let id = response.id();

        let outcome = {
            let mut pending = self.pending.lock();
            match pending.get_mut(&id) {
                None => Outcome::Unknown,

                Some(entry)
                    if response.is_error()
                        && self
                            .retry
                            .should_retry(entry.command.retry_count(), entry.command.age()) =>
                {
                    entry.command.increment_retry_count();
                    Outcome::Retry {
                        frame: entry.command.to_json(),
                        attempt: entry.command.retry_count(),
                    }
                }

                Some(_) => pending.remove(&id).map_or(Outcome::Unknown, Outcome::Deliver),
            }
        };

        match outcome {
            Outcome::Unknown => {
                debug!(%id, "Reply for unknown or expired command dropped");
            }

            Outcome::Retry { frame, attempt } => {
                if let Response::Error { error, .. } = &response {
                    debug!(%id, attempt, error = %error.error, "Error reply absorbed, resending");
                }

                if let Err(e) = frame.and_then(|frame| self.transport.send(frame)) {
                    warn!(%id, error = %e, "Resend failed");
                    self.fail(id, e);
                }
            }

            Outcome::Deliver(entry) => {
                trace!(%id, success = response.is_success(), "Delivering reply");
                Self::deliver(
                    entry,
                    Ok(Reply {
                        response,
                        frame: frame.to_string(),
                    }),
                );
            }
        }
    }

    /// Resolves one pending entry with `error`.
    ///
    /// Returns `false` if the entry was already gone.
    pub fn fail(&self, id: CommandId, error: Error) -> bool {
        let entry = self.pending.lock().remove(&id);
        match entry {
            Some(entry) => {
                Self::deliver(entry, Err(error));
                true
            }
            None => false,
        }
    }

    /// Resolves every pending entry with [`Error::ConnectionClosed`].
    ///
    /// Returns the number of entries resolved.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<PendingEntry> = self.pending.lock().drain().map(|(_, entry)| entry).collect();
        let count = drained.len();

        for entry in drained {
            Self::deliver(entry, Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending commands on shutdown");
        }
        count
    }

    fn deliver(entry: PendingEntry, outcome: Result<Reply>) {
        let PendingEntry { command, callback } = entry;
        if catch_unwind(AssertUnwindSafe(|| callback(outcome))).is_err() {
            error!(id = %command.id, method = %command.method, "Reply callback panicked");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
