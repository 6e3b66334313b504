//! Command sending: callback, fire-and-forget and blocking forms.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::dispatch::{CorrelationDispatcher, Reply, ResponseCallback};
use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::Command;

use super::Connection;

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes a pending entry when the waiting future ends for any reason.
struct PendingGuard<'a> {
    correlation: &'a CorrelationDispatcher,
    id: CommandId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.correlation.remove(self.id) {
            trace!(id = %self.id, "Pending entry removed by waiter");
        }
    }
}

// ============================================================================
// Connection - Sending
// ============================================================================

impl Connection {
    /// Sends a command and hands its terminal outcome to `callback`.
    ///
    /// The callback runs on the transport's reader task and must not
    /// block. It is called exactly once if this method returns `Ok`, and
    /// never if it returns `Err`. A failed write after registration is
    /// delivered to the callback.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::Json`] if the command fails to serialize
    /// - [`Error::DuplicateCommand`] if the id is already pending
    pub fn send_with_callback(&self, command: Command, callback: ResponseCallback) -> Result<CommandId> {
        if !self.is_connected() {
            return Err(Error::ConnectionClosed);
        }

        let id = command.id;
        let frame = command.to_json()?;
        let correlation = &self.inner.correlation;

        // Register before sending so a fast reply always finds its entry.
        correlation.register(command, callback)?;

        if let Err(e) = self.inner.transport.send(frame) {
            debug!(%id, error = %e, "Send failed after registration");
            correlation.fail(id, e);
        }

        Ok(id)
    }

    /// Sends a command without waiting for, or correlating, its reply.
    ///
    /// A reply that does arrive is dropped as an unknown id.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::Json`] if the command fails to serialize
    pub fn send_fire_and_forget(&self, command: Command) -> Result<()> {
        trace!(id = %command.id, method = %command.method, "Fire-and-forget");
        self.inner.transport.send(command.to_json()?)
    }

    /// Sends a command and waits for the result, deserialized into `T`.
    ///
    /// # Arguments
    ///
    /// * `command` - Command from [`Connection::command`]
    /// * `request_timeout` - Maximum time to wait for a terminal reply
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] on a terminal error reply
    /// - [`Error::RequestTimeout`] if no terminal reply arrives in time
    /// - [`Error::ConnectionClosed`] if the connection closes first
    /// - [`Error::Json`] if `result` does not fit `T`
    pub async fn send_and_wait<T: DeserializeOwned>(
        &self,
        command: Command,
        request_timeout: Duration,
    ) -> Result<T> {
        let reply = self.wait_reply(command, request_timeout).await?;
        let result = reply.response.into_result()?;
        Ok(serde_json::from_value(result)?)
    }

    /// Same as [`send_and_wait`](Self::send_and_wait) with the configured
    /// command timeout (45s unless overridden).
    ///
    /// # Errors
    ///
    /// See [`send_and_wait`](Self::send_and_wait).
    pub async fn send_and_wait_default<T: DeserializeOwned>(&self, command: Command) -> Result<T> {
        self.send_and_wait(command, self.inner.options.command_timeout)
            .await
    }

    /// Sends a command and returns the reply frame text verbatim.
    ///
    /// # Errors
    ///
    /// Same as [`send_and_wait`](Self::send_and_wait), minus
    /// deserialization.
    pub async fn send_and_wait_raw(&self, command: Command, request_timeout: Duration) -> Result<String> {
        let reply = self.wait_reply(command, request_timeout).await?;
        reply.response.into_result()?;
        Ok(reply.frame)
    }

    /// Registers a oneshot waiter, sends, and awaits the terminal reply.
    ///
    /// Dropping the returned future removes the pending entry.
    async fn wait_reply(&self, command: Command, request_timeout: Duration) -> Result<Reply> {
        let id = command.id;
        let method = command.method.clone();

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_with_callback(
            command,
            Box::new(move |outcome| {
                let _ = reply_tx.send(outcome);
            }),
        )?;

        let _guard = PendingGuard {
            correlation: &self.inner.correlation,
            id,
        };

        match timeout(request_timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                debug!(%id, %method, timeout_ms = request_timeout.as_millis() as u64, "Command timed out");
                Err(Error::request_timeout(
                    id,
                    method,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }
}
