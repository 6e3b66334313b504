//! Session handshake and `session.*` helpers.
//!
//! # Handshake
//!
//! 1. `session.status` probe (failure logged and ignored)
//! 2. `session.new` negotiation
//! 3. Synthetic `bidi-xxxxxxxx` id when negotiation fails or returns no id
//!
//! Only a closed connection aborts the handshake.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

use super::Connection;

// ============================================================================
// Types
// ============================================================================

/// Result of `session.status`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStatus {
    /// Whether the remote end accepts a new session.
    #[serde(default)]
    pub ready: bool,
    /// Implementation-defined status message.
    #[serde(default)]
    pub message: String,
}

/// Result of `session.new`; only the id is used.
#[derive(Debug, Deserialize)]
struct NewSessionResult {
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
}

/// Result of `session.subscribe`.
#[derive(Debug, Deserialize)]
struct SubscribeResult {
    #[serde(default)]
    subscription: Option<String>,
}

/// An event subscription held by the remote end.
///
/// Keeps the subscribed events so [`Connection::unsubscribe`] can fall
/// back to unsubscribing by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSubscription {
    /// Subscription id from the remote end, or the command id when the
    /// remote end did not return one.
    pub id: String,
    /// Subscribed event names or modules.
    pub events: Vec<String>,
    /// Browsing contexts the subscription is limited to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<String>>,
}

// ============================================================================
// Connection - Session
// ============================================================================

impl Connection {
    /// Queries `session.status`.
    ///
    /// # Errors
    ///
    /// Any error from [`send_and_wait`](Self::send_and_wait).
    pub async fn session_status(&self) -> Result<SessionStatus> {
        let command = self.command("session.status", json!({}))?;
        self.send_and_wait_default(command).await
    }

    /// Establishes a session and stores its id.
    ///
    /// Probes `session.status`, then negotiates with `session.new`. When
    /// negotiation is unsupported or returns no id, a synthetic id is used
    /// so callers can proceed uniformly.
    ///
    /// # Arguments
    ///
    /// * `browser_name` - Optional `browserName` capability
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection closes during
    /// the handshake. All other failures degrade to a synthetic id.
    pub async fn establish_session(&self, browser_name: Option<&str>) -> Result<SessionId> {
        if !self.is_connected() {
            return Err(Error::ConnectionClosed);
        }

        match self.session_status().await {
            Ok(status) => {
                debug!(ready = status.ready, message = %status.message, "session.status OK");
            }
            Err(Error::ConnectionClosed) => return Err(Error::ConnectionClosed),
            Err(e) => warn!(error = %e, "session.status failed, continuing"),
        }

        let capabilities = match browser_name {
            Some(name) => json!({ "alwaysMatch": { "browserName": name } }),
            None => json!({}),
        };
        let command = self.command("session.new", json!({ "capabilities": capabilities }))?;

        let session_id = match self.send_and_wait_default::<NewSessionResult>(command).await {
            Ok(NewSessionResult {
                session_id: Some(id),
            }) if !id.is_empty() => {
                info!(session_id = %id, "session.new succeeded");
                SessionId::new(id)
            }
            Ok(_) => {
                let id = SessionId::synthetic();
                warn!(session_id = %id, "session.new returned no sessionId, using synthetic id");
                id
            }
            Err(Error::ConnectionClosed) => return Err(Error::ConnectionClosed),
            Err(e) => {
                let id = SessionId::synthetic();
                info!(error = %e, session_id = %id, "session.new unsupported, using synthetic id");
                id
            }
        };

        *self.inner.session_id.write() = Some(session_id.clone());
        Ok(session_id)
    }

    /// Adopts a known session id without negotiation.
    pub fn reconnect(&self, session_id: SessionId) {
        info!(%session_id, "Adopting existing session");
        *self.inner.session_id.write() = Some(session_id);
    }

    /// Ends the session with `session.end` and forgets its id.
    ///
    /// # Errors
    ///
    /// Any error from [`send_and_wait`](Self::send_and_wait).
    pub async fn end_session(&self) -> Result<()> {
        let command = self.command("session.end", json!({}))?;
        let _: Value = self.send_and_wait_default(command).await?;
        self.inner.session_id.write().take();
        debug!("Session ended");
        Ok(())
    }

    /// Asks the remote end to start emitting events.
    ///
    /// # Arguments
    ///
    /// * `events` - Event names (`log.entryAdded`) or modules (`network`)
    /// * `contexts` - Optional browsing context ids to limit the subscription
    ///
    /// # Errors
    ///
    /// Any error from [`send_and_wait`](Self::send_and_wait).
    pub async fn subscribe(
        &self,
        events: impl IntoIterator<Item = impl Into<String>>,
        contexts: Option<Vec<String>>,
    ) -> Result<SessionSubscription> {
        let events: Vec<String> = events.into_iter().map(Into::into).collect();

        let mut params = json!({ "events": events });
        if let Some(contexts) = &contexts {
            params["contexts"] = json!(contexts);
        }

        let command = self.command("session.subscribe", params)?;
        let command_id = command.id;
        let result: SubscribeResult = self.send_and_wait_default(command).await?;

        let id = result
            .subscription
            .unwrap_or_else(|| command_id.to_string());
        debug!(subscription = %id, ?events, "Subscribed");

        Ok(SessionSubscription {
            id,
            events,
            contexts,
        })
    }

    /// Removes a remote event subscription.
    ///
    /// Unsubscribes by id first; if the remote end rejects that, retries
    /// by event names.
    ///
    /// # Errors
    ///
    /// Any error from the by-name attempt, or a non-protocol error from
    /// the by-id attempt.
    pub async fn unsubscribe(&self, subscription: &SessionSubscription) -> Result<()> {
        let command = self.command(
            "session.unsubscribe",
            json!({ "subscriptions": [subscription.id] }),
        )?;

        match self.send_and_wait_default::<Value>(command).await {
            Ok(_) => {
                debug!(subscription = %subscription.id, "Unsubscribed by id");
                Ok(())
            }
            Err(e) if e.is_protocol_error() => {
                debug!(error = %e, "Unsubscribe by id rejected, retrying by event names");

                let mut params = json!({ "events": subscription.events });
                if let Some(contexts) = &subscription.contexts {
                    params["contexts"] = json!(contexts);
                }
                let command = self.command("session.unsubscribe", params)?;
                let _: Value = self.send_and_wait_default(command).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
