//! Outgoing command type.
//!
//! # Format
//!
//! ```json
//! {
//!   "id": 1,
//!   "method": "module.methodName",
//!   "params": { ... }
//! }
//! ```
//!
//! Retry bookkeeping (`retry_count`, `first_sent_at`) travels with the
//! command but is never serialized.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::Result;
use crate::identifiers::CommandId;

// ============================================================================
// Command
// ============================================================================

/// A command request from local end to remote end.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    /// Correlation id, unique per connection.
    pub id: CommandId,

    /// Method in `module.methodName` format.
    pub method: String,

    /// Method parameters.
    pub params: Value,

    /// Number of resends after transient error replies.
    #[serde(skip)]
    retry_count: u32,

    /// Creation time, the origin of the retry window.
    #[serde(skip)]
    first_sent_at: Instant,
}

impl Command {
    /// Creates a command with raw JSON params.
    ///
    /// `null` params are normalized to an empty object, which every BiDi
    /// endpoint accepts.
    #[must_use]
    pub fn new(id: CommandId, method: impl Into<String>, params: Value) -> Self {
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };

        Self {
            id,
            method: method.into(),
            params,
            retry_count: 0,
            first_sent_at: Instant::now(),
        }
    }

    /// Creates a command from any serializable params type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if params fail to serialize.
    pub fn with_params<P: Serialize>(
        id: CommandId,
        method: impl Into<String>,
        params: &P,
    ) -> Result<Self> {
        Ok(Self::new(id, method, serde_json::to_value(params)?))
    }

    /// Number of times this command has been resent.
    #[inline]
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// When the command was created.
    #[inline]
    #[must_use]
    pub fn first_sent_at(&self) -> Instant {
        self.first_sent_at
    }

    /// Time elapsed since the command was created.
    #[inline]
    #[must_use]
    pub fn age(&self) -> Duration {
        self.first_sent_at.elapsed()
    }

    /// Serializes the wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn increment_retry_count(&mut self) {
        self.retry_count += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================
