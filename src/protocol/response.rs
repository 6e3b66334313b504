//! Command response type.
//!
//! # Format
//!
//! Success:
//! ```json
//! { "id": 1, "type": "success", "result": { ... } }
//! ```
//!
//! Error:
//! ```json
//! {
//!   "id": 1,
//!   "type": "error",
//!   "error": "no such frame",
//!   "message": "...",
//!   "stacktrace": "..."
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

// ============================================================================
// Response
// ============================================================================

/// A correlated reply from the remote end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Response {
    /// Successful reply.
    Success {
        /// Matches the command `id`.
        id: CommandId,
        /// Result payload (`null` when omitted).
        result: Value,
    },

    /// Error reply.
    Error {
        /// Matches the command `id`.
        id: CommandId,
        /// Error detail from the remote end.
        #[serde(flatten)]
        error: RemoteError,
    },
}

impl Response {
    /// Returns the correlation id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CommandId {
        match self {
            Self::Success { id, .. } | Self::Error { id, .. } => *id,
        }
    }

    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Extracts the result value, converting an error reply into
    /// [`Error::Protocol`].
    pub fn into_result(self) -> Result<Value> {
        match self {
            Self::Success { result, .. } => Ok(result),
            Self::Error { id, error } => Err(error.into_error(id)),
        }
    }

    /// Re-serializes the full frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Builds a response from a parsed frame object that carries an `id`.
    ///
    /// Any `type` other than `"error"` is treated as success.
    pub(crate) fn from_object(object: Map<String, Value>) -> Result<Self> {
        let raw: RawResponse = serde_json::from_value(Value::Object(object))
            .map_err(|e| Error::malformed_frame(format!("invalid response: {e}")))?;

        if raw.kind.as_deref() == Some("error") {
            let error: RemoteError = serde_json::from_value(Value::Object(raw.rest))
                .map_err(|e| Error::malformed_frame(format!("invalid error response: {e}")))?;
            return Ok(Self::Error { id: raw.id, error });
        }

        Ok(Self::Success {
            id: raw.id,
            result: raw.result.unwrap_or(Value::Null),
        })
    }
}

/// Response frame before the success/error split.
#[derive(Deserialize)]
struct RawResponse {
    id: CommandId,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

// ============================================================================
// RemoteError
// ============================================================================

/// Error detail carried by an error reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error code, e.g. `invalid argument`.
    #[serde(default)]
    pub error: String,

    /// Error message.
    #[serde(default)]
    pub message: String,

    /// Remote stack trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,

    /// Any other fields the remote end attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteError {
    /// Converts into the typed crate error for `command_id`.
    #[must_use]
    pub fn into_error(self, command_id: CommandId) -> Error {
        let error = if self.error.is_empty() {
            "unknown error".to_string()
        } else {
            self.error
        };
        let message = if self.message.is_empty() {
            error.clone()
        } else {
            self.message
        };

        Error::Protocol {
            command_id,
            error,
            message,
            stacktrace: self.stacktrace,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
