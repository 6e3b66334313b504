//! WebDriver BiDi wire message types.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`Command`] | Local → Remote | Command request |
//! | [`Response`] | Remote → Local | Correlated reply (has `id`) |
//! | [`Event`] | Remote → Local | Unsolicited notification (no `id`) |
//!
//! The presence of `id` is the only discriminator between a reply and an
//! event; see [`parse_frame`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Outgoing command |
//! | `event` | Event and event filter |
//! | `response` | Success / error reply |

// ============================================================================
// Submodules
// ============================================================================

/// Outgoing command type.
pub mod command;

/// Event message types.
pub mod event;

/// Response message types.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use event::{Event, EventFilter};
pub use response::{RemoteError, Response};

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Frame
// ============================================================================

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Frame carried an `id`.
    Response(Response),
    /// Frame carried a `method` and no `id`.
    Event(Event),
}

/// Parses an inbound text frame.
///
/// An `id` of `null` counts as absent.
///
/// # Errors
///
/// Returns [`Error::MalformedFrame`] if the text is not a JSON object, or
/// if it carries neither `id` nor `method`.
pub fn parse_frame(text: &str) -> Result<Frame> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::malformed_frame(format!("invalid JSON: {e}")))?;

    let Value::Object(mut object) = value else {
        return Err(Error::malformed_frame("frame is not a JSON object"));
    };

    if object.get("id").is_some_and(|id| !id.is_null()) {
        return Response::from_object(object).map(Frame::Response);
    }

    let Some(Value::String(method)) = object.remove("method") else {
        return Err(Error::malformed_frame("frame has neither id nor method"));
    };
    let params = object.remove("params").unwrap_or(Value::Null);

    Ok(Frame::Event(Event { method, params }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::CommandId;

    #[test]
    fn test_frame_with_id_is_response() {
        let frame = parse_frame(r#"{"id":1,"type":"success","result":{}}"#).expect("parse");
        assert!(matches!(
            frame,
            Frame::Response(Response::Success { id, .. }) if id == CommandId::new(1)
        ));
    }

    #[test]
    fn test_frame_without_id_is_event() {
        let frame = parse_frame(
            r#"{"type":"event","method":"log.entryAdded","params":{"level":"info"}}"#,
        )
        .expect("parse");

        assert_eq!(
            frame,
            Frame::Event(Event::new("log.entryAdded", json!({ "level": "info" })))
        );
    }

    #[test]
    fn test_event_that_mentions_method_and_null_id() {
        let frame = parse_frame(r#"{"id":null,"method":"log.entryAdded","params":{}}"#)
            .expect("parse");
        assert!(matches!(frame, Frame::Event(_)));
    }

    #[test]
    fn test_error_with_null_id_is_malformed() {
        let err = parse_frame(
            r#"{"id":null,"type":"error","error":"invalid argument","message":"bad json"}"#,
        )
        .expect_err("no id, no method");
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            parse_frame("not json"),
            Err(Error::MalformedFrame { .. })
        ));
        assert!(matches!(
            parse_frame("[1,2,3]"),
            Err(Error::MalformedFrame { .. })
        ));
    }
}
