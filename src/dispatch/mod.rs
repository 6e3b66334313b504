//! Inbound frame routing.
//!
//! Every frame read by the transport goes through [`route_frame`]:
//!
//! ```text
//! Transport reader ──► route_frame ──┬── id present ──► CorrelationDispatcher (reader task)
//!                                    └── id absent  ──► EventDispatcher (worker thread)
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `correlation` | Pending-command map and reply delivery |
//! | `events` | Event queue and worker thread |
//! | `retry` | Retry policy for error replies |

// ============================================================================
// Submodules
// ============================================================================

/// Pending-command map.
pub mod correlation;

/// Event worker.
pub mod events;

/// Retry policy.
pub mod retry;

// ============================================================================
// Re-exports
// ============================================================================

pub use correlation::{CorrelationDispatcher, Reply, ResponseCallback};
pub use events::EventDispatcher;
pub use retry::RetryPolicy;

// ============================================================================
// Imports
// ============================================================================

use tracing::warn;

use crate::protocol::{Frame, parse_frame};

// ============================================================================
// Routing
// ============================================================================

/// Routes one inbound frame. Malformed frames are logged and dropped.
pub(crate) fn route_frame(text: &str, correlation: &CorrelationDispatcher, events: &EventDispatcher) {
    match parse_frame(text) {
        Ok(Frame::Response(response)) => correlation.resolve(response, text),
        Ok(Frame::Event(event)) => {
            events.enqueue(event);
        }
        Err(e) => warn!(error = %e, len = text.len(), "Dropping unparseable frame"),
    }
}
