//! Connection façade.
//!
//! A [`Connection`] aggregates the transport, both dispatchers and the
//! congestion watchdog, and owns the session handshake.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent [`ConnectionBuilder`] |
//! | `core` | Connection struct, wiring, accessors, shutdown |
//! | `options` | [`ConnectionOptions`] and environment parsing |
//! | `request` | Callback, fire-and-forget and blocking sends |
//! | `session` | Handshake and `session.*` helpers |
//!
//! # Example
//!
//! ```ignore
//! let connection = Connection::connect("ws://127.0.0.1:9222/session").await?;
//! connection.establish_session(None).await?;
//!
//! let _logs = connection.on_event("log.entryAdded", |event| {
//!     tracing::info!(params = %event.params, "log entry");
//! });
//! connection.subscribe(["log.entryAdded"], None).await?;
//!
//! let command = connection.command("browsingContext.getTree", json!({}))?;
//! let tree: Value = connection.send_and_wait(command, Duration::from_secs(5)).await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder.
pub mod builder;

mod core;

/// Connection tunables.
pub mod options;

mod request;
mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionBuilder;
pub use core::{Connection, WeakConnection};
pub use options::ConnectionOptions;
pub use session::{SessionStatus, SessionSubscription};
