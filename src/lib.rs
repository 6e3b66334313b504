//! WebDriver BiDi - Command correlation and event dispatch engine.
//!
//! This library multiplexes caller-issued commands and server-pushed
//! events over a single WebDriver BiDi WebSocket connection.
//!
//! # Architecture
//!
//! The engine follows a client-server model:
//!
//! - **Local End (Rust)**: Sends commands, receives replies and events
//! - **Remote End (browser)**: Executes commands, emits events
//!
//! Key design principles:
//!
//! - Every sent command yields exactly one terminal outcome to its caller
//! - Replies are correlated by `id` on the reader task, in arrival order
//! - Events run on their own worker thread and never delay replies
//! - Transient error replies can be retried without the caller noticing
//! - A watchdog observes (never repairs) stalled connections
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use serde_json::{Value, json};
//! use webdriver_bidi::{Connection, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connection = Connection::builder()
//!         .url("ws://127.0.0.1:9222/session")
//!         .connect()
//!         .await?;
//!
//!     // Status probe, session.new, synthetic id fallback
//!     let session_id = connection.establish_session(Some("firefox")).await?;
//!     println!("Session: {session_id}");
//!
//!     let _logs = connection.on_event("log.entryAdded", |event| {
//!         println!("log: {}", event.params);
//!     });
//!     connection.subscribe(["log.entryAdded"], None).await?;
//!
//!     let command = connection.command("browsingContext.getTree", json!({}))?;
//!     let tree: Value = connection.send_and_wait(command, Duration::from_secs(5)).await?;
//!     println!("{tree}");
//!
//!     connection.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | [`Connection`] façade, builder, options, handshake |
//! | [`dispatch`] | Reply correlation, retry policy, event worker |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | WebSocket transport and traffic counters |
//! | [`watchdog`] | Congestion watchdog |

// ============================================================================
// Modules
// ============================================================================

/// Connection façade.
///
/// Use [`Connection::builder()`] or [`Connection::connect`] to open one.
pub mod connection;

/// Reply correlation and event dispatch.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// WebDriver BiDi wire message types.
pub mod protocol;

/// WebSocket transport layer.
pub mod transport;

/// Congestion watchdog.
pub mod watchdog;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{
    Connection, ConnectionBuilder, ConnectionOptions, SessionStatus, SessionSubscription,
    WeakConnection,
};

// Dispatch types
pub use dispatch::{Reply, ResponseCallback, RetryPolicy};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, ListenerId, SessionId};

// Protocol types
pub use protocol::{Command, Event, EventFilter, RemoteError, Response};

// Transport types
pub use transport::{CloseInfo, Subscription, TrafficSnapshot, Transport};

// Watchdog types
pub use watchdog::{CongestionWarning, WatchdogConfig};
