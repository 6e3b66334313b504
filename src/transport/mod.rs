//! WebSocket transport layer.
//!
//! This module owns the physical connection to the remote end. It moves
//! text frames in both directions and counts them, and it never parses
//! them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Connection     │                              │  Remote End     │
//! │                 │         WebSocket            │  (browser)      │
//! │  Transport      │◄────────────────────────────►│                 │
//! │  reader/writer  │       ws://host:port         │  BiDi server    │
//! │                 │                              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Transport Lifecycle
//!
//! 1. `Transport::spawn` - Take a connected socket, start reader and writer
//! 2. `Transport::on_frame_received` - Wire up the frame router
//! 3. `Transport::send` - Queue frames (never awaits)
//! 4. `Transport::close` - Close once; close listeners run, then all
//!    listener sets are cleared
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `counters` | Traffic counts and last-activity timestamps |
//! | `listeners` | Listener registry and [`Subscription`] handles |
//! | `socket` | Reader and writer tasks |

// ============================================================================
// Submodules
// ============================================================================

/// Traffic counters.
pub mod counters;

/// Listener registry.
pub mod listeners;

/// WebSocket reader and writer.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use counters::TrafficSnapshot;
pub use listeners::Subscription;
pub use socket::{CloseInfo, Transport};
