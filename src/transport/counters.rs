//! Lock-free traffic counters.
//!
//! Written only by the transport's read and write paths, read by the
//! congestion watchdog and by anyone holding a [`TrafficSnapshot`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::{Duration, Instant};

// ============================================================================
// Constants
// ============================================================================

/// Sentinel for "no frame yet".
const NEVER: u64 = u64::MAX;

// ============================================================================
// TrafficCounters
// ============================================================================

/// Message counts and last-activity timestamps for one transport.
///
/// Timestamps are stored as nanosecond offsets from the counter's
/// creation so they fit in an atomic.
#[derive(Debug)]
pub(crate) struct TrafficCounters {
    origin: Instant,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    last_received: AtomicU64,
    last_sent: AtomicU64,
}

impl TrafficCounters {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            last_received: AtomicU64::new(NEVER),
            last_sent: AtomicU64::new(NEVER),
        }
    }

    /// Records one inbound frame, returning its sequence number.
    pub(crate) fn record_received(&self) -> u64 {
        self.last_received.store(self.offset_now(), Ordering::Release);
        self.messages_received.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Records one outbound frame, returning its sequence number.
    pub(crate) fn record_sent(&self) -> u64 {
        self.last_sent.store(self.offset_now(), Ordering::Release);
        self.messages_sent.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Reads a consistent-enough view for monitoring.
    pub(crate) fn snapshot(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            messages_received: self.messages_received.load(Ordering::Acquire),
            messages_sent: self.messages_sent.load(Ordering::Acquire),
            last_received_at: self.instant_of(self.last_received.load(Ordering::Acquire)),
            last_sent_at: self.instant_of(self.last_sent.load(Ordering::Acquire)),
        }
    }

    fn offset_now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(NEVER - 1)
    }

    fn instant_of(&self, offset: u64) -> Option<Instant> {
        (offset != NEVER).then(|| self.origin + Duration::from_nanos(offset))
    }
}

// ============================================================================
// TrafficSnapshot
// ============================================================================

/// Point-in-time copy of the traffic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficSnapshot {
    /// Frames received since the connection opened.
    pub messages_received: u64,
    /// Frames sent since the connection opened.
    pub messages_sent: u64,
    /// When the last frame arrived.
    pub last_received_at: Option<Instant>,
    /// When the last frame was sent.
    pub last_sent_at: Option<Instant>,
}

// ============================================================================
// Tests
// ============================================================================
