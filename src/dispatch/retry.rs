//! Retry policy for error replies.
//!
//! Retries keep going while *either* bound still has headroom; a command
//! is given up only once it has been retried `max_retry_count` times
//! **and** is older than `max_retry_window`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// RetryPolicy
// ============================================================================

/// Bounds for transparently resending a command after an error reply.
///
/// Disabled unless both bounds are set and positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resend budget.
    pub max_retry_count: Option<u32>,
    /// Age budget, measured from command creation.
    pub max_retry_window: Option<Duration>,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_retry_count: None,
            max_retry_window: None,
        }
    }

    /// A policy with both bounds set.
    #[inline]
    #[must_use]
    pub const fn new(max_retry_count: u32, max_retry_window: Duration) -> Self {
        Self {
            max_retry_count: Some(max_retry_count),
            max_retry_window: Some(max_retry_window),
        }
    }

    /// Returns `true` if retries are active.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(
            (self.max_retry_count, self.max_retry_window),
            (Some(count), Some(window)) if count > 0 && !window.is_zero()
        )
    }

    /// Decides whether an error reply should be absorbed and the command
    /// resent.
    ///
    /// # Arguments
    ///
    /// * `retry_count` - Resends already performed for the command
    /// * `age` - Time since the command was created
    #[must_use]
    pub fn should_retry(&self, retry_count: u32, age: Duration) -> bool {
        let (Some(max_count), Some(window)) = (self.max_retry_count, self.max_retry_window) else {
            return false;
        };
        if !self.is_enabled() {
            return false;
        }

        let count_exhausted = retry_count >= max_count;
        let window_exhausted = age >= window;

        !(count_exhausted && window_exhausted)
    }
}

// ============================================================================
// Tests
// ============================================================================
