//! Connection tunables.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use webdriver_bidi::ConnectionOptions;
//!
//! let options = ConnectionOptions::new()
//!     .with_command_timeout(Duration::from_secs(10))
//!     .with_retry(3, Duration::from_secs(5))
//!     .with_heartbeat();
//! ```
//!
//! # Environment
//!
//! | Variable | Default | Field |
//! |----------|---------|-------|
//! | `BIDI_COMMAND_TIMEOUT_SECS` | 45 | `command_timeout` |
//! | `BIDI_CONNECT_TIMEOUT_SECS` | 30 | `connect_timeout` |
//! | `BIDI_RETRY_MAX_COUNT` | unset | `retry.max_retry_count` |
//! | `BIDI_RETRY_WINDOW_MS` | unset | `retry.max_retry_window` |
//! | `BIDI_WATCHDOG_INTERVAL_MS` | 5000 | `watchdog.check_interval` |
//! | `BIDI_WATCHDOG_THRESHOLD_MS` | 10000 | `watchdog.silence_threshold` |
//! | `BIDI_WATCHDOG_HEARTBEAT` | false | `watchdog.heartbeat` |

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::dispatch::RetryPolicy;
use crate::error::{Error, Result};
use crate::watchdog::WatchdogConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for `send_and_wait`.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(45);

/// Default deadline for opening the WebSocket.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_COMMAND_TIMEOUT: &str = "BIDI_COMMAND_TIMEOUT_SECS";
const ENV_CONNECT_TIMEOUT: &str = "BIDI_CONNECT_TIMEOUT_SECS";
const ENV_RETRY_COUNT: &str = "BIDI_RETRY_MAX_COUNT";
const ENV_RETRY_WINDOW: &str = "BIDI_RETRY_WINDOW_MS";
const ENV_WATCHDOG_INTERVAL: &str = "BIDI_WATCHDOG_INTERVAL_MS";
const ENV_WATCHDOG_THRESHOLD: &str = "BIDI_WATCHDOG_THRESHOLD_MS";
const ENV_WATCHDOG_HEARTBEAT: &str = "BIDI_WATCHDOG_HEARTBEAT";

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Tunables for one [`Connection`](super::Connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Default deadline for blocking requests.
    pub command_timeout: Duration,

    /// Deadline for the WebSocket handshake.
    pub connect_timeout: Duration,

    /// Retry policy for error replies.
    pub retry: RetryPolicy,

    /// Congestion watchdog settings.
    pub watchdog: WatchdogConfig,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings and retries disabled.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry: RetryPolicy::disabled(),
            watchdog: WatchdogConfig::default(),
        }
    }

    /// Reads options from `BIDI_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads options through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a present value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::new();

        if let Some(secs) = parse::<u64>(&lookup, ENV_COMMAND_TIMEOUT)? {
            options.command_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, ENV_CONNECT_TIMEOUT)? {
            options.connect_timeout = Duration::from_secs(secs);
        }

        // Non-positive retry bounds disable retries.
        options.retry = RetryPolicy {
            max_retry_count: parse::<i64>(&lookup, ENV_RETRY_COUNT)?
                .filter(|count| *count > 0)
                .map(|count| u32::try_from(count).unwrap_or(u32::MAX)),
            max_retry_window: parse::<i64>(&lookup, ENV_RETRY_WINDOW)?
                .filter(|ms| *ms > 0)
                .map(|ms| Duration::from_millis(ms.unsigned_abs())),
        };

        if let Some(ms) = parse::<u64>(&lookup, ENV_WATCHDOG_INTERVAL)? {
            options.watchdog.check_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&lookup, ENV_WATCHDOG_THRESHOLD)? {
            options.watchdog.silence_threshold = Duration::from_millis(ms);
        }
        if let Some(heartbeat) = parse::<bool>(&lookup, ENV_WATCHDOG_HEARTBEAT)? {
            options.watchdog.heartbeat = heartbeat;
        }

        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the default blocking-request deadline.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the WebSocket handshake deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enables retries of error replies.
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, max_retry_count: u32, max_retry_window: Duration) -> Self {
        self.retry = RetryPolicy::new(max_retry_count, max_retry_window);
        self
    }

    /// Sets the retry policy.
    #[inline]
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the watchdog tick period.
    #[inline]
    #[must_use]
    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog.check_interval = interval;
        self
    }

    /// Sets the silence that triggers a congestion warning.
    #[inline]
    #[must_use]
    pub fn with_silence_threshold(mut self, threshold: Duration) -> Self {
        self.watchdog.silence_threshold = threshold;
        self
    }

    /// Enables the watchdog throughput heartbeat.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self) -> Self {
        self.watchdog.heartbeat = true;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero timeouts or an invalid watchdog
    /// config.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout.is_zero() {
            return Err(Error::config("command timeout must be positive"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect timeout must be positive"));
        }
        self.watchdog.validate()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    raw.parse::<T>()
        .map(Some)
        .map_err(|e| Error::config(format!("{key}={raw:?}: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
