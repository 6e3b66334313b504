//! Congestion watchdog.
//!
//! A periodic, purely observational check: when commands are outstanding
//! and nothing has arrived for longer than the silence threshold, a
//! [`CongestionWarning`] is logged and broadcast. The watchdog never
//! touches the pending map and never closes the connection; acting on
//! warnings is left to the owner of the [`Connection`](crate::Connection).
//!
//! # Silence Reference
//!
//! Silence is measured from the later of the last received frame and the
//! last *healthy* tick, i.e. the last tick that either saw new frames or
//! found nothing pending. Idle stretches therefore never count as silence.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default tick period.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(5000);

/// Default silence before warning.
pub const DEFAULT_SILENCE_THRESHOLD: Duration = Duration::from_millis(10_000);

// ============================================================================
// WatchdogConfig
// ============================================================================

/// Watchdog tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Time between ticks.
    pub check_interval: Duration,
    /// Silence with pending commands that triggers a warning.
    pub silence_threshold: Duration,
    /// Log throughput at `debug` on quiet ticks.
    pub heartbeat: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            heartbeat: false,
        }
    }
}

impl WatchdogConfig {
    /// Validates the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either duration is zero.
    pub fn validate(&self) -> Result<()> {
        if self.check_interval.is_zero() {
            return Err(Error::config("watchdog check interval must be positive"));
        }
        if self.silence_threshold.is_zero() {
            return Err(Error::config("watchdog silence threshold must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// Probe / Warning / Outcome
// ============================================================================

/// What the watchdog reads on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Total frames received.
    pub messages_received: u64,
    /// Total frames sent.
    pub messages_sent: u64,
    /// When the last frame arrived.
    pub last_received_at: Option<Instant>,
    /// Commands awaiting a reply.
    pub pending: usize,
    /// Whether the transport is still open.
    pub connected: bool,
}

/// Advisory health signal. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CongestionWarning {
    /// Time without inbound frames.
    pub silence: Duration,
    /// Commands awaiting a reply.
    pub pending: usize,
    /// Total frames received.
    pub messages_received: u64,
    /// Total frames sent.
    pub messages_sent: u64,
    /// Whether the transport was still open.
    pub connected: bool,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frames arrived since the previous tick.
    Healthy {
        /// Frames received since the previous tick.
        new_messages: u64,
        /// Time since the previous tick.
        elapsed: Duration,
    },
    /// Nothing arrived and nothing is pending.
    Idle,
    /// Commands pending, silence still under the threshold.
    Waiting {
        /// Time without inbound frames.
        silence: Duration,
    },
    /// Commands pending, silence at or over the threshold.
    Congested(CongestionWarning),
}

// ============================================================================
// CongestionWatchdog
// ============================================================================

/// Watchdog state machine, driven by [`evaluate`](Self::evaluate).
#[derive(Debug)]
pub struct CongestionWatchdog {
    config: WatchdogConfig,
    last_count: u64,
    last_tick: Instant,
    last_healthy: Instant,
}

impl CongestionWatchdog {
    /// Creates a watchdog whose first reference point is `now`.
    #[must_use]
    pub fn new(config: WatchdogConfig, now: Instant) -> Self {
        Self {
            config,
            last_count: 0,
            last_tick: now,
            last_healthy: now,
        }
    }

    /// Returns the config.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Evaluates one tick.
    pub fn evaluate(&mut self, probe: Probe, now: Instant) -> TickOutcome {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;

        if probe.messages_received != self.last_count {
            let new_messages = probe.messages_received.saturating_sub(self.last_count);
            self.last_count = probe.messages_received;
            self.last_healthy = now;
            return TickOutcome::Healthy {
                new_messages,
                elapsed,
            };
        }

        if probe.pending == 0 {
            self.last_healthy = now;
            return TickOutcome::Idle;
        }

        let reference = probe
            .last_received_at
            .map_or(self.last_healthy, |received| received.max(self.last_healthy));
        let silence = now.saturating_duration_since(reference);

        if silence < self.config.silence_threshold {
            return TickOutcome::Waiting { silence };
        }

        TickOutcome::Congested(CongestionWarning {
            silence,
            pending: probe.pending,
            messages_received: probe.messages_received,
            messages_sent: probe.messages_sent,
            connected: probe.connected,
        })
    }
}

// ============================================================================
// Task
// ============================================================================

/// Spawns the periodic watchdog task.
///
/// `probe` returns `None` once the owning connection is gone; the task
/// also stops when the probe reports the transport as closed.
pub(crate) fn spawn_watchdog<F>(
    config: WatchdogConfig,
    probe: F,
    warnings: broadcast::Sender<CongestionWarning>,
) -> JoinHandle<()>
where
    F: Fn() -> Option<Probe> + Send + 'static,
{
    tokio::spawn(async move {
        let start = Instant::now();
        let mut watchdog = CongestionWatchdog::new(config, start);
        let mut ticker = interval_at(start + config.check_interval, config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let now = ticker.tick().await;

            let tick = catch_unwind(AssertUnwindSafe(|| {
                let probe = probe()?;
                let outcome = watchdog.evaluate(probe, now);
                report(&config, &probe, &outcome, &warnings);
                Some(probe.connected)
            }));

            match tick {
                Ok(Some(true)) => {}
                Ok(Some(false) | None) => break,
                Err(_) => error!("Watchdog tick panicked"),
            }
        }

        debug!("Watchdog terminated");
    })
}

/// Logs and publishes the outcome of one tick.
fn report(
    config: &WatchdogConfig,
    probe: &Probe,
    outcome: &TickOutcome,
    warnings: &broadcast::Sender<CongestionWarning>,
) {
    match outcome {
        TickOutcome::Congested(warning) => {
            warn!(
                silence_ms = warning.silence.as_millis() as u64,
                pending = warning.pending,
                received = warning.messages_received,
                sent = warning.messages_sent,
                connected = warning.connected,
                "Connection congested: no frames while commands are pending"
            );
            // No subscribers is fine.
            let _ = warnings.send(warning.clone());
        }

        TickOutcome::Healthy {
            new_messages,
            elapsed,
        } if config.heartbeat => {
            let per_sec = if elapsed.is_zero() {
                0.0
            } else {
                *new_messages as f64 / elapsed.as_secs_f64()
            };
            debug!(
                new_messages,
                per_sec,
                pending = probe.pending,
                received = probe.messages_received,
                sent = probe.messages_sent,
                "Watchdog heartbeat"
            );
        }

        TickOutcome::Idle | TickOutcome::Waiting { .. } if config.heartbeat => {
            debug!(
                pending = probe.pending,
                received = probe.messages_received,
                sent = probe.messages_sent,
                "Watchdog heartbeat"
            );
        }

        _ => {}
    }
}

// ============================================================================
// Tests
// ============================================================================
