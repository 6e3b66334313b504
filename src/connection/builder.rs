//! Builder pattern for connection configuration.
//!
//! Provides a fluent API for opening a [`Connection`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use webdriver_bidi::Connection;
//!
//! # async fn example() -> webdriver_bidi::Result<()> {
//! let connection = Connection::builder()
//!     .url("ws://127.0.0.1:9222/session")
//!     .command_timeout(Duration::from_secs(10))
//!     .retry(3, Duration::from_secs(5))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

use super::core::Connection;
use super::options::ConnectionOptions;

// ============================================================================
// ConnectionBuilder
// ============================================================================

/// Builder for opening a [`Connection`].
///
/// Use [`Connection::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ConnectionBuilder {
    /// WebSocket endpoint.
    url: Option<String>,
    /// Tunables.
    options: ConnectionOptions,
}

// ============================================================================
// ConnectionBuilder Implementation
// ============================================================================

impl ConnectionBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://` or `wss://` URL of the BiDi endpoint
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the default blocking-request deadline.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Sets the WebSocket handshake deadline.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Enables retries of error replies.
    #[inline]
    #[must_use]
    pub fn retry(mut self, max_retry_count: u32, max_retry_window: Duration) -> Self {
        self.options = self.options.with_retry(max_retry_count, max_retry_window);
        self
    }

    /// Sets the watchdog tick period.
    #[inline]
    #[must_use]
    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.options.watchdog.check_interval = interval;
        self
    }

    /// Sets the silence that triggers a congestion warning.
    #[inline]
    #[must_use]
    pub fn silence_threshold(mut self, threshold: Duration) -> Self {
        self.options.watchdog.silence_threshold = threshold;
        self
    }

    /// Enables the watchdog throughput heartbeat.
    #[inline]
    #[must_use]
    pub fn heartbeat(mut self) -> Self {
        self.options.watchdog.heartbeat = true;
        self
    }

    /// Opens the WebSocket and starts the connection.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing or invalid, or options are invalid
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds the connect timeout
    /// - [`Error::Connection`] if the handshake fails
    pub async fn connect(self) -> Result<Connection> {
        let url = self.validate_url()?;
        self.options.validate()?;

        debug!(%url, "Connecting");

        let connect_timeout = self.options.connect_timeout;
        let (stream, _response) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("WebSocket handshake with {url} failed: {e}")))?;

        info!(%url, "WebSocket connected");
        Connection::attach(stream, self.options, Some(url))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionBuilder {
    /// Validates the endpoint URL.
    fn validate_url(&self) -> Result<Url> {
        let raw = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "WebSocket URL is required. Use .url() to set it.\n\
                 Example: Connection::builder().url(\"ws://127.0.0.1:9222/session\")",
            )
        })?;

        let url = Url::parse(raw).map_err(|e| Error::config(format!("Invalid URL {raw:?}: {e}")))?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(Error::config(format!(
                "Unsupported URL scheme {scheme:?}; expected ws or wss"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
