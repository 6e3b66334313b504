//! Connection handle and lifecycle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Sink, Stream};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::dispatch::{CorrelationDispatcher, EventDispatcher, route_frame};
use crate::error::Result;
use crate::identifiers::{CommandIdSequence, SessionId};
use crate::protocol::{Command, Event, EventFilter};
use crate::transport::{Subscription, TrafficSnapshot, Transport};
use crate::watchdog::{CongestionWarning, Probe, spawn_watchdog};

use super::builder::ConnectionBuilder;
use super::options::ConnectionOptions;

// ============================================================================
// Constants
// ============================================================================

/// Buffered congestion warnings per receiver.
const CONGESTION_CHANNEL_CAPACITY: usize = 16;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a connection.
pub(crate) struct ConnectionInner {
    /// Endpoint, when opened through the builder.
    pub url: Option<Url>,
    /// Tunables fixed at construction.
    pub options: ConnectionOptions,
    /// WebSocket transport.
    pub transport: Transport,
    /// Pending-command map.
    pub correlation: Arc<CorrelationDispatcher>,
    /// Event worker.
    pub events: Arc<EventDispatcher>,
    /// Command id source.
    pub ids: CommandIdSequence,
    /// Session established by the handshake.
    pub session_id: RwLock<Option<SessionId>>,
    /// Watchdog task, taken on shutdown.
    watchdog: Mutex<Option<JoinHandle<()>>>,
    /// Congestion warning fan-out.
    congestion_tx: broadcast::Sender<CongestionWarning>,
    /// Set once by `shutdown`.
    shut_down: AtomicBool,
}

impl ConnectionInner {
    fn probe(&self) -> Probe {
        let traffic = self.transport.traffic();
        Probe {
            messages_received: traffic.messages_received,
            messages_sent: traffic.messages_sent,
            last_received_at: traffic.last_received_at,
            pending: self.correlation.pending_count(),
            connected: self.transport.is_connected(),
        }
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(watchdog) = self.watchdog.lock().take() {
            watchdog.abort();
        }
        self.transport.close();
        self.events.shutdown();
        let failed = self.correlation.fail_all();

        info!(failed, "Connection shut down");
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        // Last handle gone; nothing can await the pending entries any more.
        self.shutdown();
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A handle to one BiDi connection.
///
/// Owns the transport, the correlation and event dispatchers and the
/// congestion watchdog. Cheap to clone; all clones share the same socket.
/// The connection shuts down on [`shutdown`](Self::shutdown), when the
/// remote end closes the socket, or when the last clone is dropped.
///
/// # Example
///
/// ```no_run
/// # use webdriver_bidi::Connection;
/// # use serde_json::{Value, json};
/// # async fn example() -> webdriver_bidi::Result<()> {
/// let connection = Connection::connect("ws://127.0.0.1:9222/session").await?;
/// let session_id = connection.establish_session(Some("firefox")).await?;
///
/// let command = connection.command("browsingContext.getTree", json!({}))?;
/// let tree: Value = connection.send_and_wait_default(command).await?;
///
/// connection.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    /// Shared inner state.
    pub(crate) inner: Arc<ConnectionInner>,
}

/// A non-owning handle to a [`Connection`].
///
/// Listeners that need to send commands should capture one of these
/// instead of a `Connection` clone; a strong handle stored in a listener
/// keeps the connection alive after every other handle is dropped.
///
/// # Example
///
/// ```ignore
/// let weak = connection.downgrade();
/// let _subscription = connection.on_event("network.beforeRequestSent", move |event| {
///     let Some(connection) = weak.upgrade() else { return };
///     if let Ok(command) = connection.command("network.continueRequest", &event.params) {
///         let _ = connection.send_fire_and_forget(command);
///     }
/// });
/// ```
#[derive(Clone)]
pub struct WeakConnection {
    inner: Weak<ConnectionInner>,
}

impl WeakConnection {
    /// Returns a strong handle while the connection is still alive.
    #[inline]
    #[must_use]
    pub fn upgrade(&self) -> Option<Connection> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }
}

impl fmt::Debug for WeakConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakConnection")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Connection - Display
// ============================================================================

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.url.as_ref().map(Url::as_str))
            .field("session_id", &*self.inner.session_id.read())
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Returns a builder for configuring a connection.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Connects to `url` with options from the environment.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) for an invalid URL or environment value
    /// - [`Error::ConnectionTimeout`](crate::Error::ConnectionTimeout) if the handshake is too slow
    /// - [`Error::Connection`](crate::Error::Connection) if the handshake fails
    pub async fn connect(url: &str) -> Result<Self> {
        ConnectionBuilder::new()
            .url(url)
            .options(ConnectionOptions::from_env()?)
            .connect()
            .await
    }

    /// Wraps an already-connected WebSocket.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if `options` are invalid
    /// - [`Error::Io`](crate::Error::Io) if the event worker cannot start
    pub fn from_stream<S>(stream: S, options: ConnectionOptions) -> Result<Self>
    where
        S: Stream<Item = std::result::Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Send
            + Unpin
            + 'static,
    {
        Self::attach(stream, options, None)
    }

    /// Wires dispatchers and watchdog onto a fresh transport.
    pub(crate) fn attach<S>(stream: S, options: ConnectionOptions, url: Option<Url>) -> Result<Self>
    where
        S: Stream<Item = std::result::Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Send
            + Unpin
            + 'static,
    {
        options.validate()?;

        let events = EventDispatcher::start()?;
        let transport = Transport::spawn(stream);
        let correlation = Arc::new(CorrelationDispatcher::new(transport.clone(), options.retry));

        {
            let correlation = Arc::clone(&correlation);
            let events = Arc::clone(&events);
            let _ = transport.on_frame_received(move |text| route_frame(text, &correlation, &events));
        }

        {
            let correlation = Arc::clone(&correlation);
            let events = Arc::clone(&events);
            let _ = transport.on_close(move |info| {
                if info.remote {
                    warn!(code = ?info.code, reason = %info.reason, "Connection closed by remote");
                }
                events.shutdown();
                correlation.fail_all();
            });
        }

        // Closed before the close listener was in place.
        if transport.is_closed() {
            events.shutdown();
            correlation.fail_all();
        }

        let (congestion_tx, _) = broadcast::channel(CONGESTION_CHANNEL_CAPACITY);

        let inner = Arc::new(ConnectionInner {
            url,
            options,
            transport,
            correlation,
            events,
            ids: CommandIdSequence::new(),
            session_id: RwLock::new(None),
            watchdog: Mutex::new(None),
            congestion_tx,
            shut_down: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let watchdog = spawn_watchdog(
            options.watchdog,
            move || weak.upgrade().map(|inner| inner.probe()),
            inner.congestion_tx.clone(),
        );
        *inner.watchdog.lock() = Some(watchdog);

        debug!(
            url = ?inner.url.as_ref().map(Url::as_str),
            retry = inner.correlation.retry_policy().is_enabled(),
            "Connection attached"
        );

        Ok(Self { inner })
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the endpoint URL, if connected through the builder.
    #[inline]
    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.inner.url.as_ref()
    }

    /// Returns the options in effect.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Returns `true` while commands can be sent.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Returns the session id set by the handshake or [`reconnect`](Self::reconnect).
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.session_id.read().clone()
    }

    /// Number of commands awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.correlation.pending_count()
    }

    /// Current traffic counters.
    #[inline]
    #[must_use]
    pub fn traffic(&self) -> TrafficSnapshot {
        self.inner.transport.traffic()
    }

    /// Returns the underlying transport, for frame-level listeners.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// Returns a non-owning handle for use inside listeners.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

// ============================================================================
// Connection - Commands and Events
// ============================================================================

impl Connection {
    /// Builds a command with the next id of this connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if `params` fail to serialize.
    pub fn command(&self, method: impl Into<String>, params: impl Serialize) -> Result<Command> {
        Command::with_params(self.inner.ids.next(), method, &params)
    }

    /// Registers an event listener.
    ///
    /// Listeners run on the event worker thread, in arrival order. The
    /// listener stays registered until [`Subscription::unsubscribe`] is
    /// called or the connection shuts down.
    ///
    /// A listener that captures a `Connection` clone keeps the connection
    /// alive, so dropping every other handle no longer shuts it down.
    /// Capture a [`WeakConnection`] from [`downgrade`](Self::downgrade)
    /// instead.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let subscription = connection.on_event("log.entryAdded", |event| {
    ///     println!("{}", event.params);
    /// });
    /// ```
    pub fn on_event(
        &self,
        filter: impl Into<EventFilter>,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.on(filter, handler)
    }

    /// Subscribes to congestion warnings from the watchdog.
    #[must_use]
    pub fn congestion_warnings(&self) -> broadcast::Receiver<CongestionWarning> {
        self.inner.congestion_tx.subscribe()
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Shuts the connection down. Idempotent.
    ///
    /// Stops sends, cancels the watchdog, stops the event worker and
    /// resolves every pending command with
    /// [`Error::ConnectionClosed`](crate::Error::ConnectionClosed).
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}
