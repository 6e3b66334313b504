//! WebSocket transport.
//!
//! Owns one physical connection. Frames are written by a writer task fed
//! from an unbounded queue, so [`Transport::send`] never awaits. Frames
//! are read by a single reader task which updates the traffic counters
//! and then notifies frame listeners, in arrival order.
//!
//! The transport never looks inside a frame.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

use super::counters::{TrafficCounters, TrafficSnapshot};
use super::listeners::{ListenerSet, Subscription};

// ============================================================================
// Constants
// ============================================================================

/// Characters of a frame shown in trace logs.
const PREVIEW_CHARS: usize = 200;

// ============================================================================
// CloseInfo
// ============================================================================

/// Why the transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// `true` if the remote end (or the socket) initiated the close.
    pub remote: bool,
    /// WebSocket close code, if a close frame was received.
    pub code: Option<u16>,
    /// Close reason or error description.
    pub reason: String,
}

impl CloseInfo {
    fn local() -> Self {
        Self {
            remote: false,
            code: None,
            reason: "closed locally".to_string(),
        }
    }

    fn remote(frame: Option<CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self {
                remote: true,
                code: Some(u16::from(frame.code)),
                reason: frame.reason.as_str().to_string(),
            },
            None => Self {
                remote: true,
                code: None,
                reason: "closed by remote".to_string(),
            },
        }
    }

    fn failure(reason: impl Into<String>) -> Self {
        Self {
            remote: true,
            code: None,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// TransportInner
// ============================================================================

/// State shared by the handle, the reader task and the writer task.
struct TransportInner {
    /// Queue drained by the writer task.
    outbound: mpsc::UnboundedSender<Message>,
    /// Set once, by whichever side closes first.
    closed: AtomicBool,
    /// Tells the reader task to stop.
    shutdown_tx: watch::Sender<bool>,
    counters: TrafficCounters,
    on_frame_received: ListenerSet<str>,
    on_frame_sent: ListenerSet<str>,
    on_close: ListenerSet<CloseInfo>,
    on_socket_error: ListenerSet<str>,
}

impl TransportInner {
    fn handle_frame(&self, text: &str) {
        let seq = self.counters.record_received();
        trace!(seq, len = text.len(), frame = %preview(text), "← IN");

        let panicked = self.on_frame_received.notify(text);
        if panicked > 0 {
            error!(seq, panicked, "Frame listener panicked");
            self.on_socket_error
                .notify("Error processing WebSocket message: listener panicked");
        }
    }

    fn report_error(&self, message: &str) {
        self.on_socket_error.notify(message);
    }

    /// Marks the transport closed and notifies close listeners once.
    fn close(&self, info: CloseInfo) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.outbound.send(Message::Close(None));
        let _ = self.shutdown_tx.send(true);

        debug!(remote = info.remote, code = ?info.code, reason = %info.reason, "Transport closed");
        self.on_close.notify(&info);

        self.on_frame_received.clear();
        self.on_frame_sent.clear();
        self.on_close.clear();
        self.on_socket_error.clear();
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Handle to one WebSocket connection.
///
/// Cheap to clone; all clones share the same socket.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("closed", &self.is_closed())
            .field("traffic", &self.traffic())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Takes ownership of a connected WebSocket and spawns its reader and
    /// writer tasks.
    ///
    /// Any `tokio_tungstenite::WebSocketStream` satisfies the bounds.
    /// Must be called inside a tokio runtime.
    pub fn spawn<S>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Send
            + Unpin
            + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(TransportInner {
            outbound,
            closed: AtomicBool::new(false),
            shutdown_tx,
            counters: TrafficCounters::new(),
            on_frame_received: ListenerSet::default(),
            on_frame_sent: ListenerSet::default(),
            on_close: ListenerSet::default(),
            on_socket_error: ListenerSet::default(),
        });

        let (write, read) = stream.split();

        tokio::spawn(Self::run_writer(write, outbound_rx, Arc::clone(&inner)));
        tokio::spawn(Self::run_reader(read, shutdown_rx, Arc::clone(&inner)));

        Self { inner }
    }

    /// Queues a text frame for sending.
    ///
    /// Counters are updated before the frame is queued, then frame-sent
    /// listeners are notified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] after [`close`](Self::close) or
    /// after the remote end closed the socket.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let frame = Utf8Bytes::from(text.into());
        let seq = self.inner.counters.record_sent();
        trace!(seq, len = frame.len(), frame = %preview(frame.as_str()), "→ OUT");

        self.inner
            .outbound
            .send(Message::Text(frame.clone()))
            .map_err(|_| Error::ConnectionClosed)?;

        self.inner.on_frame_sent.notify(frame.as_str());
        Ok(())
    }

    /// Closes the connection. Idempotent.
    pub fn close(&self) {
        self.inner.close(CloseInfo::local());
    }

    /// Returns `true` once the transport is closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns `true` while frames can still be sent.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.is_closed()
    }

    /// Current traffic counters.
    #[inline]
    #[must_use]
    pub fn traffic(&self) -> TrafficSnapshot {
        self.inner.counters.snapshot()
    }

    // ------------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------------

    /// Registers a callback for every inbound text frame.
    ///
    /// Runs on the reader task and must not block.
    ///
    /// The callback lives until unsubscribed or until the transport closes.
    /// Capturing a strong [`Connection`](crate::Connection) keeps that
    /// connection alive; capture a [`WeakConnection`](crate::WeakConnection)
    /// instead.
    pub fn on_frame_received(&self, handler: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
        self.inner.on_frame_received.add(Arc::new(handler))
    }

    /// Registers a callback for every frame handed to the writer.
    ///
    /// The callback lives until unsubscribed or until the transport closes.
    /// Capturing a strong [`Connection`](crate::Connection) keeps that
    /// connection alive; capture a [`WeakConnection`](crate::WeakConnection)
    /// instead.
    pub fn on_frame_sent(&self, handler: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
        self.inner.on_frame_sent.add(Arc::new(handler))
    }

    /// Registers a callback invoked once when the transport closes.
    ///
    /// The callback lives until unsubscribed or until the transport closes.
    /// Capturing a strong [`Connection`](crate::Connection) keeps that
    /// connection alive; capture a [`WeakConnection`](crate::WeakConnection)
    /// instead.
    pub fn on_close(&self, handler: impl Fn(&CloseInfo) + Send + Sync + 'static) -> Subscription {
        self.inner.on_close.add(Arc::new(handler))
    }

    /// Registers a callback for socket errors and listener failures.
    ///
    /// The callback lives until unsubscribed or until the transport closes.
    /// Capturing a strong [`Connection`](crate::Connection) keeps that
    /// connection alive; capture a [`WeakConnection`](crate::WeakConnection)
    /// instead.
    pub fn on_socket_error(&self, handler: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
        self.inner.on_socket_error.add(Arc::new(handler))
    }

    // ------------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------------

    /// Reads frames until the socket ends or the transport is closed.
    async fn run_reader<R>(mut read: R, mut shutdown_rx: watch::Receiver<bool>, inner: Arc<TransportInner>)
    where
        R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    {
        let info = loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    break CloseInfo::local();
                }

                message = read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => inner.handle_frame(text.as_str()),

                        Some(Ok(Message::Close(frame))) => {
                            debug!("WebSocket closed by remote");
                            break CloseInfo::remote(frame);
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            let message = format!("WebSocket error occurred: {e}");
                            inner.report_error(&message);
                            break CloseInfo::failure(message);
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break CloseInfo::failure("stream ended");
                        }

                        // Ignore Binary, Ping, Pong, raw Frame
                        Some(Ok(_)) => {}
                    }
                }
            }
        };

        inner.close(info);
        debug!("Reader task terminated");
    }

    /// Drains the outbound queue into the socket.
    async fn run_writer<W>(
        mut write: W,
        mut outbound_rx: mpsc::UnboundedReceiver<Message>,
        inner: Arc<TransportInner>,
    ) where
        W: Sink<Message, Error = WsError> + Unpin,
    {
        while let Some(message) = outbound_rx.recv().await {
            let is_close = matches!(message, Message::Close(_));

            if let Err(e) = write.send(message).await {
                if is_close {
                    debug!(error = %e, "Close frame not delivered");
                } else {
                    warn!(error = %e, "Failed to write frame");
                    let message = format!("WebSocket write failed: {e}");
                    inner.report_error(&message);
                    inner.close(CloseInfo::failure(message));
                }
                break;
            }

            if is_close {
                break;
            }
        }

        let _ = write.close().await;
        debug!("Writer task terminated");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Truncates a frame for logging.
fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}... ({} chars)", &text[..cut], text.chars().count()),
        None => text.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
