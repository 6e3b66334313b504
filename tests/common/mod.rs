//! In-process mock BiDi endpoint for integration tests.
//!
//! The mock accepts one WebSocket client. In scripted mode every command
//! the client sends is queued for [`MockEndpoint::next_command`] and the
//! test answers with [`MockEndpoint::send`]. With a responder, commands
//! are answered automatically and never queued.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

use webdriver_bidi::{Connection, ConnectionOptions};

// ============================================================================
// Types
// ============================================================================

/// Produces the frames to send back for one received command.
pub type Responder = Box<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

/// How long a test waits for the client before failing.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// MockEndpoint
// ============================================================================

/// A single-client BiDi server on a random localhost port.
pub struct MockEndpoint {
    url: String,
    commands: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl MockEndpoint {
    /// Starts a scripted endpoint.
    pub async fn start() -> Result<Self> {
        Self::spawn(None).await
    }

    /// Starts an endpoint that answers every command with `responder`.
    pub async fn with_responder(
        responder: impl Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    ) -> Result<Self> {
        Self::spawn(Some(Box::new(responder))).await
    }

    async fn spawn(responder: Option<Responder>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            let (mut write, mut read) = ws.split();

            loop {
                tokio::select! {
                    message = read.next() => {
                        let text = match message {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(_)) => continue,
                            _ => break,
                        };
                        let Ok(command) = serde_json::from_str::<Value>(text.as_str()) else {
                            continue;
                        };

                        match &responder {
                            Some(responder) => {
                                for frame in responder(&command) {
                                    if write.send(Message::Text(frame.to_string().into())).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            None => {
                                let _ = commands_tx.send(command);
                            }
                        }
                    }

                    message = outbound_rx.recv() => {
                        let Some(message) = message else { break };
                        let is_close = matches!(message, Message::Close(_));
                        if write.send(message).await.is_err() || is_close {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            url: format!("ws://127.0.0.1:{port}"),
            commands,
            outbound,
        })
    }

    /// Returns the WebSocket URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connects a client with `options`.
    pub async fn connect(&self, options: ConnectionOptions) -> Result<Connection> {
        Ok(Connection::builder()
            .url(self.url.clone())
            .options(options)
            .connect()
            .await?)
    }

    /// Waits for the next command sent by the client.
    pub async fn next_command(&mut self) -> Result<Value> {
        timeout(STEP_TIMEOUT, self.commands.recv())
            .await
            .context("timed out waiting for a command")?
            .ok_or_else(|| anyhow!("mock endpoint stopped"))
    }

    /// Asserts that no command arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) -> Result<()> {
        match timeout(wait, self.commands.recv()).await {
            Err(_) => Ok(()),
            Ok(None) => Ok(()),
            Ok(Some(command)) => Err(anyhow!("unexpected command {command}")),
        }
    }

    /// Sends a JSON frame to the client.
    pub fn send(&self, frame: Value) -> Result<()> {
        self.send_text(frame.to_string())
    }

    /// Sends raw text to the client.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let text: String = text.into();
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| anyhow!("mock endpoint stopped"))
    }

    /// Closes the socket from the server side.
    pub fn close(&self) -> Result<()> {
        self.outbound
            .send(Message::Close(None))
            .map_err(|_| anyhow!("mock endpoint stopped"))
    }
}

// ============================================================================
// Frame Helpers
// ============================================================================

/// Reads the `id` of a received command.
pub fn id_of(command: &Value) -> u64 {
    command["id"].as_u64().unwrap_or_default()
}

/// Builds a success reply.
pub fn success(id: u64, result: Value) -> Value {
    json!({ "id": id, "type": "success", "result": result })
}

/// Builds an error reply.
pub fn error(id: u64, code: &str, message: &str) -> Value {
    json!({ "id": id, "type": "error", "error": code, "message": message })
}

/// Builds an event frame.
pub fn event(method: &str, params: Value) -> Value {
    json!({ "type": "event", "method": method, "params": params })
}

// ============================================================================
// Logging
// ============================================================================

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("webdriver_bidi=debug")),
        )
        .with_test_writer()
        .try_init();
}
