//! WebSocket push channel to the Dealboard server.
//!
//! The real-time transport: commands go out as postcard-encoded binary
//! frames, server events come back the same way through a background
//! reader task. Malformed frames are logged and skipped — the channel
//! never disconnects on bad data. Connection loss is observable via
//! [`PushChannel::is_connected`] and as `ConnectionClosed` from
//! [`PushChannel::next_event`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use dealboard_proto::event::{self, ClientCommand, ServerEvent, WireError};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for connecting to the server.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur on the push channel.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The connection to the server has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Connecting timed out.
    #[error("push channel connect timed out")]
    Timeout,

    /// The server is not reachable.
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// Wire encoding or decoding failed.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// An underlying I/O error occurred.
    #[error("push channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// WebSocket connection to the server's `/ws` endpoint.
///
/// Created via [`PushChannel::connect`], which establishes the
/// connection, announces the user with a `Join` command, and spawns a
/// background reader task. The push channel carries deltas only — the
/// initial task list comes from the REST API.
pub struct PushChannel {
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Channel for events received from the background reader task.
    incoming: Mutex<mpsc::Receiver<ServerEvent>>,
    /// Whether the WebSocket connection is active.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task (kept alive for the channel's lifetime).
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl PushChannel {
    /// Connects to the server and joins the board under `name`.
    ///
    /// # Errors
    ///
    /// - [`PushError::Timeout`] if the connection attempt times out.
    /// - [`PushError::Unreachable`] if the server cannot be reached.
    /// - [`PushError::Io`] for TLS or handshake failures.
    pub async fn connect(url: &str, name: &str) -> Result<Self, PushError> {
        let (ws_stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| {
                tracing::warn!(url, "push channel connect timed out");
                PushError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url, err = %e, "push channel connect failed");
                map_ws_connect_error(e)
            })?;

        let (mut ws_sender, ws_reader) = ws_stream.split();

        // Announce presence first; everything else is deltas.
        let join = ClientCommand::Join {
            name: name.to_string(),
        };
        let bytes = event::encode_command(&join)?;
        ws_sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "failed to send join");
                PushError::Io(std::io::Error::other(format!("failed to send join: {e}")))
            })?;

        let (tx, rx) = mpsc::channel(256);
        let connected = Arc::new(AtomicBool::new(true));
        let reader_connected = Arc::clone(&connected);
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, reader_connected));

        tracing::info!(url, name, "push channel connected");

        Ok(Self {
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            incoming: Mutex::new(rx),
            connected,
            _reader_handle: reader_handle,
        })
    }

    /// Sends a command to the server.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::ConnectionClosed`] when the connection is
    /// down, or [`PushError::Wire`] if encoding fails.
    pub async fn send(&self, cmd: &ClientCommand) -> Result<(), PushError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(PushError::ConnectionClosed);
        }
        let bytes = event::encode_command(cmd)?;
        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "push channel send failed");
                self.connected.store(false, Ordering::Relaxed);
                PushError::ConnectionClosed
            })?;
        Ok(())
    }

    /// Waits for the next server event.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::ConnectionClosed`] once the connection has
    /// been lost and the reader task has drained.
    pub async fn next_event(&self) -> Result<ServerEvent, PushError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(PushError::ConnectionClosed)
    }

    /// Whether the connection to the server is currently active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Sends a close frame and marks the channel disconnected.
    pub async fn close(&self) {
        let mut sender = self.ws_sender.lock().await;
        let _ = sender.send(Message::Close(None)).await;
        self.connected.store(false, Ordering::Relaxed);
    }
}

/// Background task that reads WebSocket frames and dispatches events.
///
/// Sets `connected` to `false` when the WebSocket closes or errors out.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<ServerEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match event::decode_event(&data) {
                Ok(evt) => {
                    if tx.send(evt).await.is_err() {
                        // Receiver dropped — channel owner is gone, exit.
                        break;
                    }
                }
                Err(e) => {
                    // Malformed frame — log and skip, don't disconnect.
                    tracing::warn!(err = %e, "malformed push frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("push channel closed by server");
                break;
            }
            Ok(_) => {
                // Ignore ping/pong/text frames.
            }
            Err(e) => {
                tracing::warn!(err = %e, "push channel read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::info!("push channel reader exiting");
}

/// Map a `tokio_tungstenite` connection error to a [`PushError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> PushError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            // DNS/network failures surface as io errors.
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                PushError::Unreachable(io_err.to_string())
            } else {
                PushError::Io(io_err)
            }
        }
        WsError::Tls(_) => PushError::Io(std::io::Error::other(format!("TLS error: {err}"))),
        WsError::Http(response) => PushError::Io(std::io::Error::other(format!(
            "server HTTP error: status {}",
            response.status()
        ))),
        other => PushError::Io(std::io::Error::other(format!("connection error: {other}"))),
    }
}
