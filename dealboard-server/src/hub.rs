//! Broadcast hub: shared server state, WebSocket handler, command
//! dispatch, and event fan-out.
//!
//! The server accepts WebSocket connections on `/ws`, assigns each a
//! fresh [`ConnId`], and dispatches decoded [`ClientCommand`]s. Every
//! mutation is serialized by the store's per-row write; the resulting
//! event is broadcast to all connected observers (including the
//! originator) strictly after the write is confirmed. Failures are
//! reported to the requester only, never broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

use dealboard_proto::event::{self, ClientCommand, ServerEvent};
use dealboard_proto::presence::ConnId;
use dealboard_proto::task::{TaskDraft, TaskId, TaskPatch, TaskStatus, now_ms};

use crate::api;
use crate::ops::{OperationKind, OperationTracker};
use crate::presence::PresenceRegistry;
use crate::store::TaskStore;
use crate::versions::VersionClock;

/// Author name attributed to connections that never joined.
const ANONYMOUS_USER: &str = "Unknown";

/// Shared server state behind the router.
pub struct ServerState {
    /// Maps connection id to the sender half of its WebSocket writer.
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<Message>>>,
    /// Durable task records; the single source of truth.
    pub store: TaskStore,
    /// Who is connected and joined.
    pub presence: PresenceRegistry,
    /// In-flight mutation attempts.
    pub ops: OperationTracker,
    /// Per-task logical timestamps.
    pub versions: VersionClock,
}

impl ServerState {
    /// Creates server state around an opened task store.
    #[must_use]
    pub fn new(store: TaskStore) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            store,
            presence: PresenceRegistry::new(),
            ops: OperationTracker::new(),
            versions: VersionClock::new(),
        }
    }

    /// Registers a connection's writer channel.
    pub async fn register(&self, conn_id: ConnId, sender: mpsc::UnboundedSender<Message>) {
        let mut conns = self.connections.write().await;
        conns.insert(conn_id, sender);
    }

    /// Removes a connection, returning its sender if it existed.
    pub async fn unregister(&self, conn_id: ConnId) -> Option<mpsc::UnboundedSender<Message>> {
        let mut conns = self.connections.write().await;
        conns.remove(&conn_id)
    }

    /// Returns the number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Fans an event out to every connected observer.
    ///
    /// Best effort, at-most-once: there is no replay for observers whose
    /// channel has gone away.
    pub async fn broadcast(&self, event: &ServerEvent) {
        let bytes = match event::encode_event(event) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode event for broadcast");
                return;
            }
        };
        let conns = self.connections.read().await;
        for sender in conns.values() {
            let _ = sender.send(Message::Binary(bytes.clone().into()));
        }
    }

    /// Sends an event to a single connection (requester-only failures).
    pub async fn send_to(&self, conn_id: ConnId, event: &ServerEvent) {
        let conns = self.connections.read().await;
        if let Some(sender) = conns.get(&conn_id)
            && let Ok(bytes) = event::encode_event(event)
        {
            let _ = sender.send(Message::Binary(bytes.into()));
        }
    }
}

/// Handles an upgraded WebSocket connection for its whole lifetime.
///
/// The connection lifecycle:
/// 1. Assign a fresh [`ConnId`] and register the writer channel.
/// 2. Spawn a writer task and a reader loop.
/// 3. Dispatch each decoded command; malformed frames get an
///    `OperationFailed` back instead of tearing the connection down.
/// 4. On disconnect: unregister, purge in-flight operations, drop
///    presence, and broadcast the shrunken snapshot.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let conn_id = ConnId::new();
    tracing::info!(conn_id = %conn_id, "connection accepted");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(conn_id, tx).await;

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id = %conn_id, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_frame(conn_id, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(conn_id = %conn_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // A store write still pending at this point completes and broadcasts
    // to the remaining observers; only this connection's records go.
    state.unregister(conn_id).await;
    let purged = state.ops.purge(conn_id).await;
    if purged > 0 {
        tracing::debug!(conn_id = %conn_id, purged, "purged in-flight operations");
    }
    if let Some(entry) = state.presence.leave(conn_id).await {
        let users = state.presence.all().await;
        state.broadcast(&ServerEvent::UsersUpdate { users }).await;
        tracing::info!(conn_id = %conn_id, name = %entry.name, "user left the board");
    }
    tracing::info!(conn_id = %conn_id, "connection closed");
}

/// Decodes and dispatches one binary frame from a client.
async fn handle_frame(conn_id: ConnId, data: &[u8], state: &Arc<ServerState>) {
    match event::decode_command(data) {
        Ok(cmd) => dispatch_command(conn_id, cmd, state).await,
        Err(e) => {
            // Malformed frames never tear down the connection.
            tracing::warn!(conn_id = %conn_id, error = %e, "failed to decode command");
            state
                .send_to(
                    conn_id,
                    &ServerEvent::OperationFailed {
                        message: "malformed command".to_string(),
                        operation_id: None,
                    },
                )
                .await;
        }
    }
}

/// Routes a decoded command to its handler.
///
/// Every handler owns its error path and reports failures to the
/// requester only; nothing here can crash the connection.
async fn dispatch_command(conn_id: ConnId, cmd: ClientCommand, state: &Arc<ServerState>) {
    match cmd {
        ClientCommand::Join { name } => handle_join(conn_id, &name, state).await,
        ClientCommand::CreateTask {
            draft,
            operation_id,
        } => handle_create(conn_id, &draft, operation_id, state).await,
        ClientCommand::MoveTask { task_id, status } => {
            handle_move(conn_id, &task_id, status, state).await;
        }
        ClientCommand::DeleteTask { task_id } => handle_delete(conn_id, &task_id, state).await,
        ClientCommand::TypingStart => handle_typing(conn_id, true, state).await,
        ClientCommand::TypingStop => handle_typing(conn_id, false, state).await,
    }
}

async fn handle_join(conn_id: ConnId, name: &str, state: &Arc<ServerState>) {
    match state.presence.join(conn_id, name).await {
        Ok(()) => {
            let users = state.presence.all().await;
            state.broadcast(&ServerEvent::UsersUpdate { users }).await;
            state
                .broadcast(&ServerEvent::Activity {
                    message: format!("{} joined the board", name.trim()),
                    timestamp: now_ms(),
                })
                .await;
            tracing::info!(conn_id = %conn_id, name = %name.trim(), "user joined the board");
        }
        Err(e) => {
            state
                .send_to(
                    conn_id,
                    &ServerEvent::OperationFailed {
                        message: e.to_string(),
                        operation_id: None,
                    },
                )
                .await;
        }
    }
}

async fn handle_create(
    conn_id: ConnId,
    draft: &TaskDraft,
    operation_id: Option<String>,
    state: &Arc<ServerState>,
) {
    let operation_id = operation_id.unwrap_or_else(OperationTracker::synthesize_token);
    let user = state
        .presence
        .name_of(conn_id)
        .await
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());
    let now = now_ms();

    let task = match draft.build(&user, now) {
        Ok(task) => task,
        Err(e) => {
            state
                .send_to(
                    conn_id,
                    &ServerEvent::OperationFailed {
                        message: e.to_string(),
                        operation_id: Some(operation_id),
                    },
                )
                .await;
            return;
        }
    };

    state
        .ops
        .begin(&operation_id, OperationKind::CreateTask, &task.id, conn_id)
        .await;

    match state.store.create(&task).await {
        Ok(()) => {
            state.versions.bump(&task.id).await;
            tracing::info!(conn_id = %conn_id, task_id = %task.id, user = %user, "task created");
            let text = task.text.clone();
            state
                .broadcast(&ServerEvent::TaskCreated {
                    task,
                    user: user.clone(),
                    timestamp: now,
                    operation_id: operation_id.clone(),
                })
                .await;
            state
                .broadcast(&ServerEvent::Activity {
                    message: format!("{user} created task: \"{text}\""),
                    timestamp: now,
                })
                .await;
        }
        Err(e) => {
            tracing::error!(conn_id = %conn_id, error = %e, "task insert failed");
            state
                .send_to(
                    conn_id,
                    &ServerEvent::OperationFailed {
                        message: "failed to create task".to_string(),
                        operation_id: Some(operation_id.clone()),
                    },
                )
                .await;
        }
    }
    state.ops.end(&operation_id).await;
}

async fn handle_move(
    conn_id: ConnId,
    task_id: &TaskId,
    status: TaskStatus,
    state: &Arc<ServerState>,
) {
    let operation_id = OperationTracker::synthesize_token();
    let user = state
        .presence
        .name_of(conn_id)
        .await
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());
    let now = now_ms();

    state
        .ops
        .begin(&operation_id, OperationKind::MoveTask, task_id, conn_id)
        .await;

    match state
        .store
        .update(task_id, &TaskPatch::with_status(status), now)
        .await
    {
        Ok(0) => {
            // Unknown task: the zero-row outcome suppresses the event.
            tracing::debug!(conn_id = %conn_id, task_id = %task_id, "move matched no task");
        }
        Ok(_) => {
            let version = state.versions.bump(task_id).await;
            tracing::info!(
                conn_id = %conn_id,
                task_id = %task_id,
                status = %status,
                user = %user,
                "task moved"
            );
            state
                .broadcast(&ServerEvent::TaskMoved {
                    task_id: task_id.clone(),
                    new_status: status,
                    moved_by: user.clone(),
                    timestamp: now,
                    version,
                })
                .await;
            if status == TaskStatus::Done {
                state
                    .broadcast(&ServerEvent::Celebration {
                        user,
                        task_id: task_id.clone(),
                    })
                    .await;
            }
        }
        Err(e) => {
            tracing::error!(conn_id = %conn_id, task_id = %task_id, error = %e, "task move failed");
            state
                .send_to(
                    conn_id,
                    &ServerEvent::OperationFailed {
                        message: "failed to move task".to_string(),
                        operation_id: Some(operation_id.clone()),
                    },
                )
                .await;
        }
    }
    state.ops.end(&operation_id).await;
}

async fn handle_delete(conn_id: ConnId, task_id: &TaskId, state: &Arc<ServerState>) {
    let operation_id = OperationTracker::synthesize_token();
    let user = state
        .presence
        .name_of(conn_id)
        .await
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());
    let now = now_ms();

    state
        .ops
        .begin(&operation_id, OperationKind::DeleteTask, task_id, conn_id)
        .await;

    match state.store.delete(task_id).await {
        Ok(0) => {
            tracing::debug!(conn_id = %conn_id, task_id = %task_id, "delete matched no task");
        }
        Ok(_) => {
            state.versions.remove(task_id).await;
            tracing::info!(conn_id = %conn_id, task_id = %task_id, user = %user, "task deleted");
            state
                .broadcast(&ServerEvent::TaskDeleted {
                    task_id: task_id.clone(),
                    deleted_by: user,
                    timestamp: now,
                })
                .await;
        }
        Err(e) => {
            tracing::error!(conn_id = %conn_id, task_id = %task_id, error = %e, "task delete failed");
            state
                .send_to(
                    conn_id,
                    &ServerEvent::OperationFailed {
                        message: "failed to delete task".to_string(),
                        operation_id: Some(operation_id.clone()),
                    },
                )
                .await;
        }
    }
    state.ops.end(&operation_id).await;
}

async fn handle_typing(conn_id: ConnId, typing: bool, state: &Arc<ServerState>) {
    if let Some(names) = state.presence.set_typing(conn_id, typing).await {
        state
            .broadcast(&ServerEvent::TypingUpdate { names })
            .await;
    }
}

/// Starts the server on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    store: TaskStore,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new(store))).await
}

/// Starts the server with pre-built [`ServerState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = api::router()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
