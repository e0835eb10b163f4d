//! Sync supervisor: the client-side reconciliation state machine.
//!
//! Bridges an application (TUI, bot, watcher) to the server over two
//! transports: the WebSocket push channel while it is healthy, and
//! direct REST calls once reconnection attempts are exhausted. The
//! application sends [`SyncCommand`]s and drains [`SyncEvent`]s; the
//! shared [`BoardHandle`] always holds the current local view, merged
//! with the rules in [`crate::board`].
//!
//! # State machine
//!
//! ```text
//! Disconnected → Connecting → Connected
//!                    │  ↑         │ connection lost: re-initiate
//!                    │  └─────────┘
//!                    │ max_attempts consecutive failures
//!                    ▼
//!                Degraded (terminal for the session)
//! ```
//!
//! Reconnection attempts are sequential, never overlapping, with a
//! linearly growing delay (`base_delay * attempt`). While Connected,
//! mutations go over the push channel only; while Degraded, they go
//! through REST only and the board is refreshed from each call's own
//! response — no broadcast is awaited that will never come.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use dealboard_proto::event::{ClientCommand, ServerEvent};
use dealboard_proto::presence::PresenceEntry;
use dealboard_proto::task::{TaskDraft, TaskId, TaskStatus, now_ms};

use crate::board::TaskBoard;
use crate::config::ClientConfig;
use crate::push::PushChannel;
use crate::rest::RestClient;

/// Shared handle to the local board view.
pub type BoardHandle = Arc<Mutex<TaskBoard>>;

/// Commands from the application to the sync supervisor.
#[derive(Debug)]
pub enum SyncCommand {
    /// Create a task.
    CreateTask {
        /// Creation fields.
        draft: TaskDraft,
    },
    /// Move a task to another pipeline stage.
    MoveTask {
        /// Target task.
        task_id: TaskId,
        /// New stage.
        status: TaskStatus,
    },
    /// Delete a task.
    DeleteTask {
        /// Target task.
        task_id: TaskId,
    },
    /// Start (`true`) or stop (`false`) the typing indicator.
    Typing(bool),
    /// Shut the supervisor down.
    Shutdown,
}

/// Events from the sync supervisor to the application.
#[derive(Debug)]
pub enum SyncEvent {
    /// The push channel is up; the board snapshot follows.
    Connected,
    /// The push channel dropped; reconnection begins.
    Disconnected,
    /// A reconnection attempt failed and another is scheduled.
    Reconnecting {
        /// Failed attempt number (1-based).
        attempt: u32,
        /// The configured attempt ceiling.
        max_attempts: u32,
    },
    /// Reconnection attempts are exhausted; REST fallback from here on.
    Degraded,
    /// The local board changed; re-render from the [`BoardHandle`].
    BoardChanged,
    /// Presence snapshot.
    Presence(Vec<PresenceEntry>),
    /// Activity feed line.
    Activity(String),
    /// Who is currently typing.
    Typing(Vec<String>),
    /// Someone closed a deal.
    Celebration {
        /// Who closed it.
        user: String,
        /// The closed task.
        task_id: TaskId,
    },
    /// A mutation failed. The optimistic local view is not rolled back;
    /// the next authoritative snapshot corrects it.
    OperationFailed(String),
}

/// Spawns the sync supervisor and returns its channel handles and the
/// shared board.
pub async fn spawn_sync(
    config: ClientConfig,
) -> (
    mpsc::Sender<SyncCommand>,
    mpsc::Receiver<SyncEvent>,
    BoardHandle,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (evt_tx, evt_rx) = mpsc::channel(256);
    let board: BoardHandle = Arc::new(Mutex::new(TaskBoard::new()));

    let supervisor_board = Arc::clone(&board);
    tokio::spawn(async move {
        supervisor(config, supervisor_board, cmd_rx, evt_tx).await;
    });

    (cmd_tx, evt_rx, board)
}

/// Why the connected loop ended.
enum LoopOutcome {
    /// The application asked to shut down.
    Shutdown,
    /// The push channel died.
    ConnectionLost,
}

async fn supervisor(
    config: ClientConfig,
    board: BoardHandle,
    mut cmd_rx: mpsc::Receiver<SyncCommand>,
    evt_tx: mpsc::Sender<SyncEvent>,
) {
    let rest = RestClient::new(&config.api_url);
    let mut attempt: u32 = 0;

    loop {
        match PushChannel::connect(&config.server_url, &config.name).await {
            Ok(push) => {
                attempt = 0;
                let _ = evt_tx.send(SyncEvent::Connected).await;
                // The push channel carries deltas only; load the full
                // list through the REST surface.
                load_snapshot(&rest, &board, &evt_tx).await;

                let outcome = connected_loop(&push, &board, &mut cmd_rx, &evt_tx).await;
                push.close().await;
                match outcome {
                    LoopOutcome::Shutdown => return,
                    LoopOutcome::ConnectionLost => {
                        tracing::warn!("push channel lost, re-initiating");
                        let _ = evt_tx.send(SyncEvent::Disconnected).await;
                    }
                }
            }
            Err(e) => {
                attempt += 1;
                tracing::warn!(error = %e, attempt, "push channel connect failed");
                if attempt >= config.reconnect.max_attempts {
                    tracing::warn!("reconnect attempts exhausted, degrading to direct calls");
                    let _ = evt_tx.send(SyncEvent::Degraded).await;
                    degraded_loop(&rest, &board, &mut cmd_rx, &evt_tx).await;
                    return;
                }
                let _ = evt_tx
                    .send(SyncEvent::Reconnecting {
                        attempt,
                        max_attempts: config.reconnect.max_attempts,
                    })
                    .await;
                tokio::time::sleep(config.reconnect.base_delay * attempt).await;
            }
        }
    }
}

/// Drives a healthy push channel: merges incoming events, forwards
/// application commands over the channel (and only the channel — no
/// dual writes).
async fn connected_loop(
    push: &PushChannel,
    board: &BoardHandle,
    cmd_rx: &mut mpsc::Receiver<SyncCommand>,
    evt_tx: &mpsc::Sender<SyncEvent>,
) -> LoopOutcome {
    loop {
        tokio::select! {
            event = push.next_event() => match event {
                Ok(event) => forward_event(&event, board, evt_tx).await,
                Err(_) => return LoopOutcome::ConnectionLost,
            },
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    return LoopOutcome::Shutdown;
                };
                let Some(wire_cmd) = to_wire_command(cmd) else {
                    return LoopOutcome::Shutdown;
                };
                if push.send(&wire_cmd).await.is_err() {
                    // The command is lost with the connection; the next
                    // snapshot re-syncs whatever the user re-issues.
                    tracing::warn!("command dropped on dying push channel");
                    return LoopOutcome::ConnectionLost;
                }
            }
        }
    }
}

/// Translates an application command to its wire form.
///
/// Returns `None` for `Shutdown`. Creates get a client-generated
/// idempotency token so failure responses can be correlated.
fn to_wire_command(cmd: SyncCommand) -> Option<ClientCommand> {
    match cmd {
        SyncCommand::CreateTask { draft } => Some(ClientCommand::CreateTask {
            draft,
            operation_id: Some(format!("op-{}", Uuid::now_v7())),
        }),
        SyncCommand::MoveTask { task_id, status } => {
            Some(ClientCommand::MoveTask { task_id, status })
        }
        SyncCommand::DeleteTask { task_id } => Some(ClientCommand::DeleteTask { task_id }),
        SyncCommand::Typing(true) => Some(ClientCommand::TypingStart),
        SyncCommand::Typing(false) => Some(ClientCommand::TypingStop),
        SyncCommand::Shutdown => None,
    }
}

/// Merges one server event into the board and forwards it upward.
async fn forward_event(event: &ServerEvent, board: &BoardHandle, evt_tx: &mpsc::Sender<SyncEvent>) {
    let forwarded = match event {
        ServerEvent::TaskCreated { .. }
        | ServerEvent::TaskMoved { .. }
        | ServerEvent::TaskDeleted { .. } => {
            let changed = { board.lock().apply_event(event) };
            changed.then_some(SyncEvent::BoardChanged)
        }
        ServerEvent::UsersUpdate { users } => Some(SyncEvent::Presence(users.clone())),
        ServerEvent::Activity { message, .. } => Some(SyncEvent::Activity(message.clone())),
        ServerEvent::TypingUpdate { names } => Some(SyncEvent::Typing(names.clone())),
        ServerEvent::Celebration { user, task_id } => Some(SyncEvent::Celebration {
            user: user.clone(),
            task_id: task_id.clone(),
        }),
        ServerEvent::OperationFailed { message, .. } => {
            Some(SyncEvent::OperationFailed(message.clone()))
        }
    };
    if let Some(evt) = forwarded {
        let _ = evt_tx.send(evt).await;
    }
}

/// Loads the authoritative task list into the board.
async fn load_snapshot(rest: &RestClient, board: &BoardHandle, evt_tx: &mpsc::Sender<SyncEvent>) {
    match rest.list_tasks().await {
        Ok(tasks) => {
            {
                board.lock().replace_all(tasks);
            }
            let _ = evt_tx.send(SyncEvent::BoardChanged).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "task snapshot failed");
            let _ = evt_tx
                .send(SyncEvent::OperationFailed(format!(
                    "task snapshot failed: {e}"
                )))
                .await;
        }
    }
}

/// Terminal fallback mode: every mutation is a direct REST call and the
/// board is refreshed from the call's own response.
async fn degraded_loop(
    rest: &RestClient,
    board: &BoardHandle,
    cmd_rx: &mut mpsc::Receiver<SyncCommand>,
    evt_tx: &mpsc::Sender<SyncEvent>,
) {
    // One authoritative load so the fallback board is not empty.
    load_snapshot(rest, board, evt_tx).await;

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            SyncCommand::CreateTask { draft } => match rest.create_task(&draft).await {
                Ok(task) => {
                    let changed = { board.lock().apply_created(task) };
                    if changed {
                        let _ = evt_tx.send(SyncEvent::BoardChanged).await;
                    }
                }
                Err(e) => {
                    let _ = evt_tx.send(SyncEvent::OperationFailed(e.to_string())).await;
                }
            },
            SyncCommand::MoveTask { task_id, status } => {
                match rest.move_task(&task_id, status).await {
                    Ok(true) => {
                        let now = now_ms();
                        let changed = { board.lock().apply_moved(&task_id, status, now, now) };
                        if changed {
                            let _ = evt_tx.send(SyncEvent::BoardChanged).await;
                        }
                    }
                    Ok(false) => {
                        let _ = evt_tx
                            .send(SyncEvent::OperationFailed("task not found".to_string()))
                            .await;
                    }
                    Err(e) => {
                        let _ = evt_tx.send(SyncEvent::OperationFailed(e.to_string())).await;
                    }
                }
            }
            SyncCommand::DeleteTask { task_id } => match rest.delete_task(&task_id).await {
                Ok(true) => {
                    let changed = { board.lock().apply_deleted(&task_id) };
                    if changed {
                        let _ = evt_tx.send(SyncEvent::BoardChanged).await;
                    }
                }
                Ok(false) => {
                    let _ = evt_tx
                        .send(SyncEvent::OperationFailed("task not found".to_string()))
                        .await;
                }
                Err(e) => {
                    let _ = evt_tx.send(SyncEvent::OperationFailed(e.to_string())).await;
                }
            },
            SyncCommand::Typing(_) => {
                // No push channel to carry typing state.
            }
            SyncCommand::Shutdown => return,
        }
    }
}
