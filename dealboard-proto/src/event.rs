//! Push-channel wire protocol for the Dealboard server.
//!
//! Defines the [`ClientCommand`] and [`ServerEvent`] enums that are
//! postcard-encoded and exchanged as WebSocket binary frames between
//! board clients and the server. The push channel carries deltas only;
//! the initial task list always comes from `GET /api/tasks`.

use serde::{Deserialize, Serialize};

use crate::presence::PresenceEntry;
use crate::task::{Task, TaskDraft, TaskId, TaskStatus};

/// Error type for wire encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Commands accepted from a connected board client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    /// Announce the user behind this connection. Until a `Join` arrives
    /// the connection is anonymous and its actions are attributed to a
    /// server-side fallback name.
    Join {
        /// Display name (must not be blank).
        name: String,
    },
    /// Create a task from the given draft.
    CreateTask {
        /// Creation fields; validated server-side.
        draft: TaskDraft,
        /// Optional client-generated idempotency token. The server
        /// synthesizes one when absent and echoes it in the outcome.
        operation_id: Option<String>,
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
    /// The user started typing.
    TypingStart,
    /// The user stopped typing.
    TypingStop,
}

/// Events fanned out to connected board clients.
///
/// Task events are emitted strictly after the store confirms the write.
/// The originating connection receives broadcasts identically to every
/// other observer (no echo suppression), so clients must merge them
/// idempotently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// A task was created and durably stored.
    TaskCreated {
        /// The stored task.
        task: Task,
        /// Display name of the creator.
        user: String,
        /// Server time of the event (milliseconds since epoch).
        timestamp: u64,
        /// Idempotency token of the originating operation.
        operation_id: String,
    },
    /// A task changed pipeline stage. Emitted only when the store
    /// reported at least one row changed.
    TaskMoved {
        /// Target task.
        task_id: TaskId,
        /// The stage it moved to.
        new_status: TaskStatus,
        /// Display name of whoever moved it.
        moved_by: String,
        /// Server time of the event (milliseconds since epoch).
        timestamp: u64,
        /// Per-task logical timestamp; clients drop moves older than
        /// the last one they applied.
        version: u64,
    },
    /// A task was deleted. Emitted only when the store reported at
    /// least one row changed.
    TaskDeleted {
        /// Target task.
        task_id: TaskId,
        /// Display name of whoever deleted it.
        deleted_by: String,
        /// Server time of the event (milliseconds since epoch).
        timestamp: u64,
    },
    /// Full presence snapshot, emitted on every join and leave.
    UsersUpdate {
        /// Everyone currently connected and joined.
        users: Vec<PresenceEntry>,
    },
    /// Human-readable activity feed line. Best effort; never relied on
    /// for state.
    Activity {
        /// The feed line.
        message: String,
        /// Server time of the event (milliseconds since epoch).
        timestamp: u64,
    },
    /// Names of everyone currently typing.
    TypingUpdate {
        /// Typing users' display names.
        names: Vec<String>,
    },
    /// A task reached the `done` stage.
    Celebration {
        /// Who closed it.
        user: String,
        /// The closed task.
        task_id: TaskId,
    },
    /// A mutation failed. Sent only to the originating connection,
    /// never broadcast.
    OperationFailed {
        /// What went wrong.
        message: String,
        /// Idempotency token of the failed operation, when known.
        operation_id: Option<String>,
    },
}

/// Encodes a [`ClientCommand`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`WireError::Serialization`] if serialization fails.
pub fn encode_command(cmd: &ClientCommand) -> Result<Vec<u8>, WireError> {
    postcard::to_allocvec(cmd).map_err(|e| WireError::Serialization(e.to_string()))
}

/// Decodes a [`ClientCommand`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`WireError::Serialization`] if deserialization fails.
pub fn decode_command(bytes: &[u8]) -> Result<ClientCommand, WireError> {
    postcard::from_bytes(bytes).map_err(|e| WireError::Serialization(e.to_string()))
}

/// Encodes a [`ServerEvent`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`WireError::Serialization`] if serialization fails.
pub fn encode_event(event: &ServerEvent) -> Result<Vec<u8>, WireError> {
    postcard::to_allocvec(event).map_err(|e| WireError::Serialization(e.to_string()))
}

/// Decodes a [`ServerEvent`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`WireError::Serialization`] if deserialization fails.
pub fn decode_event(bytes: &[u8]) -> Result<ServerEvent, WireError> {
    postcard::from_bytes(bytes).map_err(|e| WireError::Serialization(e.to_string()))
}
