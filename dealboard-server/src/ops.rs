//! In-memory registry of in-flight mutation attempts.
//!
//! Each accepted mutation is tracked under its idempotency token from
//! the moment it is accepted until it completes (success or failure).
//! Records are also purged when the originating connection disconnects
//! mid-operation, so an orphaned record can never leak permanently.
//!
//! No record is a correctness gate today — duplicate broadcasts are
//! tolerated by the client merge rules — but the tracker is the home
//! for future idempotent-retry support.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use dealboard_proto::presence::ConnId;
use dealboard_proto::task::{TaskId, now_ms};

/// What kind of mutation an operation record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// A task creation.
    CreateTask,
    /// A pipeline-stage move.
    MoveTask,
    /// A task deletion.
    DeleteTask,
}

/// One in-flight mutation attempt.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    /// The mutation kind.
    pub kind: OperationKind,
    /// The task being mutated.
    pub task_id: TaskId,
    /// The connection that issued the mutation.
    pub conn_id: ConnId,
    /// When the operation was accepted (milliseconds since epoch).
    pub started_at: u64,
}

/// Tracks in-flight mutations keyed by idempotency token.
#[derive(Default)]
pub struct OperationTracker {
    records: RwLock<HashMap<String, OperationRecord>>,
}

impl OperationTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an in-flight operation.
    ///
    /// Idempotent: when the token is already registered the existing
    /// record is kept and `false` is returned.
    pub async fn begin(
        &self,
        token: &str,
        kind: OperationKind,
        task_id: &TaskId,
        conn_id: ConnId,
    ) -> bool {
        let mut records = self.records.write().await;
        if records.contains_key(token) {
            return false;
        }
        records.insert(
            token.to_string(),
            OperationRecord {
                kind,
                task_id: task_id.clone(),
                conn_id,
                started_at: now_ms(),
            },
        );
        true
    }

    /// Removes a completed operation, returning its record if present.
    pub async fn end(&self, token: &str) -> Option<OperationRecord> {
        self.records.write().await.remove(token)
    }

    /// Removes every record originated by the given connection.
    ///
    /// Invoked on disconnect. Returns how many records were dropped.
    pub async fn purge(&self, conn_id: ConnId) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.conn_id != conn_id);
        before - records.len()
    }

    /// Returns the number of in-flight operations.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` when no operation is in flight.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Synthesizes a token for mutations presented without one.
    #[must_use]
    pub fn synthesize_token() -> String {
        format!("op-{}", Uuid::now_v7())
    }
}
