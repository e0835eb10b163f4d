//! Local task board state and merge rules.
//!
//! The server broadcasts every confirmed mutation to all observers,
//! including the originator, and a pending direct call can race an
//! incoming push event. The three merge rules here — append-if-absent,
//! monotonic-version move, delete-if-present — make every delivery
//! order and every duplicate converge to the same final board.

use std::collections::HashMap;

use dealboard_proto::event::ServerEvent;
use dealboard_proto::task::{Task, TaskId, TaskStatus};

/// The client's local task collection, newest first, plus the last
/// applied version per task for stale-move rejection.
#[derive(Default)]
pub struct TaskBoard {
    tasks: Vec<Task>,
    versions: HashMap<TaskId, u64>,
}

impl TaskBoard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks in display order (newest first).
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Returns the number of tasks on the board.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` when the board holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Looks a task up by identifier.
    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *task_id)
    }

    /// Replaces the board with an authoritative snapshot.
    ///
    /// Version entries survive as the max of the old entry and the
    /// snapshot's `updated_at`, so a move event replayed after the
    /// snapshot still gets rejected as stale.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        let mut versions = HashMap::with_capacity(tasks.len());
        for task in &tasks {
            let prior = self.versions.get(&task.id).copied().unwrap_or(0);
            versions.insert(task.id.clone(), prior.max(task.updated_at));
        }
        self.versions = versions;
        self.tasks = tasks;
    }

    /// Appends a task if no task with its identifier is present.
    ///
    /// Idempotent against duplicate delivery and against the broadcast
    /// echo of this client's own create. Returns whether the board
    /// changed.
    pub fn apply_created(&mut self, task: Task) -> bool {
        if self.tasks.iter().any(|t| t.id == task.id) {
            return false;
        }
        self.versions.insert(task.id.clone(), task.updated_at);
        self.tasks.insert(0, task);
        true
    }

    /// Applies a stage move unless it is older than one already applied.
    ///
    /// A move carrying a version lower than the last applied version
    /// for the task is dropped; an equal version applies (delivery
    /// order breaks the tie, matching the server's last-write-wins).
    /// Unknown identifiers are ignored — the next snapshot reconciles.
    /// Returns whether the board changed.
    pub fn apply_moved(
        &mut self,
        task_id: &TaskId,
        status: TaskStatus,
        timestamp: u64,
        version: u64,
    ) -> bool {
        let last = self.versions.get(task_id).copied().unwrap_or(0);
        if version < last {
            return false;
        }
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == *task_id) else {
            return false;
        };
        task.status = status;
        task.updated_at = task.updated_at.max(timestamp);
        self.versions.insert(task_id.clone(), version);
        true
    }

    /// Removes a task, idempotent if already absent. Returns whether
    /// the board changed.
    pub fn apply_deleted(&mut self, task_id: &TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != *task_id);
        self.versions.remove(task_id);
        self.tasks.len() != before
    }

    /// Applies any board-affecting server event, ignoring the rest.
    /// Returns whether the board changed.
    pub fn apply_event(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::TaskCreated { task, .. } => self.apply_created(task.clone()),
            ServerEvent::TaskMoved {
                task_id,
                new_status,
                timestamp,
                version,
                ..
            } => self.apply_moved(task_id, *new_status, *timestamp, *version),
            ServerEvent::TaskDeleted { task_id, .. } => self.apply_deleted(task_id),
            _ => false,
        }
    }
}
