//! Per-task logical timestamps for stale-update detection.
//!
//! Versions ride on `TaskMoved` events so clients can drop moves that
//! arrive out of order. They are a cache, not a durability mechanism:
//! the map is rebuilt implicitly as tasks are mutated after a restart.

use std::collections::HashMap;

use tokio::sync::RwLock;

use dealboard_proto::task::{TaskId, now_ms};

/// Wall-clock-based per-task mutation counter.
///
/// Wall clock keeps versions comparable across the single server
/// process; each task's sequence is clamped so it never decreases even
/// if the clock steps backwards between mutations.
#[derive(Default)]
pub struct VersionClock {
    versions: RwLock<HashMap<TaskId, u64>>,
}

impl VersionClock {
    /// Creates an empty clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns and records the next version for a task.
    pub async fn bump(&self, task_id: &TaskId) -> u64 {
        let mut versions = self.versions.write().await;
        let last = versions.get(task_id).copied().unwrap_or(0);
        let next = now_ms().max(last);
        versions.insert(task_id.clone(), next);
        next
    }

    /// Returns the last version recorded for a task.
    pub async fn get(&self, task_id: &TaskId) -> Option<u64> {
        self.versions.read().await.get(task_id).copied()
    }

    /// Drops the version entry for a deleted task.
    pub async fn remove(&self, task_id: &TaskId) -> Option<u64> {
        self.versions.write().await.remove(task_id)
    }

    /// Returns how many tasks have a recorded version.
    pub async fn len(&self) -> usize {
        self.versions.read().await.len()
    }

    /// Returns `true` when no task has a recorded version.
    pub async fn is_empty(&self) -> bool {
        self.versions.read().await.is_empty()
    }
}
