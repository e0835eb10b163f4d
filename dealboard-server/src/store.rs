//! SQLite-backed task store.
//!
//! The store is the single source of truth for task records; every
//! in-memory structure on the server is a cache that could be rebuilt
//! from it. All operations are atomic per call — there are no
//! multi-task transactions. `update` and `delete` report the number of
//! rows changed; zero rows is a distinct outcome from an error and
//! callers use it to suppress broadcasts for missing tasks.

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::Connection;
use tokio::sync::Mutex;

use dealboard_proto::task::{Task, TaskId, TaskPatch};

/// Errors produced by the task store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying SQLite call failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Durable task record table, one row per task.
///
/// `status` and `priority` are constrained to their enum strings at the
/// storage layer. The connection sits behind an async mutex; individual
/// statements are short enough that callers never block each other
/// noticeably, and the per-row write is the serialization point for
/// concurrent mutations of the same task (last write to complete wins).
pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Opens (or creates) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or the
    /// schema cannot be prepared.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory store, used by tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the schema cannot be prepared.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates the tasks table and applies column migrations.
    fn bootstrap(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                status TEXT NOT NULL
                    CHECK(status IN ('todo', 'inprogress', 'negotiation', 'done')),
                assignee TEXT NOT NULL,
                task_type TEXT NOT NULL DEFAULT 'general',
                priority TEXT NOT NULL DEFAULT 'medium'
                    CHECK(priority IN ('low', 'medium', 'high', 'urgent')),
                deal_value INTEGER NOT NULL DEFAULT 0,
                due_date TEXT,
                created_by TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Self::migrate_columns(conn)?;
        Ok(())
    }

    /// Adds the sales-metadata columns to task tables created before
    /// they existed. One-time concern; a no-op on fresh databases.
    fn migrate_columns(conn: &Connection) -> Result<(), StoreError> {
        let mut stmt = conn.prepare("PRAGMA table_info(tasks)")?;
        let existing: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        let wanted = [
            (
                "task_type",
                "ALTER TABLE tasks ADD COLUMN task_type TEXT NOT NULL DEFAULT 'general'",
            ),
            (
                "priority",
                "ALTER TABLE tasks ADD COLUMN priority TEXT NOT NULL DEFAULT 'medium'",
            ),
            (
                "deal_value",
                "ALTER TABLE tasks ADD COLUMN deal_value INTEGER NOT NULL DEFAULT 0",
            ),
            ("due_date", "ALTER TABLE tasks ADD COLUMN due_date TEXT"),
            ("created_by", "ALTER TABLE tasks ADD COLUMN created_by TEXT"),
        ];
        for (name, sql) in wanted {
            if !existing.iter().any(|c| c == name) {
                conn.execute(sql, [])?;
                tracing::info!(column = name, "added tasks column");
            }
        }
        Ok(())
    }

    /// Returns all tasks, newest first (ties broken by id so the order
    /// is stable).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure.
    pub async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, text, status, assignee, task_type, priority, deal_value,
                    due_date, created_by, created_at, updated_at
             FROM tasks ORDER BY created_at DESC, id DESC",
        )?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Inserts a new task row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on insert failure (including a duplicate
    /// identifier or a CHECK-constraint violation).
    pub async fn create(&self, task: &Task) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO tasks (id, text, status, assignee, task_type, priority,
                                deal_value, due_date, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                task.id.to_string(),
                task.text,
                task.status.to_string(),
                task.assignee,
                task.task_type,
                task.priority.to_string(),
                task.deal_value,
                task.due_date.map(|d| d.to_string()),
                task.created_by,
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Applies a partial update, returning the number of rows changed.
    ///
    /// Zero rows means no task matched the identifier — callers treat
    /// that as not-found, not as an error. `updated_at` is clamped so
    /// it never decreases even if the caller's clock stepped backwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on update failure.
    pub async fn update(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
        updated_at: u64,
    ) -> Result<usize, StoreError> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();

        if let Some(text) = &patch.text {
            sets.push("text = ?");
            values.push(Box::new(text.clone()));
        }
        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Box::new(status.to_string()));
        }
        if let Some(assignee) = &patch.assignee {
            sets.push("assignee = ?");
            values.push(Box::new(assignee.clone()));
        }
        if let Some(task_type) = &patch.task_type {
            sets.push("task_type = ?");
            values.push(Box::new(task_type.clone()));
        }
        if let Some(priority) = patch.priority {
            sets.push("priority = ?");
            values.push(Box::new(priority.to_string()));
        }
        if let Some(deal_value) = patch.deal_value {
            sets.push("deal_value = ?");
            values.push(Box::new(deal_value));
        }
        if let Some(due_date) = patch.due_date {
            sets.push("due_date = ?");
            values.push(Box::new(due_date.to_string()));
        }

        sets.push("updated_at = MAX(updated_at, ?)");
        values.push(Box::new(updated_at));
        values.push(Box::new(id.to_string()));

        let sql = format!("UPDATE tasks SET {} WHERE id = ?", sets.join(", "));
        let conn = self.conn.lock().await;
        let changes = conn.execute(&sql, rusqlite::params_from_iter(values.iter().map(|v| &**v)))?;
        Ok(changes)
    }

    /// Deletes a task row, returning the number of rows changed (zero
    /// means not-found).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on delete failure.
    pub async fn delete(&self, id: &TaskId) -> Result<usize, StoreError> {
        let conn = self.conn.lock().await;
        let changes = conn.execute(
            "DELETE FROM tasks WHERE id = ?1",
            rusqlite::params![id.to_string()],
        )?;
        Ok(changes)
    }
}

/// Maps a SELECT row to a [`Task`].
fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let id: String = row.get(0)?;
    let status: String = row.get(2)?;
    let priority: String = row.get(5)?;
    let due_date: Option<String> = row.get(7)?;
    let created_by: Option<String> = row.get(8)?;

    Ok(Task {
        id: id.parse().map_err(|e| invalid_column(0, e))?,
        text: row.get(1)?,
        status: status.parse().map_err(|e| invalid_column(2, e))?,
        assignee: row.get(3)?,
        task_type: row.get(4)?,
        priority: priority.parse().map_err(|e| invalid_column(5, e))?,
        deal_value: row.get(6)?,
        due_date: due_date
            .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").map_err(|e| invalid_column(7, e)))
            .transpose()?,
        created_by: created_by.unwrap_or_default(),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Wraps a column conversion failure as a rusqlite error.
fn invalid_column(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
}
