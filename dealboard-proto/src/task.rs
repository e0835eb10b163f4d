//! Task data model for the Dealboard pipeline.
//!
//! Defines the [`Task`] record shared by the server store, the REST
//! surface, and the push-channel events, together with the [`TaskDraft`]
//! and [`TaskPatch`] types used for mutations. Field validation lives
//! here so that the push channel and the REST API enforce identical
//! rules.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task text length in characters.
pub const MAX_TASK_TEXT_LENGTH: usize = 500;

/// Task type tag assigned when a draft does not name one.
pub const DEFAULT_TASK_TYPE: &str = "general";

/// Returns the current wall-clock time in milliseconds since epoch.
#[must_use]
pub fn now_ms() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}

/// Unique identifier for a task, based on UUID v7 for time-ordering.
///
/// Identifiers are opaque and immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Error returned when a status or priority string is not a member of
/// its enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized value: {0:?}")]
pub struct ParseEnumError(pub String);

/// Pipeline stage of a task.
///
/// Tasks always sit in exactly one of these four stages; the storage
/// layer enforces the same set with a CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not started.
    Todo,
    /// Actively being worked.
    InProgress,
    /// Deal terms under discussion.
    Negotiation,
    /// Closed.
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::InProgress => write!(f, "inprogress"),
            Self::Negotiation => write!(f, "negotiation"),
            Self::Done => write!(f, "done"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "inprogress" => Ok(Self::InProgress),
            "negotiation" => Ok(Self::Negotiation),
            "done" => Ok(Self::Done),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Urgency of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Normal urgency.
    #[default]
    Medium,
    /// Needs attention soon.
    High,
    /// Drop everything.
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// A sales task tracked through the four pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// What needs doing (non-empty).
    pub text: String,
    /// Current pipeline stage.
    pub status: TaskStatus,
    /// Who owns the task (non-empty display name).
    pub assignee: String,
    /// Free-form categorization tag.
    pub task_type: String,
    /// Urgency.
    pub priority: Priority,
    /// Deal size in whole currency units.
    pub deal_value: u64,
    /// Optional deadline.
    pub due_date: Option<NaiveDate>,
    /// Display name of whoever created the task.
    pub created_by: String,
    /// Server-assigned creation time (milliseconds since epoch).
    pub created_at: u64,
    /// Last mutation time (milliseconds since epoch); never decreases
    /// for a given task.
    pub updated_at: u64,
}

/// Errors produced by draft validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    /// Task text was missing or blank.
    #[error("task text must not be empty")]
    TextMissing,
    /// Task text exceeds the maximum length.
    #[error("task text too long (max {MAX_TASK_TEXT_LENGTH} characters)")]
    TextTooLong,
    /// Assignee was missing or blank.
    #[error("task assignee must not be empty")]
    AssigneeMissing,
}

/// Client-supplied fields for creating a task.
///
/// Carried both in the push-channel `CreateTask` command and as the
/// JSON body of `POST /api/tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// What needs doing.
    pub text: String,
    /// Who owns the task.
    pub assignee: String,
    /// Categorization tag; defaults to [`DEFAULT_TASK_TYPE`].
    pub task_type: Option<String>,
    /// Urgency; defaults to [`Priority::Medium`].
    pub priority: Option<Priority>,
    /// Deal size; defaults to 0.
    pub deal_value: Option<u64>,
    /// Optional deadline.
    pub due_date: Option<NaiveDate>,
    /// Creator display name; the server substitutes the connection's
    /// joined name (or its own fallback) when absent. REST bodies may
    /// spell this `createdBy`.
    #[serde(alias = "createdBy")]
    pub created_by: Option<String>,
}

impl TaskDraft {
    /// Validates the draft and builds a fresh task in the `todo` stage.
    ///
    /// Text and assignee are trimmed before validation; `fallback_author`
    /// is recorded as `created_by` when the draft names no creator.
    ///
    /// # Errors
    ///
    /// Returns [`DraftError`] when text or assignee is blank, or the
    /// text exceeds [`MAX_TASK_TEXT_LENGTH`] characters.
    pub fn build(&self, fallback_author: &str, now: u64) -> Result<Task, DraftError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(DraftError::TextMissing);
        }
        if text.chars().count() > MAX_TASK_TEXT_LENGTH {
            return Err(DraftError::TextTooLong);
        }
        let assignee = self.assignee.trim();
        if assignee.is_empty() {
            return Err(DraftError::AssigneeMissing);
        }

        Ok(Task {
            id: TaskId::new(),
            text: text.to_string(),
            status: TaskStatus::Todo,
            assignee: assignee.to_string(),
            task_type: self
                .task_type
                .clone()
                .unwrap_or_else(|| DEFAULT_TASK_TYPE.to_string()),
            priority: self.priority.unwrap_or_default(),
            deal_value: self.deal_value.unwrap_or(0),
            due_date: self.due_date,
            created_by: self
                .created_by
                .clone()
                .unwrap_or_else(|| fallback_author.to_string()),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update to a task's mutable fields.
///
/// Absent fields are left unchanged. A patch with no fields at all is
/// rejected at the API layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New task text.
    pub text: Option<String>,
    /// New pipeline stage.
    pub status: Option<TaskStatus>,
    /// New assignee.
    pub assignee: Option<String>,
    /// New categorization tag.
    pub task_type: Option<String>,
    /// New urgency.
    pub priority: Option<Priority>,
    /// New deal size.
    pub deal_value: Option<u64>,
    /// New deadline.
    pub due_date: Option<NaiveDate>,
}

impl TaskPatch {
    /// Returns `true` when the patch touches no field.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.status.is_none()
            && self.assignee.is_none()
            && self.task_type.is_none()
            && self.priority.is_none()
            && self.deal_value.is_none()
            && self.due_date.is_none()
    }

    /// Builds a patch that changes only the pipeline stage.
    #[must_use]
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
