//! Direct REST access to the task tracker.
//!
//! This is the degraded-mode path: when the push channel is gone the
//! client mutates the board through these request/response calls and
//! refreshes its local view from each call's own response. It also
//! serves the initial task snapshot on every (re)connect, since the
//! push channel carries deltas only.

use dealboard_proto::task::{Task, TaskDraft, TaskId, TaskStatus};

/// Errors that can occur on the REST path.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// The HTTP request itself failed (network, timeout, decode).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server rejected request ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// The server's error message.
        message: String,
    },
}

/// Thin client over the server's REST surface.
pub struct RestClient {
    http: reqwest::Client,
    base: String,
}

impl RestClient {
    /// Creates a client for the given base URL (e.g. `http://host:8080`).
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `GET /api/tasks` — the full task list, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] on transport failure or a non-success status.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, RestError> {
        let resp = self
            .http
            .get(format!("{}/api/tasks", self.base))
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.json().await?)
    }

    /// `POST /api/tasks` — create a task, returning the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Api`] with status 400 on validation failure.
    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Task, RestError> {
        let resp = self
            .http
            .post(format!("{}/api/tasks", self.base))
            .json(draft)
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.json().await?)
    }

    /// `PATCH /api/tasks/:id` with a status change.
    ///
    /// Returns `false` when the task no longer exists (404).
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] on transport failure or other non-success
    /// statuses.
    pub async fn move_task(&self, id: &TaskId, status: TaskStatus) -> Result<bool, RestError> {
        let resp = self
            .http
            .patch(format!("{}/api/tasks/{id}", self.base))
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(resp).await?;
        Ok(true)
    }

    /// `DELETE /api/tasks/:id`.
    ///
    /// Returns `false` when the task no longer exists (404).
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] on transport failure or other non-success
    /// statuses.
    pub async fn delete_task(&self, id: &TaskId) -> Result<bool, RestError> {
        let resp = self
            .http
            .delete(format!("{}/api/tasks/{id}", self.base))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(resp).await?;
        Ok(true)
    }

    /// Liveness probe against `/api/health`.
    ///
    /// # Errors
    ///
    /// Returns [`RestError`] when the server is unreachable or unhealthy.
    pub async fn health(&self) -> Result<(), RestError> {
        let resp = self
            .http
            .get(format!("{}/api/health", self.base))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Maps a non-success response to [`RestError::Api`], extracting the
/// server's `{"error": ...}` message when present.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, RestError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown error".to_string());
    Err(RestError::Api { status, message })
}
