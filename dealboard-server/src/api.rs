//! REST surface for the task tracker.
//!
//! Serves both the primary API and the client's degraded-mode path.
//! Mutations go through the same store-write, version-bump, broadcast
//! sequence as push-channel commands, so push observers see changes made
//! over plain HTTP too.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};

use dealboard_proto::event::ServerEvent;
use dealboard_proto::task::{Task, TaskDraft, TaskId, TaskPatch, TaskStatus, now_ms};

use crate::hub::ServerState;
use crate::ops::OperationTracker;

/// Author name recorded for mutations arriving over plain REST.
const API_USER: &str = "api";

/// Errors surfaced by the REST handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body failed validation.
    #[error("{0}")]
    Validation(String),
    /// No task matched the given identifier.
    #[error("task not found")]
    NotFound,
    /// The store failed.
    #[error("storage failure")]
    Store(#[from] crate::store::StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Store(e) => {
                tracing::error!(error = %e, "store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the REST router; the caller attaches `/ws` and the state.
pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            axum::routing::patch(patch_task).delete(delete_task),
        )
        .route("/health", get(health))
        .route("/api/health", get(api_health))
}

/// `GET /api/tasks` — every task, newest first.
async fn list_tasks(State(state): State<Arc<ServerState>>) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

/// `POST /api/tasks` — create a task from a draft body.
async fn create_task(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let draft: TaskDraft = serde_json::from_value(body)
        .map_err(|e| ApiError::Validation(format!("invalid task body: {e}")))?;
    let now = now_ms();
    let task = draft
        .build(API_USER, now)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    state.store.create(&task).await?;
    state.versions.bump(&task.id).await;
    tracing::info!(task_id = %task.id, created_by = %task.created_by, "task created via api");

    let user = task.created_by.clone();
    state
        .broadcast(&ServerEvent::TaskCreated {
            task: task.clone(),
            user: user.clone(),
            timestamp: now,
            operation_id: OperationTracker::synthesize_token(),
        })
        .await;
    state
        .broadcast(&ServerEvent::Activity {
            message: format!("{user} created task: \"{}\"", task.text),
            timestamp: now,
        })
        .await;

    Ok((StatusCode::CREATED, Json(task)))
}

/// `PATCH /api/tasks/:id` — partial update; 404 when nothing matched.
async fn patch_task(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let Ok(task_id) = id.parse::<TaskId>() else {
        return Err(ApiError::NotFound);
    };
    let patch: TaskPatch = serde_json::from_value(body)
        .map_err(|e| ApiError::Validation(format!("invalid task fields: {e}")))?;
    if patch.is_empty() {
        return Err(ApiError::Validation("no valid fields to update".to_string()));
    }

    let now = now_ms();
    let changes = state.store.update(&task_id, &patch, now).await?;
    if changes == 0 {
        return Err(ApiError::NotFound);
    }

    if let Some(status) = patch.status {
        let version = state.versions.bump(&task_id).await;
        state
            .broadcast(&ServerEvent::TaskMoved {
                task_id: task_id.clone(),
                new_status: status,
                moved_by: API_USER.to_string(),
                timestamp: now,
                version,
            })
            .await;
        if status == TaskStatus::Done {
            state
                .broadcast(&ServerEvent::Celebration {
                    user: API_USER.to_string(),
                    task_id,
                })
                .await;
        }
    }

    Ok(Json(json!({ "success": true, "changes": changes })))
}

/// `DELETE /api/tasks/:id` — 404 when nothing matched.
async fn delete_task(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let Ok(task_id) = id.parse::<TaskId>() else {
        return Err(ApiError::NotFound);
    };

    let changes = state.store.delete(&task_id).await?;
    if changes == 0 {
        return Err(ApiError::NotFound);
    }

    state.versions.remove(&task_id).await;
    state
        .broadcast(&ServerEvent::TaskDeleted {
            task_id,
            deleted_by: API_USER.to_string(),
            timestamp: now_ms(),
        })
        .await;

    Ok(Json(json!({ "success": true })))
}

/// `GET /health` — liveness.
async fn health(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "connections": state.connection_count().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /api/health` — diagnostics.
async fn api_health(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "status": "online",
        "database": "connected",
        "connections": state.connection_count().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
