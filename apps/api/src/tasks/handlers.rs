use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::tasks::{TaskRecord, TaskStatus};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
}

/// GET /tasks/:id
pub async fn handle_get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskRecord>, AppError> {
    Ok(Json(state.tasks.get_task(task_id).await?))
}

/// GET /tasks/:id/status
pub async fn handle_get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskStatusResponse>, AppError> {
    let status = state.tasks.get_task_status(task_id).await?;
    Ok(Json(TaskStatusResponse { task_id, status }))
}
