use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::ServiceCaller;
use crate::errors::{AppError, FieldError};
use crate::generation::personalization::PersonalizationOptions;
use crate::models::request::{GenerationRequest, QueueStatus};
use crate::queue::coordinator::{BatchSummary, MAX_BATCH_LIMIT};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub learner_id: String,
    pub course_id: String,
    #[serde(default)]
    pub personalization_options: PersonalizationOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub request_id: Uuid,
}

/// POST /queue/process
///
/// The body is optional: an empty body processes a default-sized batch, but
/// a body that is present must be a valid `ProcessRequest`.
pub async fn handle_process(
    _caller: ServiceCaller,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchSummary>, AppError> {
    let req: ProcessRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ProcessRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            AppError::invalid_fields(vec![FieldError::new("body", e.to_string())])
        })?
    };
    let limit = match req.limit {
        None => state.policy.queue_concurrency,
        Some(n) if (1..=MAX_BATCH_LIMIT as i64).contains(&n) => n as usize,
        Some(n) => {
            return Err(AppError::invalid_fields(vec![FieldError::new(
                "limit",
                format!("must be between 1 and {MAX_BATCH_LIMIT}, got {n}"),
            )]))
        }
    };

    Ok(Json(state.queue.process_pending(limit).await?))
}

/// GET /queue/status
pub async fn handle_status(State(state): State<AppState>) -> Result<Json<QueueStatus>, AppError> {
    Ok(Json(state.queue.queue_status().await?))
}

/// POST /queue/enqueue
pub async fn handle_enqueue(
    _caller: ServiceCaller,
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AppError> {
    let learner = FieldError::uuid("learnerId", &req.learner_id);
    let course = FieldError::uuid("courseId", &req.course_id);
    let (learner_id, course_id) = match (learner, course) {
        (Ok(l), Ok(c)) => (l, c),
        (l, c) => {
            return Err(AppError::invalid_fields(
                [l.err(), c.err()].into_iter().flatten().collect(),
            ))
        }
    };

    let request_id = state
        .queue
        .enqueue(learner_id, course_id, &req.personalization_options)
        .await?;

    Ok((StatusCode::CREATED, Json(EnqueueResponse { request_id })))
}

/// GET /queue/requests/:id
pub async fn handle_get_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<GenerationRequest>, AppError> {
    Ok(Json(state.queue.get_request(request_id).await?))
}
