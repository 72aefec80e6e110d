//! Axum route handlers for the Generation API.

use axum::{extract::State, http::StatusCode, Json};
use futures::{future::join_all, stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::{AppError, FieldError};
use crate::generation::generator::{GenerationJob, PersistenceSummary};
use crate::generation::personalization::{EmployeeProfileOverride, PersonalizationOptions};
use crate::models::content::GeneratedCourseContent;
use crate::state::AppState;
use crate::tasks::{TaskError, TaskSpec};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub course_id: String,
    pub learner_id: String,
    #[serde(default)]
    pub personalization_options: PersonalizationOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub request_id: Uuid,
    pub content: GeneratedCourseContent,
    pub degraded: bool,
    pub persistence: PersistenceSummary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceRequest {
    pub employee_id: String,
    pub employee_profile: Option<EmployeeProfileOverride>,
    pub course_id: Option<String>,
    #[serde(default)]
    pub personalization_options: PersonalizationOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceResult {
    pub course_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnhanceResponse {
    pub processed: usize,
    pub results: Vec<EnhanceResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGenerateRequest {
    pub course_id: String,
    pub employee_ids: Vec<String>,
    #[serde(default)]
    pub personalization_options: PersonalizationOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub employee_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchGenerateResponse {
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
}

fn parse_ids(fields: &[(&str, &str)]) -> Result<Vec<Uuid>, AppError> {
    let mut ids = Vec::new();
    let mut errors = Vec::new();
    for (field, raw) in fields {
        match FieldError::uuid(field, raw) {
            Ok(id) => ids.push(id),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(ids)
    } else {
        Err(AppError::invalid_fields(errors))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /generate
///
/// Runs one generation synchronously. Fallback content still answers 201,
/// flagged `degraded`.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerateResponse>), AppError> {
    let ids = parse_ids(&[
        ("courseId", req.course_id.as_str()),
        ("learnerId", req.learner_id.as_str()),
    ])?;
    let (course_id, learner_id) = (ids[0], ids[1]);

    let job = GenerationJob::new(learner_id, course_id, req.personalization_options);
    let (request_id, outcome) = state.queue.run_direct(job).await?;

    Ok((
        StatusCode::CREATED,
        Json(GenerateResponse {
            request_id,
            content: outcome.content,
            degraded: outcome.degraded,
            persistence: outcome.persistence,
        }),
    ))
}

/// POST /enhance
///
/// Regenerates content for one course, or for every course the employee is
/// enrolled in, optionally with profile fields overridden for this run.
pub async fn handle_enhance(
    State(state): State<AppState>,
    Json(req): Json<EnhanceRequest>,
) -> Result<Json<EnhanceResponse>, AppError> {
    let employee_id = FieldError::uuid("employeeId", &req.employee_id)
        .map_err(|e| AppError::invalid_fields(vec![e]))?;
    let course_id = req
        .course_id
        .as_deref()
        .map(|raw| FieldError::uuid("courseId", raw))
        .transpose()
        .map_err(|e| AppError::invalid_fields(vec![e]))?;
    req.personalization_options
        .structure()
        .map_err(AppError::invalid_fields)?;

    if state.store.load_learner(employee_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Employee {employee_id} not found")));
    }

    let course_ids = match course_id {
        Some(id) => vec![id],
        None => state.store.list_enrolled_courses(employee_id).await?,
    };
    info!(
        "Enhancing {} course(s) for employee {employee_id}",
        course_ids.len()
    );

    let results: Vec<EnhanceResult> = stream::iter(course_ids)
        .map(|course_id| {
            let queue = state.queue.clone();
            let job = GenerationJob {
                profile_override: req.employee_profile.clone(),
                ..GenerationJob::new(employee_id, course_id, req.personalization_options.clone())
            };
            async move {
                match queue.run_direct(job).await {
                    Ok((_, outcome)) => EnhanceResult {
                        course_id,
                        success: true,
                        content_id: Some(outcome.content_id),
                        error: None,
                    },
                    Err(e) => EnhanceResult {
                        course_id,
                        success: false,
                        content_id: None,
                        error: Some(e.to_string()),
                    },
                }
            }
        })
        .buffered(state.queue.concurrency())
        .collect()
        .await;

    Ok(Json(EnhanceResponse {
        processed: results.len(),
        results,
    }))
}

/// POST /batch-generate
///
/// Submits one task per employee and polls each. A task that outlives the
/// polling cap is reported as failed here but keeps running.
pub async fn handle_batch_generate(
    State(state): State<AppState>,
    Json(req): Json<BatchGenerateRequest>,
) -> Result<Json<BatchGenerateResponse>, AppError> {
    let course_id = FieldError::uuid("courseId", &req.course_id)
        .map_err(|e| AppError::invalid_fields(vec![e]))?;
    if req.employee_ids.is_empty() {
        return Err(AppError::invalid_fields(vec![FieldError::new(
            "employeeIds",
            "must contain at least one id",
        )]));
    }
    req.personalization_options
        .structure()
        .map_err(AppError::invalid_fields)?;

    let interval = state.policy.task_poll_interval;
    let max_attempts = state.policy.task_poll_max_attempts;

    let pending = req.employee_ids.iter().map(|raw| {
        let tasks = state.tasks.clone();
        let options = req.personalization_options.clone();
        let raw = raw.clone();
        async move {
            let outcome: Result<Uuid, String> = async {
                let employee_id = FieldError::uuid("employeeId", &raw).map_err(|e| e.message)?;
                let task_id = tasks
                    .submit_task(TaskSpec::GenerateContent(GenerationJob::new(
                        employee_id,
                        course_id,
                        options,
                    )))
                    .await
                    .map_err(|e| e.to_string())?;
                let result = tasks
                    .poll_result(task_id, interval, max_attempts)
                    .await
                    .map_err(|e| match e {
                        TaskError::Failed { message, .. } => message,
                        other => other.to_string(),
                    })?;
                serde_json::from_value::<Uuid>(result["contentId"].clone())
                    .map_err(|e| format!("task returned no content id: {e}"))
            }
            .await;

            match outcome {
                Ok(content_id) => BatchItemResult {
                    employee_id: raw,
                    success: true,
                    content_id: Some(content_id),
                    error: None,
                },
                Err(error) => BatchItemResult {
                    employee_id: raw,
                    success: false,
                    content_id: None,
                    error: Some(error),
                },
            }
        }
    });

    let results = join_all(pending).await;
    let successful = results.iter().filter(|r| r.success).count();
    info!(
        "Batch generation for course {course_id}: {successful}/{} succeeded",
        results.len()
    );

    Ok(Json(BatchGenerateResponse {
        successful,
        failed: results.len() - successful,
        results,
    }))
}
