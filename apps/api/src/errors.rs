use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::persistence::PersistenceError;
use crate::queue::store::QueueError;
use crate::tasks::TaskError;

/// A single field-level validation failure, echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Parses a UUID-valued request field, naming the field on failure.
    pub fn uuid(field: &str, raw: &str) -> Result<Uuid, FieldError> {
        Uuid::parse_str(raw.trim())
            .map_err(|_| FieldError::new(field, format!("must be a valid UUID, got '{raw}'")))
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Generation already in flight for this learner and course (request {existing_id})")]
    Conflict { existing_id: Uuid },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Task {0} did not finish before the polling limit")]
    TaskTimeout(Uuid),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid_fields(fields: Vec<FieldError>) -> Self {
        let message = fields
            .iter()
            .map(|f| format!("{}: {}", f.field, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        AppError::Validation { message, fields }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Duplicate { existing_id } => AppError::Conflict { existing_id },
            QueueError::NotFound(id) => {
                AppError::NotFound(format!("Generation request {id} not found"))
            }
            QueueError::Corrupt(msg) => AppError::Internal(anyhow::anyhow!(msg)),
            QueueError::Database(e) => AppError::Persistence(PersistenceError::Database(e)),
        }
    }
}

impl From<TaskError> for AppError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound(id) => AppError::NotFound(format!("Task {id} not found")),
            TaskError::Timeout { task_id, .. } => AppError::TaskTimeout(task_id),
            other => AppError::Internal(anyhow::anyhow!(other)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = None;
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation { message, fields } => {
                if !fields.is_empty() {
                    details = Some(json!(fields));
                }
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message.clone())
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::Conflict { existing_id } => {
                details = Some(json!({ "existingRequestId": existing_id }));
                (StatusCode::CONFLICT, "DUPLICATE_REQUEST", self.to_string())
            }
            AppError::Persistence(e) => {
                tracing::error!("Persistence error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "PERSISTENCE_ERROR",
                    "Generated content could not be stored".to_string(),
                )
            }
            AppError::TaskTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "TASK_TIMEOUT", self.to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_fields_joins_messages() {
        let err = AppError::invalid_fields(vec![
            FieldError::new("employeeId", "must be a valid UUID"),
            FieldError::new("courseId", "must be a valid UUID"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation error: employeeId: must be a valid UUID; courseId: must be a valid UUID"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::invalid_fields(vec![FieldError::new("limit", "bad")])
                .into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Conflict {
                existing_id: Uuid::new_v4()
            }
            .into_response()
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::TaskTimeout(Uuid::new_v4()).into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_duplicate_queue_error_maps_to_conflict() {
        let id = Uuid::new_v4();
        let err: AppError = QueueError::Duplicate { existing_id: id }.into();
        assert!(matches!(err, AppError::Conflict { existing_id } if existing_id == id));
    }
}
