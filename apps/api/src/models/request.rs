use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of one (learner, course) generation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Generating => "generating",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        }
    }

    /// Pending and generating rows count against the single-flight rule.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Generating)
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "generating" => Ok(RequestStatus::Generating),
            "completed" => Ok(RequestStatus::Completed),
            "failed" => Ok(RequestStatus::Failed),
            other => Err(format!("invalid request status '{other}'")),
        }
    }
}

/// A row of `generation_requests`. Never deleted; doubles as the audit trail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub status: RequestStatus,
    pub attempts: i32,
    /// Serialized `PersonalizationOptions` captured at enqueue time.
    pub options: Value,
    pub degraded: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set whenever the row moves to `generating`.
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_content_id: Option<Uuid>,
}

#[derive(Debug, Clone, FromRow)]
pub struct GenerationRequestRow {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub options: Value,
    pub degraded: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_content_id: Option<Uuid>,
}

impl TryFrom<GenerationRequestRow> for GenerationRequest {
    type Error = String;

    fn try_from(row: GenerationRequestRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<RequestStatus>()?;
        Ok(GenerationRequest {
            id: row.id,
            learner_id: row.learner_id,
            course_id: row.course_id,
            status,
            attempts: row.attempts,
            options: row.options,
            degraded: row.degraded,
            error_message: row.error_message,
            created_at: row.created_at,
            claimed_at: row.claimed_at,
            completed_at: row.completed_at,
            result_content_id: row.result_content_id,
        })
    }
}

/// Aggregate counts returned by `GET /queue/status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub pending_count: i64,
    pub generating_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Generating,
            RequestStatus::Completed,
            RequestStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>(), Ok(status));
        }
        assert!("running".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_row_with_unknown_status_is_rejected() {
        let row = GenerationRequestRow {
            id: Uuid::new_v4(),
            learner_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            status: "queued".into(),
            attempts: 0,
            options: Value::Null,
            degraded: false,
            error_message: None,
            created_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
            result_content_id: None,
        };
        let err = GenerationRequest::try_from(row).unwrap_err();
        assert_eq!(err, "invalid request status 'queued'");
    }
}
