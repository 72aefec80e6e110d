//! Durable storage of `generation_requests` rows.
//!
//! Every status transition is a compare-and-set on the current status, and the
//! partial unique index on `(learner_id, course_id) WHERE status IN
//! ('pending', 'generating')` is what enforces single-flight.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::request::{GenerationRequest, GenerationRequestRow, QueueStatus};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("a generation for this learner and course is already in flight (request {existing_id})")]
    Duplicate { existing_id: Uuid },

    #[error("generation request {0} not found")]
    NotFound(Uuid),

    #[error("corrupt generation request row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of one `reclaim_stale` sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleClaims {
    pub requeued: u64,
    pub failed: u64,
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Inserts a `pending` row, or reports the pair's in-flight row.
    async fn insert_pending(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        options: Value,
    ) -> Result<Uuid, QueueError>;

    /// Inserts a row that is already `generating` with one attempt, for
    /// callers that run the chain themselves.
    async fn begin_direct(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        options: Value,
    ) -> Result<Uuid, QueueError>;

    /// Moves up to `limit` of the oldest pending rows to `generating` and
    /// returns them. A row is only ever handed to one caller.
    async fn claim_pending(&self, limit: usize) -> Result<Vec<GenerationRequest>, QueueError>;

    async fn complete(&self, id: Uuid, content_id: Uuid, degraded: bool) -> Result<(), QueueError>;

    async fn fail(&self, id: Uuid, message: &str) -> Result<(), QueueError>;

    /// Releases `generating` rows claimed more than `older_than` ago. Rows
    /// with fewer than `max_attempts` attempts go back to `pending`; the
    /// rest are failed.
    async fn reclaim_stale(
        &self,
        older_than: Duration,
        max_attempts: i32,
    ) -> Result<StaleClaims, QueueError>;

    async fn counts(&self) -> Result<QueueStatus, QueueError>;

    async fn get(&self, id: Uuid) -> Result<GenerationRequest, QueueError>;
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_in_flight(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        options: Value,
        status: &str,
        attempts: i32,
    ) -> Result<Uuid, QueueError> {
        // The in-flight row can finish between the insert and the lookup;
        // go around again in that case.
        for _ in 0..3 {
            let inserted: Option<Uuid> = sqlx::query_scalar(
                r#"
                INSERT INTO generation_requests
                    (id, learner_id, course_id, status, attempts, options, claimed_at)
                VALUES ($1, $2, $3, $4, $5, $6,
                        CASE WHEN $4 = 'generating' THEN NOW() END)
                ON CONFLICT (learner_id, course_id) WHERE status IN ('pending', 'generating')
                DO NOTHING
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(learner_id)
            .bind(course_id)
            .bind(status)
            .bind(attempts)
            .bind(&options)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(id) = inserted {
                return Ok(id);
            }

            let existing: Option<Uuid> = sqlx::query_scalar(
                r#"
                SELECT id FROM generation_requests
                WHERE learner_id = $1 AND course_id = $2 AND status IN ('pending', 'generating')
                LIMIT 1
                "#,
            )
            .bind(learner_id)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(existing_id) = existing {
                return Err(QueueError::Duplicate { existing_id });
            }
            debug!("In-flight row for learner {learner_id} course {course_id} vanished; retrying insert");
        }

        Err(QueueError::Corrupt(format!(
            "could not settle single-flight slot for learner {learner_id} course {course_id}"
        )))
    }
}

fn into_request(row: GenerationRequestRow) -> Result<GenerationRequest, QueueError> {
    GenerationRequest::try_from(row).map_err(QueueError::Corrupt)
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn insert_pending(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        options: Value,
    ) -> Result<Uuid, QueueError> {
        self.insert_in_flight(learner_id, course_id, options, "pending", 0)
            .await
    }

    async fn begin_direct(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        options: Value,
    ) -> Result<Uuid, QueueError> {
        self.insert_in_flight(learner_id, course_id, options, "generating", 1)
            .await
    }

    async fn claim_pending(&self, limit: usize) -> Result<Vec<GenerationRequest>, QueueError> {
        let rows = sqlx::query_as::<_, GenerationRequestRow>(
            r#"
            UPDATE generation_requests
            SET status = 'generating', attempts = attempts + 1, claimed_at = NOW()
            WHERE status = 'pending'
              AND id IN (
                SELECT id FROM generation_requests
                WHERE status = 'pending'
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
              )
            RETURNING *
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = rows
            .into_iter()
            .map(into_request)
            .collect::<Result<Vec<_>, _>>()?;
        claimed.sort_by_key(|r| r.created_at);
        Ok(claimed)
    }

    async fn complete(&self, id: Uuid, content_id: Uuid, degraded: bool) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE generation_requests
            SET status = 'completed', completed_at = NOW(),
                result_content_id = $2, degraded = $3, error_message = NULL
            WHERE id = $1 AND status = 'generating'
            "#,
        )
        .bind(id)
        .bind(content_id)
        .bind(degraded)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!("Request {id} was not generating when completion arrived");
            self.get(id).await?;
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, message: &str) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE generation_requests
            SET status = 'failed', completed_at = NOW(), error_message = $2
            WHERE id = $1 AND status = 'generating'
            "#,
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!("Request {id} was not generating when failure arrived");
            self.get(id).await?;
        }
        Ok(())
    }

    async fn reclaim_stale(
        &self,
        older_than: Duration,
        max_attempts: i32,
    ) -> Result<StaleClaims, QueueError> {
        let cutoff_secs = older_than.as_secs_f64();

        let failed = sqlx::query(
            r#"
            UPDATE generation_requests
            SET status = 'failed', completed_at = NOW(),
                error_message = 'abandoned after ' || attempts || ' attempts'
            WHERE status = 'generating'
              AND COALESCE(claimed_at, created_at) < NOW() - make_interval(secs => $1)
              AND attempts >= $2
            "#,
        )
        .bind(cutoff_secs)
        .bind(max_attempts)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let requeued = sqlx::query(
            r#"
            UPDATE generation_requests
            SET status = 'pending', claimed_at = NULL
            WHERE status = 'generating'
              AND COALESCE(claimed_at, created_at) < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(cutoff_secs)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(StaleClaims { requeued, failed })
    }

    async fn counts(&self) -> Result<QueueStatus, QueueError> {
        let (pending_count, generating_count): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FILTER (WHERE status = 'pending'),
                   COUNT(*) FILTER (WHERE status = 'generating')
            FROM generation_requests
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStatus {
            pending_count,
            generating_count,
        })
    }

    async fn get(&self, id: Uuid) -> Result<GenerationRequest, QueueError> {
        let row = sqlx::query_as::<_, GenerationRequestRow>(
            "SELECT * FROM generation_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(QueueError::NotFound(id))?;
        into_request(row)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory (tests)
// ────────────────────────────────────────────────────────────────────────────
