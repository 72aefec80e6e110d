//! Persistence Adapter: the storage collaborator the pipeline writes through.
//!
//! The pipeline only sees the `PersistenceAdapter` trait. `PgPersistence`
//! backs it with PostgreSQL plus a best-effort S3 Markdown snapshot;
//! `memory::MemoryPersistence` backs it in tests.

pub mod postgres;
pub mod snapshot;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::content::{GeneratedCourseContent, Question, Section};
use crate::models::course::{CourseMetadata, EnrollmentUpdate, LearnerProfile};

pub use postgres::PgPersistence;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("object storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn load_course(&self, course_id: Uuid)
        -> Result<Option<CourseMetadata>, PersistenceError>;

    async fn load_learner(
        &self,
        learner_id: Uuid,
    ) -> Result<Option<LearnerProfile>, PersistenceError>;

    /// Course ids the learner is enrolled in, oldest enrollment first.
    async fn list_enrolled_courses(&self, learner_id: Uuid) -> Result<Vec<Uuid>, PersistenceError>;

    /// Stores a new artifact and deactivates the previous active one for
    /// the same (course, learner) pair atomically. Returns the artifact id.
    async fn insert_content(
        &self,
        content: &GeneratedCourseContent,
    ) -> Result<Uuid, PersistenceError>;

    async fn insert_section(
        &self,
        content_id: Uuid,
        module_id: Uuid,
        section: &Section,
    ) -> Result<(), PersistenceError>;

    async fn insert_quiz_question(
        &self,
        content_id: Uuid,
        module_id: Uuid,
        order_index: i32,
        question: &Question,
    ) -> Result<(), PersistenceError>;

    /// Returns false when no enrollment exists for the pair.
    async fn update_enrollment(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        update: EnrollmentUpdate,
    ) -> Result<bool, PersistenceError>;

    async fn record_activity(
        &self,
        learner_id: Uuid,
        description: &str,
        metadata: Value,
    ) -> Result<(), PersistenceError>;
}
