use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::content::{GeneratedCourseContent, Question, Section};
use crate::models::course::{CourseMetadata, EnrollmentUpdate, LearnerProfile};
use crate::persistence::snapshot::upload_snapshot;
use crate::persistence::{PersistenceAdapter, PersistenceError};

/// PostgreSQL-backed adapter. Artifacts are additionally mirrored to S3 as
/// Markdown; a failed upload is logged and leaves `snapshot_key` NULL.
#[derive(Clone)]
pub struct PgPersistence {
    pool: PgPool,
    s3: aws_sdk_s3::Client,
    bucket: String,
}

impl PgPersistence {
    pub fn new(pool: PgPool, s3: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            pool,
            s3,
            bucket: bucket.into(),
        }
    }

    async fn mirror_snapshot(&self, content: &GeneratedCourseContent) {
        match upload_snapshot(&self.s3, &self.bucket, content).await {
            Ok(key) => {
                let recorded =
                    sqlx::query("UPDATE generated_course_content SET snapshot_key = $1 WHERE id = $2")
                        .bind(&key)
                        .bind(content.id)
                        .execute(&self.pool)
                        .await;
                if let Err(e) = recorded {
                    warn!("Could not record snapshot key for content {}: {e}", content.id);
                }
            }
            Err(e) => warn!("Snapshot upload skipped for content {}: {e}", content.id),
        }
    }
}

#[async_trait]
impl PersistenceAdapter for PgPersistence {
    async fn load_course(
        &self,
        course_id: Uuid,
    ) -> Result<Option<CourseMetadata>, PersistenceError> {
        Ok(sqlx::query_as::<_, CourseMetadata>(
            r#"
            SELECT id, title, description, category, skill_level, duration
            FROM courses
            WHERE id = $1
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn load_learner(
        &self,
        learner_id: Uuid,
    ) -> Result<Option<LearnerProfile>, PersistenceError> {
        Ok(sqlx::query_as::<_, LearnerProfile>(
            r#"
            SELECT id, name, role, department,
                   COALESCE(skills, '{}') AS skills,
                   cv_prior_experience,
                   COALESCE(cv_tools, '{}') AS cv_tools,
                   COALESCE(cv_soft_skills, '{}') AS cv_soft_skills
            FROM employees
            WHERE id = $1
            "#,
        )
        .bind(learner_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_enrolled_courses(&self, learner_id: Uuid) -> Result<Vec<Uuid>, PersistenceError> {
        Ok(sqlx::query_scalar(
            "SELECT course_id FROM course_enrollments WHERE employee_id = $1 ORDER BY enrolled_at ASC",
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_content(
        &self,
        content: &GeneratedCourseContent,
    ) -> Result<Uuid, PersistenceError> {
        let objectives = serde_json::to_value(&content.learning_objectives)?;
        let modules = serde_json::to_value(&content.modules)?;

        let mut tx = self.pool.begin().await?;

        let superseded = sqlx::query(
            r#"
            UPDATE generated_course_content
            SET is_active = FALSE
            WHERE course_id = $1 AND learner_id = $2 AND is_active
            "#,
        )
        .bind(content.course_id)
        .bind(content.learner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO generated_course_content
                (id, course_id, learner_id, title, description, learning_objectives,
                 modules, version_tag, is_active, origin, fallback_reason, generated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, $10, $11)
            "#,
        )
        .bind(content.id)
        .bind(content.course_id)
        .bind(content.learner_id)
        .bind(&content.title)
        .bind(&content.description)
        .bind(&objectives)
        .bind(&modules)
        .bind(&content.version_tag)
        .bind(content.origin.as_str())
        .bind(&content.fallback_reason)
        .bind(content.generated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Stored content {} ({}) for learner {} course {}; superseded {superseded}",
            content.id,
            content.version_tag,
            content.learner_id,
            content.course_id
        );

        self.mirror_snapshot(content).await;
        Ok(content.id)
    }

    async fn insert_section(
        &self,
        content_id: Uuid,
        module_id: Uuid,
        section: &Section,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO content_sections
                (id, content_id, module_id, title, content, order_index, content_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(section.id)
        .bind(content_id)
        .bind(module_id)
        .bind(&section.title)
        .bind(&section.content)
        .bind(section.order_index)
        .bind(section.content_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_quiz_question(
        &self,
        content_id: Uuid,
        module_id: Uuid,
        order_index: i32,
        question: &Question,
    ) -> Result<(), PersistenceError> {
        let options = serde_json::to_value(&question.options)?;
        sqlx::query(
            r#"
            INSERT INTO content_quiz_questions
                (content_id, module_id, order_index, question_text, options,
                 correct_answer, explanation)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(content_id)
        .bind(module_id)
        .bind(order_index)
        .bind(&question.question_text)
        .bind(&options)
        .bind(&question.correct_answer)
        .bind(&question.explanation)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_enrollment(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        update: EnrollmentUpdate,
    ) -> Result<bool, PersistenceError> {
        let result = sqlx::query(
            r#"
            UPDATE course_enrollments
            SET generated_content_id = $1, personalized_at = NOW()
            WHERE employee_id = $2 AND course_id = $3
            "#,
        )
        .bind(update.content_id)
        .bind(learner_id)
        .bind(course_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_activity(
        &self,
        learner_id: Uuid,
        description: &str,
        metadata: Value,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO learner_activities (learner_id, activity_type, description, metadata)
            VALUES ($1, 'content_generated', $2, $3)
            "#,
        )
        .bind(learner_id)
        .bind(description)
        .bind(&metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
