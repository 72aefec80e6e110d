use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog metadata for a course. Every descriptive field may be missing upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct CourseMetadata {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub skill_level: Option<String>,
    pub duration: Option<String>,
}

/// HR employee record plus the insights extracted from their CV.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct LearnerProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub skills: Vec<String>,
    pub cv_prior_experience: Option<String>,
    pub cv_tools: Vec<String>,
    pub cv_soft_skills: Vec<String>,
}

/// Fields written back to an enrollment once content exists for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentUpdate {
    pub content_id: Uuid,
}
