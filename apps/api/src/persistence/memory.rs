use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::models::content::{GeneratedCourseContent, Question, Section};
use crate::models::course::{CourseMetadata, EnrollmentUpdate, LearnerProfile};
use crate::persistence::{PersistenceAdapter, PersistenceError};

#[derive(Debug, Clone)]
pub struct Enrollment {
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub content_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct StoredSection {
    pub content_id: Uuid,
    pub module_id: Uuid,
    pub section: Section,
}

#[derive(Debug, Clone)]
pub struct StoredQuestion {
    pub content_id: Uuid,
    pub module_id: Uuid,
    pub order_index: i32,
    pub question: Question,
}

#[derive(Debug, Clone)]
pub struct Activity {
    pub learner_id: Uuid,
    pub description: String,
    pub metadata: Value,
}

/// In-memory adapter with switchable failure points.
#[derive(Default)]
pub struct MemoryPersistence {
    pub courses: Mutex<Vec<CourseMetadata>>,
    pub learners: Mutex<Vec<LearnerProfile>>,
    pub enrollments: Mutex<Vec<Enrollment>>,
    pub contents: Mutex<Vec<GeneratedCourseContent>>,
    pub sections: Mutex<Vec<StoredSection>>,
    pub questions: Mutex<Vec<StoredQuestion>>,
    pub activities: Mutex<Vec<Activity>>,
    /// Section titles whose insert fails.
    pub failing_sections: Mutex<HashSet<String>>,
    pub fail_content_insert: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_course(&self, title: &str) -> Uuid {
        let course = CourseMetadata {
            id: Uuid::new_v4(),
            title: Some(title.to_string()),
            description: Some(format!("An introduction to {title}.")),
            category: Some("Professional Skills".into()),
            skill_level: Some("Beginner".into()),
            duration: Some("2 hours".into()),
        };
        let id = course.id;
        self.courses.lock().unwrap().push(course);
        id
    }

    pub fn add_learner(&self, role: &str, department: &str) -> Uuid {
        let learner = LearnerProfile {
            id: Uuid::new_v4(),
            name: Some("Test Learner".into()),
            role: Some(role.to_string()),
            department: Some(department.to_string()),
            skills: vec!["Communication".into()],
            ..Default::default()
        };
        let id = learner.id;
        self.learners.lock().unwrap().push(learner);
        id
    }

    pub fn enroll(&self, learner_id: Uuid, course_id: Uuid) {
        self.enrollments.lock().unwrap().push(Enrollment {
            learner_id,
            course_id,
            content_id: None,
        });
    }

    pub fn active_contents(&self, learner_id: Uuid, course_id: Uuid) -> Vec<GeneratedCourseContent> {
        self.contents
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.learner_id == learner_id && c.course_id == course_id && c.is_active)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryPersistence {
    async fn load_course(
        &self,
        course_id: Uuid,
    ) -> Result<Option<CourseMetadata>, PersistenceError> {
        Ok(self
            .courses
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == course_id)
            .cloned())
    }

    async fn load_learner(
        &self,
        learner_id: Uuid,
    ) -> Result<Option<LearnerProfile>, PersistenceError> {
        Ok(self
            .learners
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == learner_id)
            .cloned())
    }

    async fn list_enrolled_courses(&self, learner_id: Uuid) -> Result<Vec<Uuid>, PersistenceError> {
        Ok(self
            .enrollments
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.learner_id == learner_id)
            .map(|e| e.course_id)
            .collect())
    }

    async fn insert_content(
        &self,
        content: &GeneratedCourseContent,
    ) -> Result<Uuid, PersistenceError> {
        if self.fail_content_insert.load(Ordering::SeqCst) {
            return Err(PersistenceError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut contents = self.contents.lock().unwrap();
        for existing in contents.iter_mut() {
            if existing.course_id == content.course_id && existing.learner_id == content.learner_id
            {
                existing.is_active = false;
            }
        }
        let mut stored = content.clone();
        stored.is_active = true;
        contents.push(stored);
        Ok(content.id)
    }

    async fn insert_section(
        &self,
        content_id: Uuid,
        module_id: Uuid,
        section: &Section,
    ) -> Result<(), PersistenceError> {
        if self.failing_sections.lock().unwrap().contains(&section.title) {
            return Err(PersistenceError::Database(sqlx::Error::Protocol(format!(
                "section '{}' rejected",
                section.title
            ))));
        }
        self.sections.lock().unwrap().push(StoredSection {
            content_id,
            module_id,
            section: section.clone(),
        });
        Ok(())
    }

    async fn insert_quiz_question(
        &self,
        content_id: Uuid,
        module_id: Uuid,
        order_index: i32,
        question: &Question,
    ) -> Result<(), PersistenceError> {
        self.questions.lock().unwrap().push(StoredQuestion {
            content_id,
            module_id,
            order_index,
            question: question.clone(),
        });
        Ok(())
    }

    async fn update_enrollment(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        update: EnrollmentUpdate,
    ) -> Result<bool, PersistenceError> {
        let mut enrollments = self.enrollments.lock().unwrap();
        let mut found = false;
        for e in enrollments
            .iter_mut()
            .filter(|e| e.learner_id == learner_id && e.course_id == course_id)
        {
            e.content_id = Some(update.content_id);
            found = true;
        }
        Ok(found)
    }

    async fn record_activity(
        &self,
        learner_id: Uuid,
        description: &str,
        metadata: Value,
    ) -> Result<(), PersistenceError> {
        self.activities.lock().unwrap().push(Activity {
            learner_id,
            description: description.to_string(),
            metadata,
        });
        Ok(())
    }
}
