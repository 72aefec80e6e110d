//! Content Generation: orchestrates one personalized generation end to end.
//!
//! Flow: validate options → load course + learner → build context → compose
//!       prompt → LLM generate → validate shape (or fall back) → persist.
//!
//! Upstream and parse failures never reach the caller: they are absorbed by
//! the fallback synthesizer and reported as `degraded`. Only bad input,
//! missing records and an unreachable store surface as errors.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::composer::{compose_course_prompt, CourseBrief};
use crate::generation::fallback::synthesize_fallback;
use crate::generation::personalization::{
    EmployeeProfileOverride, PersonalizationContext, PersonalizationOptions, StructureOptions,
};
use crate::generation::validation::validate_course_content;
use crate::llm_client::LlmClient;
use crate::models::content::{ContentStamp, GeneratedCourseContent};
use crate::models::course::EnrollmentUpdate;
use crate::persistence::PersistenceAdapter;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Everything needed to run one generation.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    /// The `generation_requests` row this run belongs to, when there is one.
    pub request_id: Option<Uuid>,
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub options: PersonalizationOptions,
    pub profile_override: Option<EmployeeProfileOverride>,
}

impl GenerationJob {
    pub fn new(learner_id: Uuid, course_id: Uuid, options: PersonalizationOptions) -> Self {
        Self {
            request_id: None,
            learner_id,
            course_id,
            options,
            profile_override: None,
        }
    }
}

/// How many child rows made it to storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceSummary {
    pub modules_planned: usize,
    pub sections_written: usize,
    pub sections_failed: usize,
    pub questions_written: usize,
    pub questions_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub content_id: Uuid,
    pub content: GeneratedCourseContent,
    /// True when the content came from the fallback synthesizer.
    pub degraded: bool,
    pub persistence: PersistenceSummary,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ContentPipeline {
    llm: LlmClient,
    store: Arc<dyn PersistenceAdapter>,
}

impl ContentPipeline {
    pub fn new(llm: LlmClient, store: Arc<dyn PersistenceAdapter>) -> Self {
        Self { llm, store }
    }

    /// Runs the whole chain for one (learner, course) pair.
    pub async fn run(&self, job: &GenerationJob) -> Result<GenerationOutcome, AppError> {
        let structure = job.options.structure().map_err(AppError::invalid_fields)?;

        let course = self
            .store
            .load_course(job.course_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", job.course_id)))?;
        let learner = self
            .store
            .load_learner(job.learner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Learner {} not found", job.learner_id)))?;

        let brief = CourseBrief::from(&course);
        let context =
            PersonalizationContext::build(&learner, job.profile_override.as_ref(), &job.options);
        let stamp = ContentStamp::now(job.course_id, job.learner_id);

        let content = self.produce(&brief, &context, &structure, &stamp).await;
        let degraded = content.fallback_reason.is_some();

        let content_id = self.store.insert_content(&content).await?;
        let persistence = self.persist_children(content_id, &content).await;

        self.link_enrollment(job, content_id).await;
        self.log_activity(job, &brief, &content, content_id).await;

        info!(
            "Generated content {} for learner {} course {} (origin={}, sections {}/{}, questions {}/{})",
            content_id,
            job.learner_id,
            job.course_id,
            content.origin.as_str(),
            persistence.sections_written,
            content.section_count(),
            persistence.questions_written,
            content.question_count(),
        );

        Ok(GenerationOutcome {
            content_id,
            content,
            degraded,
            persistence,
        })
    }

    /// Model output when it is usable, synthesized content otherwise.
    async fn produce(
        &self,
        brief: &CourseBrief,
        context: &PersonalizationContext,
        structure: &StructureOptions,
        stamp: &ContentStamp,
    ) -> GeneratedCourseContent {
        let request = compose_course_prompt(brief, context, structure).into_request();

        let reason = match self.llm.generate(&request).await {
            Ok(value) => match validate_course_content(value, brief, structure, stamp) {
                Ok(content) => return content,
                Err(violations) => violations.to_string(),
            },
            Err(e) if e.is_parse() => format!("unusable model output: {e}"),
            Err(e) => e.to_string(),
        };

        warn!(
            "Falling back to synthesized content for course {} learner {}: {}",
            stamp.course_id, stamp.learner_id, reason
        );
        synthesize_fallback(brief, context, structure, stamp, &reason)
    }

    /// Child rows are written one by one; a failed row is logged and counted.
    async fn persist_children(
        &self,
        content_id: Uuid,
        content: &GeneratedCourseContent,
    ) -> PersistenceSummary {
        let mut summary = PersistenceSummary {
            modules_planned: content.modules.len(),
            ..Default::default()
        };

        for module in &content.modules {
            for section in &module.sections {
                match self
                    .store
                    .insert_section(content_id, module.id, section)
                    .await
                {
                    Ok(()) => summary.sections_written += 1,
                    Err(e) => {
                        warn!(
                            "Skipping section '{}' of module {}: {e}",
                            section.title, module.id
                        );
                        summary.sections_failed += 1;
                    }
                }
            }

            let questions = module.quiz.iter().flat_map(|q| q.questions.iter());
            for (i, question) in questions.enumerate() {
                match self
                    .store
                    .insert_quiz_question(content_id, module.id, i as i32 + 1, question)
                    .await
                {
                    Ok(()) => summary.questions_written += 1,
                    Err(e) => {
                        warn!("Skipping quiz question {} of module {}: {e}", i + 1, module.id);
                        summary.questions_failed += 1;
                    }
                }
            }
        }

        summary
    }

    async fn link_enrollment(&self, job: &GenerationJob, content_id: Uuid) {
        match self
            .store
            .update_enrollment(job.learner_id, job.course_id, EnrollmentUpdate { content_id })
            .await
        {
            Ok(true) => {}
            Ok(false) => info!(
                "No enrollment for learner {} course {}; content {} left unlinked",
                job.learner_id, job.course_id, content_id
            ),
            Err(e) => warn!("Enrollment update failed for content {content_id}: {e}"),
        }
    }

    async fn log_activity(
        &self,
        job: &GenerationJob,
        brief: &CourseBrief,
        content: &GeneratedCourseContent,
        content_id: Uuid,
    ) {
        let metadata = json!({
            "courseId": job.course_id,
            "contentId": content_id,
            "origin": content.origin,
            "requestId": job.request_id,
        });
        let description = format!("Personalized content generated for course {}", brief.title);

        if let Err(e) = self
            .store
            .record_activity(job.learner_id, &description, metadata)
            .await
        {
            warn!("Activity log failed for content {content_id}: {e}");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Test support
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use serde_json::json;

    use super::ContentPipeline;
    use crate::llm_client::transport::testing::ScriptedTransport;
    use crate::llm_client::{LlmClient, RetryPolicy};
    use crate::persistence::memory::MemoryPersistence;

    /// Well-formed model output with `modules` modules of two sections and a quiz each.
    pub fn model_course_json(modules: usize) -> String {
        let modules: Vec<_> = (1..=modules)
            .map(|i| {
                json!({
                    "title": format!("Module {i}"),
                    "description": "Module overview",
                    "sections": [
                        {"title": "Concepts", "content": "Lesson text", "contentType": "text"},
                        {"title": "Practice", "content": "Try it", "contentType": "exercise"}
                    ],
                    "quiz": {
                        "title": "Check",
                        "questions": [
                            {"questionText": "Q1?", "options": ["Yes", "No"], "correctAnswer": "Yes", "explanation": "E"},
                            {"questionText": "Q2?", "options": ["A", "B", "C"], "correctAnswer": 2, "explanation": "E"},
                            {"questionText": "Q3?", "options": ["Up", "Down"], "correctAnswer": "b", "explanation": "E"}
                        ]
                    }
                })
            })
            .collect();

        json!({
            "title": "Personalized Course",
            "description": "Made for you",
            "learningObjectives": ["Learn", "Apply"],
            "modules": modules
        })
        .to_string()
    }

    pub fn pipeline(
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryPersistence>,
    ) -> ContentPipeline {
        let llm = LlmClient::new(transport, "test-model", RetryPolicy::default());
        ContentPipeline::new(llm, store)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
