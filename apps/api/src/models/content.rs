use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an artifact's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentOrigin {
    Model,
    Fallback,
}

impl ContentOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentOrigin::Model => "model",
            ContentOrigin::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Video,
    Interactive,
    Exercise,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Video => "video",
            ContentType::Interactive => "interactive",
            ContentType::Exercise => "exercise",
        }
    }

    /// Lenient mapping for model output; unknown labels read as text.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "video" => ContentType::Video,
            "interactive" => ContentType::Interactive,
            "exercise" | "practice" | "hands-on" => ContentType::Exercise,
            _ => ContentType::Text,
        }
    }
}

/// A personalized learning artifact for one (course, learner) pair.
///
/// Superseded, never mutated: a later generation inserts a new row and
/// flips `is_active` on the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCourseContent {
    pub id: Uuid,
    pub course_id: Uuid,
    pub learner_id: Uuid,
    pub title: String,
    pub description: String,
    pub learning_objectives: Vec<String>,
    pub modules: Vec<Module>,
    pub version_tag: String,
    pub is_active: bool,
    pub origin: ContentOrigin,
    pub fallback_reason: Option<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Surrogate id, generated once per module per run. Child rows reference it.
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub order_index: i32,
    pub sections: Vec<Section>,
    pub quiz: Option<Quiz>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub order_index: i32,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub title: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_text: String,
    pub options: Vec<String>,
    /// Always the text of one element of `options`.
    pub correct_answer: String,
    pub explanation: String,
}

impl GeneratedCourseContent {
    pub fn section_count(&self) -> usize {
        self.modules.iter().map(|m| m.sections.len()).sum()
    }

    pub fn question_count(&self) -> usize {
        self.modules
            .iter()
            .filter_map(|m| m.quiz.as_ref())
            .map(|q| q.questions.len())
            .sum()
    }

    /// Checks the shape every persisted artifact must have, whatever its origin.
    pub fn structural_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.modules.is_empty() {
            violations.push("content has no modules".to_string());
        }
        for module in &self.modules {
            if module.sections.is_empty() {
                violations.push(format!("module '{}' has no sections", module.title));
            }
            if module.quiz.as_ref().is_some_and(|q| q.questions.is_empty()) {
                violations.push(format!("module '{}' has an empty quiz", module.title));
            }
            for question in module.quiz.iter().flat_map(|q| q.questions.iter()) {
                if distinct_option_count(&question.options) < 2 {
                    violations.push(format!(
                        "question '{}' has fewer than two distinct options",
                        question.question_text
                    ));
                }
                if !question.options.contains(&question.correct_answer) {
                    violations.push(format!(
                        "question '{}' has an answer outside its options",
                        question.question_text
                    ));
                }
            }
        }
        violations
    }
}

/// Identity and timestamp shared by every artifact built in one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentStamp {
    pub course_id: Uuid,
    pub learner_id: Uuid,
    pub generated_at: DateTime<Utc>,
}

impl ContentStamp {
    pub fn now(course_id: Uuid, learner_id: Uuid) -> Self {
        Self {
            course_id,
            learner_id,
            generated_at: Utc::now(),
        }
    }
}

/// `"<origin>-<yyyymmddHHMMSSmmm>"`, e.g. `model-20260101120000042`.
pub fn version_tag(origin: ContentOrigin, at: DateTime<Utc>) -> String {
    format!("{}-{}", origin.as_str(), at.format("%Y%m%d%H%M%S%3f"))
}

/// Number of options that differ once case is ignored.
pub fn distinct_option_count(options: &[String]) -> usize {
    let mut seen: Vec<String> = Vec::with_capacity(options.len());
    for option in options {
        let folded = option.trim().to_lowercase();
        if !seen.contains(&folded) {
            seen.push(folded);
        }
    }
    seen.len()
}
