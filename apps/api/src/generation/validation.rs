//! Shape validation for model output.
//!
//! The recovered JSON is read into a lenient wire shape (aliases, optional
//! fields, answers given as text / index / letter), then checked against the
//! structure every artifact must have. Any violation rejects the whole
//! response so the caller can fall back to synthesized content.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::generation::composer::CourseBrief;
use crate::generation::personalization::StructureOptions;
use crate::models::content::{
    version_tag, ContentOrigin, ContentStamp, ContentType, GeneratedCourseContent, Module,
    Question, Quiz, Section,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContent {
    title: Option<String>,
    description: Option<String>,
    #[serde(default, alias = "learning_objectives", alias = "objectives")]
    learning_objectives: Vec<String>,
    #[serde(default)]
    modules: Vec<WireModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireModule {
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    sections: Vec<WireSection>,
    quiz: Option<WireQuiz>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSection {
    title: Option<String>,
    content: Option<Value>,
    #[serde(alias = "content_type", alias = "type")]
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireQuiz {
    title: Option<String>,
    #[serde(default)]
    questions: Vec<WireQuestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireQuestion {
    #[serde(alias = "question_text", alias = "question", alias = "text")]
    question_text: Option<String>,
    #[serde(default)]
    options: Vec<Value>,
    #[serde(alias = "correct_answer", alias = "answer")]
    correct_answer: Option<Value>,
    explanation: Option<String>,
}

/// Why model output was rejected. Each entry names one violation.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentViolations(pub Vec<String>);

impl std::fmt::Display for ContentViolations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid content structure: {}", self.0.join("; "))
    }
}

impl std::error::Error for ContentViolations {}

/// Turns recovered model JSON into an artifact, or lists why it cannot.
pub fn validate_course_content(
    value: Value,
    brief: &CourseBrief,
    structure: &StructureOptions,
    stamp: &ContentStamp,
) -> Result<GeneratedCourseContent, ContentViolations> {
    let wire: WireContent = serde_json::from_value(value)
        .map_err(|e| ContentViolations(vec![format!("unexpected shape: {e}")]))?;

    let mut violations = Vec::new();

    if wire.modules.is_empty() {
        violations.push("no modules".to_string());
    }
    if wire.modules.len() != structure.module_count as usize {
        warn!(
            "Model returned {} modules, {} requested",
            wire.modules.len(),
            structure.module_count
        );
    }

    let modules: Vec<Module> = wire
        .modules
        .into_iter()
        .enumerate()
        .map(|(i, m)| build_module(i, m, structure, &mut violations))
        .collect();

    if !violations.is_empty() {
        return Err(ContentViolations(violations));
    }

    let objectives: Vec<String> = wire
        .learning_objectives
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    Ok(GeneratedCourseContent {
        id: Uuid::new_v4(),
        course_id: stamp.course_id,
        learner_id: stamp.learner_id,
        title: text_or(wire.title, &brief.title),
        description: text_or(wire.description, &brief.description),
        learning_objectives: objectives,
        modules,
        version_tag: version_tag(ContentOrigin::Model, stamp.generated_at),
        is_active: true,
        origin: ContentOrigin::Model,
        fallback_reason: None,
        generated_at: stamp.generated_at,
    })
}

fn build_module(
    index: usize,
    wire: WireModule,
    structure: &StructureOptions,
    violations: &mut Vec<String>,
) -> Module {
    let title = text_or(wire.title, &format!("Module {}", index + 1));

    if wire.sections.is_empty() {
        violations.push(format!("module '{title}' has no sections"));
    }

    let sections = wire
        .sections
        .into_iter()
        .enumerate()
        .map(|(j, s)| {
            let section_title = text_or(s.title, &format!("Section {}", j + 1));
            let content = s.content.map(flatten_content).unwrap_or_default();
            if content.trim().is_empty() {
                violations.push(format!(
                    "section '{section_title}' of module '{title}' has no content"
                ));
            }
            Section {
                id: Uuid::new_v4(),
                title: section_title,
                content,
                order_index: j as i32 + 1,
                content_type: s
                    .content_type
                    .as_deref()
                    .map(ContentType::from_label)
                    .unwrap_or(ContentType::Text),
            }
        })
        .collect();

    let quiz = match wire.quiz {
        Some(quiz) if structure.include_quiz && quiz.questions.is_empty() => {
            warn!("Module '{title}' came back with an empty quiz; dropping it");
            None
        }
        Some(quiz) if structure.include_quiz => Some(build_quiz(&title, quiz, violations)),
        Some(_) => None,
        None => {
            if structure.include_quiz {
                warn!("Module '{title}' came back without a quiz");
            }
            None
        }
    };

    Module {
        id: Uuid::new_v4(),
        description: wire.description.unwrap_or_default().trim().to_string(),
        title,
        order_index: index as i32 + 1,
        sections,
        quiz,
    }
}

fn build_quiz(module_title: &str, wire: WireQuiz, violations: &mut Vec<String>) -> Quiz {
    let questions = wire
        .questions
        .into_iter()
        .filter_map(|q| build_question(module_title, q, violations))
        .collect();

    Quiz {
        title: text_or(wire.title, &format!("Quiz: {module_title}")),
        questions,
    }
}

fn build_question(
    module_title: &str,
    wire: WireQuestion,
    violations: &mut Vec<String>,
) -> Option<Question> {
    let Some(question_text) = wire
        .question_text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
    else {
        violations.push(format!("a question in module '{module_title}' has no text"));
        return None;
    };

    let (ids, listed): (Vec<Option<String>>, Vec<String>) =
        wire.options.iter().filter_map(read_option).unzip();

    // Indexes and letters refer to the options as listed, so resolve first.
    let answer = wire
        .correct_answer
        .as_ref()
        .and_then(|answer| resolve_answer(answer, &listed, &ids));

    let mut options: Vec<String> = Vec::with_capacity(listed.len());
    for option in listed {
        if !options.iter().any(|kept| kept.eq_ignore_ascii_case(&option)) {
            options.push(option);
        }
    }

    if options.len() < 2 {
        violations.push(format!(
            "question '{question_text}' has fewer than two distinct options"
        ));
        return None;
    }

    let Some(correct_answer) = answer.and_then(|answer| {
        options
            .iter()
            .find(|kept| kept.eq_ignore_ascii_case(&answer))
            .cloned()
    }) else {
        violations.push(format!(
            "question '{question_text}' has no answer matching its options"
        ));
        return None;
    };

    Some(Question {
        question_text,
        options,
        correct_answer,
        explanation: wire.explanation.unwrap_or_default().trim().to_string(),
    })
}

/// Options arrive as plain strings or as `{"id": "a", "text": "..."}` objects.
fn read_option(value: &Value) -> Option<(Option<String>, String)> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some((None, s.trim().to_string())),
        Value::Object(map) => {
            let text = map
                .get("text")
                .or_else(|| map.get("value"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())?;
            let id = map.get("id").and_then(Value::as_str).map(str::to_string);
            Some((id, text.to_string()))
        }
        _ => None,
    }
}

/// Normalizes an answer to the text of the option it designates.
///
/// Accepted, in order: exact option text, case-insensitive option text,
/// option id, 0-based integer index (number or numeric string), option letter.
fn resolve_answer(answer: &Value, options: &[String], ids: &[Option<String>]) -> Option<String> {
    match answer {
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| options.get(i as usize))
            .cloned(),
        Value::String(raw) => {
            let raw = raw.trim();
            if let Some(exact) = options.iter().find(|o| o.as_str() == raw) {
                return Some(exact.clone());
            }
            if let Some(folded) = options.iter().find(|o| o.eq_ignore_ascii_case(raw)) {
                return Some(folded.clone());
            }
            if let Some(pos) = ids.iter().position(|id| id.as_deref() == Some(raw)) {
                return options.get(pos).cloned();
            }
            if let Ok(index) = raw.parse::<usize>() {
                return options.get(index).cloned();
            }
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(letter), None) if letter.is_ascii_alphabetic() => {
                    let index = (letter.to_ascii_lowercase() as u8 - b'a') as usize;
                    options.get(index).cloned()
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Section content may be a string or a list of `{type, value}` blocks.
fn flatten_content(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map
                    .get("value")
                    .or_else(|| map.get("text"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn text_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
