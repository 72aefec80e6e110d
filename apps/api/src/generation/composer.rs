//! Prompt Composer: builds the system + user prompt for one personalized generation.
//!
//! Pure: no I/O, and missing course fields become placeholders instead of errors.

use serde_json::json;

use crate::generation::personalization::{PersonalizationContext, StructureOptions};
use crate::generation::prompts::{
    COURSE_GENERATION_PROMPT_TEMPLATE, COURSE_GENERATION_SYSTEM, QUIZ_OMITTED_RULE,
    QUIZ_REQUIRED_RULE,
};
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, PERSONALIZATION_INSTRUCTION};
use crate::llm_client::CompletionRequest;
use crate::models::course::CourseMetadata;

/// Course metadata with placeholders filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseBrief {
    pub title: String,
    pub description: String,
    pub category: String,
    pub skill_level: String,
    pub duration: String,
}

impl From<&CourseMetadata> for CourseBrief {
    fn from(course: &CourseMetadata) -> Self {
        Self {
            title: or_placeholder(&course.title, "Untitled Course"),
            description: or_placeholder(&course.description, "No description provided."),
            category: or_placeholder(&course.category, "General"),
            skill_level: or_placeholder(&course.skill_level, "Intermediate"),
            duration: or_placeholder(&course.duration, "Self-paced"),
        }
    }
}

fn or_placeholder(value: &Option<String>, placeholder: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(placeholder)
        .to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
}

impl ComposedPrompt {
    pub fn into_request(self) -> CompletionRequest {
        CompletionRequest::creative(self.system, self.user)
    }
}

pub fn compose_course_prompt(
    course: &CourseBrief,
    context: &PersonalizationContext,
    structure: &StructureOptions,
) -> ComposedPrompt {
    let course_json = json!({
        "title": course.title,
        "description": course.description,
        "category": course.category,
        "skillLevel": course.skill_level,
        "duration": course.duration,
    });

    let learner_json = json!({
        "role": context.role,
        "department": context.department,
        "skills": context.skills,
        "priorExperience": context.prior_experience,
        "tools": context.tools,
        "softSkills": context.soft_skills,
        "learningStyle": context.learning_style,
        "difficulty": context.difficulty,
        "pace": context.pace,
        "interests": context.interests,
    });

    let quiz_rule = if structure.include_quiz {
        QUIZ_REQUIRED_RULE
    } else {
        QUIZ_OMITTED_RULE
    };

    let user = COURSE_GENERATION_PROMPT_TEMPLATE
        .replace("{personalization_instruction}", PERSONALIZATION_INSTRUCTION)
        .replace("{course_json}", &pretty(&course_json))
        .replace("{learner_json}", &pretty(&learner_json))
        .replace("{module_count}", &structure.module_count.to_string())
        .replace(
            "{sections_per_module}",
            &structure.sections_per_module.to_string(),
        )
        .replace("{quiz_rule}", quiz_rule);

    ComposedPrompt {
        system: COURSE_GENERATION_SYSTEM.replace("{json_only}", JSON_ONLY_SYSTEM),
        user,
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn context() -> PersonalizationContext {
        PersonalizationContext {
            role: "Sales Rep".into(),
            department: "Sales".into(),
            skills: vec!["Prospecting".into()],
            prior_experience: Some("Retail banking".into()),
            tools: vec!["Salesforce".into()],
            soft_skills: vec!["Active listening".into()],
            learning_style: "hands-on".into(),
            difficulty: "beginner".into(),
            pace: "fast".into(),
            interests: vec!["Enterprise deals".into()],
        }
    }

    fn course() -> CourseBrief {
        CourseBrief::from(&CourseMetadata {
            id: Uuid::new_v4(),
            title: Some("Intro to Negotiation".into()),
            description: Some("Foundations of principled negotiation.".into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_missing_course_fields_get_placeholders() {
        let brief = CourseBrief::from(&CourseMetadata {
            id: Uuid::new_v4(),
            title: Some("  ".into()),
            ..Default::default()
        });
        assert_eq!(brief.title, "Untitled Course");
        assert_eq!(brief.category, "General");
        assert_eq!(brief.duration, "Self-paced");
    }

    #[test]
    fn test_prompt_embeds_every_personalization_field() {
        let prompt = compose_course_prompt(&course(), &context(), &StructureOptions::default());
        for expected in [
            "Sales Rep",
            "Sales",
            "Prospecting",
            "Retail banking",
            "Salesforce",
            "Active listening",
            "hands-on",
            "beginner",
            "fast",
            "Enterprise deals",
            "Intro to Negotiation",
        ] {
            assert!(prompt.user.contains(expected), "prompt missing {expected}");
        }
        assert!(!prompt.user.contains("{module_count}"));
        assert!(prompt.system.contains("valid JSON only"));
    }

    #[test]
    fn test_prompt_states_structure_and_quiz_rule() {
        let structure = StructureOptions {
            module_count: 3,
            sections_per_module: 2,
            include_quiz: true,
        };
        let prompt = compose_course_prompt(&course(), &context(), &structure);
        assert!(prompt.user.contains("EXACTLY 3 modules"));
        assert!(prompt.user.contains("EXACTLY 2 sections"));
        assert!(prompt.user.contains("3 to 5 questions"));

        let no_quiz = StructureOptions {
            include_quiz: false,
            ..structure
        };
        let prompt = compose_course_prompt(&course(), &context(), &no_quiz);
        assert!(prompt.user.contains("Do NOT include quizzes"));
    }

    #[test]
    fn test_into_request_uses_creative_settings() {
        let request = compose_course_prompt(&course(), &context(), &StructureOptions::default())
            .into_request();
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 4096);
    }
}
