//! Personalization inputs: caller-supplied options, per-run profile overrides,
//! and the immutable context snapshot handed to the prompt composer.

use serde::{Deserialize, Serialize};

use crate::errors::FieldError;
use crate::models::course::LearnerProfile;

pub const MIN_MODULES: i64 = 1;
pub const MAX_MODULES: i64 = 10;
pub const MIN_SECTIONS: i64 = 1;
pub const MAX_SECTIONS: i64 = 10;
pub const DEFAULT_MODULES: u8 = 4;
pub const DEFAULT_SECTIONS: u8 = 3;

pub const DEFAULT_ROLE: &str = "Professional";
pub const DEFAULT_DEPARTMENT: &str = "General";

/// `personalizationOptions` as accepted on the wire. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalizationOptions {
    pub learning_style: Option<String>,
    pub difficulty: Option<String>,
    pub pace: Option<String>,
    pub interests: Vec<String>,
    pub module_count: Option<i64>,
    pub sections_per_module: Option<i64>,
    pub include_quiz: Option<bool>,
}

/// Validated structural parameters for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureOptions {
    pub module_count: u8,
    pub sections_per_module: u8,
    pub include_quiz: bool,
}

impl Default for StructureOptions {
    fn default() -> Self {
        Self {
            module_count: DEFAULT_MODULES,
            sections_per_module: DEFAULT_SECTIONS,
            include_quiz: true,
        }
    }
}

impl PersonalizationOptions {
    /// Resolves structural parameters, reporting every out-of-range field.
    pub fn structure(&self) -> Result<StructureOptions, Vec<FieldError>> {
        let mut errors = Vec::new();

        let module_count = bounded(
            "personalizationOptions.moduleCount",
            self.module_count,
            MIN_MODULES,
            MAX_MODULES,
            DEFAULT_MODULES,
            &mut errors,
        );
        let sections_per_module = bounded(
            "personalizationOptions.sectionsPerModule",
            self.sections_per_module,
            MIN_SECTIONS,
            MAX_SECTIONS,
            DEFAULT_SECTIONS,
            &mut errors,
        );

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(StructureOptions {
            module_count,
            sections_per_module,
            include_quiz: self.include_quiz.unwrap_or(true),
        })
    }
}

fn bounded(
    field: &str,
    value: Option<i64>,
    min: i64,
    max: i64,
    default: u8,
    errors: &mut Vec<FieldError>,
) -> u8 {
    match value {
        None => default,
        Some(v) if (min..=max).contains(&v) => v as u8,
        Some(v) => {
            errors.push(FieldError::new(
                field,
                format!("must be between {min} and {max}, got {v}"),
            ));
            default
        }
    }
}

/// `employeeProfile` on `/enhance`: replaces stored profile fields for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmployeeProfileOverride {
    pub role: Option<String>,
    pub department: Option<String>,
    pub skills: Option<Vec<String>>,
    pub prior_experience: Option<String>,
    pub tools: Option<Vec<String>>,
    pub soft_skills: Option<Vec<String>>,
}

/// Merged snapshot of everything known about the learner for this run.
/// Input to prompt composition only; never persisted on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonalizationContext {
    pub role: String,
    pub department: String,
    pub skills: Vec<String>,
    pub prior_experience: Option<String>,
    pub tools: Vec<String>,
    pub soft_skills: Vec<String>,
    pub learning_style: String,
    pub difficulty: String,
    pub pace: String,
    pub interests: Vec<String>,
}

impl PersonalizationContext {
    pub fn build(
        learner: &LearnerProfile,
        profile_override: Option<&EmployeeProfileOverride>,
        options: &PersonalizationOptions,
    ) -> Self {
        let over = profile_override.cloned().unwrap_or_default();

        Self {
            role: non_blank(over.role)
                .or_else(|| non_blank(learner.role.clone()))
                .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            department: non_blank(over.department)
                .or_else(|| non_blank(learner.department.clone()))
                .unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string()),
            skills: over.skills.unwrap_or_else(|| learner.skills.clone()),
            prior_experience: non_blank(over.prior_experience)
                .or_else(|| non_blank(learner.cv_prior_experience.clone())),
            tools: over.tools.unwrap_or_else(|| learner.cv_tools.clone()),
            soft_skills: over
                .soft_skills
                .unwrap_or_else(|| learner.cv_soft_skills.clone()),
            learning_style: non_blank(options.learning_style.clone())
                .unwrap_or_else(|| "balanced".to_string()),
            difficulty: non_blank(options.difficulty.clone())
                .unwrap_or_else(|| "intermediate".to_string()),
            pace: non_blank(options.pace.clone()).unwrap_or_else(|| "moderate".to_string()),
            interests: options.interests.clone(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn learner() -> LearnerProfile {
        LearnerProfile {
            id: Uuid::new_v4(),
            name: Some("Alex Johnson".into()),
            role: Some("Data Scientist".into()),
            department: Some("Analytics".into()),
            skills: vec!["Python".into(), "SQL".into()],
            cv_prior_experience: Some("2 years in ML".into()),
            cv_tools: vec!["Jupyter".into()],
            cv_soft_skills: vec!["Communication".into()],
        }
    }

    #[test]
    fn test_structure_defaults() {
        let structure = PersonalizationOptions::default().structure().unwrap();
        assert_eq!(structure, StructureOptions::default());
    }

    #[test]
    fn test_structure_rejects_out_of_range_counts() {
        let options = PersonalizationOptions {
            module_count: Some(0),
            sections_per_module: Some(11),
            ..Default::default()
        };
        let errors = options.structure().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "personalizationOptions.moduleCount");
        assert_eq!(errors[1].field, "personalizationOptions.sectionsPerModule");
    }

    #[test]
    fn test_context_prefers_override_fields() {
        let over = EmployeeProfileOverride {
            role: Some("ML Engineer".into()),
            tools: Some(vec!["PyTorch".into()]),
            ..Default::default()
        };
        let ctx = PersonalizationContext::build(
            &learner(),
            Some(&over),
            &PersonalizationOptions::default(),
        );
        assert_eq!(ctx.role, "ML Engineer");
        assert_eq!(ctx.department, "Analytics");
        assert_eq!(ctx.tools, vec!["PyTorch".to_string()]);
        assert_eq!(ctx.skills, vec!["Python".to_string(), "SQL".to_string()]);
        assert_eq!(ctx.prior_experience.as_deref(), Some("2 years in ML"));
    }

    #[test]
    fn test_context_defaults_blank_role_and_department() {
        let profile = LearnerProfile {
            role: Some("   ".into()),
            department: None,
            ..learner()
        };
        let ctx =
            PersonalizationContext::build(&profile, None, &PersonalizationOptions::default());
        assert_eq!(ctx.role, DEFAULT_ROLE);
        assert_eq!(ctx.department, DEFAULT_DEPARTMENT);
        assert_eq!(ctx.learning_style, "balanced");
        assert_eq!(ctx.pace, "moderate");
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let options: PersonalizationOptions = serde_json::from_value(serde_json::json!({
            "learningStyle": "hands-on",
            "moduleCount": 3,
            "includeQuiz": false,
            "interests": ["MLOps"]
        }))
        .unwrap();
        assert_eq!(options.learning_style.as_deref(), Some("hands-on"));
        let structure = options.structure().unwrap();
        assert_eq!(structure.module_count, 3);
        assert!(!structure.include_quiz);
    }
}
