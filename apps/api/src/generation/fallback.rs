//! Fallback Synthesizer: deterministic course content when the model cannot deliver.
//!
//! Only the course title/description and the learner's role/department feed the
//! text, so identical inputs always produce identical titles, sections and quiz
//! answers. Ids and the timestamp come from the caller's stamp and fresh UUIDs.

use uuid::Uuid;

use crate::generation::composer::CourseBrief;
use crate::generation::personalization::{PersonalizationContext, StructureOptions};
use crate::models::content::{
    version_tag, ContentOrigin, ContentStamp, ContentType, GeneratedCourseContent, Module,
    Question, Quiz, Section,
};

const SECTION_TEMPLATES: [(&str, ContentType); 4] = [
    ("Key Concepts", ContentType::Text),
    ("Practical Examples", ContentType::Interactive),
    ("Hands-on Exercise", ContentType::Exercise),
    ("Advanced Techniques", ContentType::Text),
];

const DEPARTMENT_DISTRACTORS: [&str; 5] = [
    "Finance",
    "Engineering",
    "Operations",
    "Marketing",
    "Human Resources",
];

const ROLE_DISTRACTORS: [&str; 5] = [
    "Team Lead",
    "Analyst",
    "Consultant",
    "Coordinator",
    "Project Manager",
];

const FOCUS_DISTRACTORS: [&str; 3] = [
    "Memorizing terminology without applying it",
    "Topics unrelated to the course",
    "Skipping practice entirely",
];

/// Builds a structurally complete artifact from templates.
pub fn synthesize_fallback(
    course: &CourseBrief,
    context: &PersonalizationContext,
    structure: &StructureOptions,
    stamp: &ContentStamp,
    reason: &str,
) -> GeneratedCourseContent {
    let module_count = structure.module_count.max(1) as usize;
    let sections_per_module = structure.sections_per_module.max(1) as usize;

    let modules = (0..module_count)
        .map(|i| {
            let title = module_title(&course.title, &context.department, i, module_count);
            Module {
                id: Uuid::new_v4(),
                description: format!(
                    "{title} tailored for a {} in {}.",
                    context.role, context.department
                ),
                order_index: i as i32 + 1,
                sections: (0..sections_per_module)
                    .map(|j| fallback_section(course, context, &title, j))
                    .collect(),
                quiz: structure
                    .include_quiz
                    .then(|| fallback_quiz(context, &title, i)),
                title,
            }
        })
        .collect();

    GeneratedCourseContent {
        id: Uuid::new_v4(),
        course_id: stamp.course_id,
        learner_id: stamp.learner_id,
        title: format!("{} for {}", course.title, pluralize(&context.role)),
        description: format!(
            "{} This version is adapted for {} in {}.",
            course.description,
            pluralize(&context.role),
            context.department
        ),
        learning_objectives: vec![
            format!("Understand the core ideas of {}", course.title),
            format!(
                "Apply {} in day-to-day work as a {}",
                course.title, context.role
            ),
            format!(
                "Identify opportunities to use {} within {}",
                course.title, context.department
            ),
        ],
        modules,
        version_tag: version_tag(ContentOrigin::Fallback, stamp.generated_at),
        is_active: true,
        origin: ContentOrigin::Fallback,
        fallback_reason: Some(reason.to_string()),
        generated_at: stamp.generated_at,
    }
}

fn module_title(course_title: &str, department: &str, index: usize, count: usize) -> String {
    match index {
        0 => format!("Introduction to {course_title}"),
        i if i == count - 1 => format!("Applying {course_title} in {department}"),
        1 => format!("Core Concepts of {course_title}"),
        i => format!("Working with {course_title}: Part {}", i - 1),
    }
}

fn fallback_section(
    course: &CourseBrief,
    context: &PersonalizationContext,
    module_title: &str,
    index: usize,
) -> Section {
    let (title, content_type) = match SECTION_TEMPLATES.get(index) {
        Some((title, kind)) => (title.to_string(), *kind),
        None => (
            format!("Further Practice {}", index + 1 - SECTION_TEMPLATES.len()),
            ContentType::Exercise,
        ),
    };

    let content = match content_type {
        ContentType::Interactive => format!(
            "## {title}\n\nWork through scenarios a {} in {} meets when dealing with {}. \
             For each one, note what you would do and why.",
            context.role, context.department, course.title
        ),
        ContentType::Exercise => format!(
            "## {title}\n\nPick a current task from your work in {} and apply the ideas \
             from \"{module_title}\" to it. Write down the outcome and one thing you would change.",
            context.department
        ),
        _ => format!(
            "## {title}\n\n{}\n\nThis part of \"{module_title}\" focuses on what matters \
             most to a {} working in {}.",
            course.description, context.role, context.department
        ),
    };

    Section {
        id: Uuid::new_v4(),
        title,
        content,
        order_index: index as i32 + 1,
        content_type,
    }
}

fn fallback_quiz(context: &PersonalizationContext, module_title: &str, module_index: usize) -> Quiz {
    let slot = module_index % 4;

    let department_question = Question {
        question_text: format!(
            "Which department is this version of \"{module_title}\" tailored for?"
        ),
        options: place_answer(&context.department, &DEPARTMENT_DISTRACTORS, slot),
        correct_answer: context.department.clone(),
        explanation: format!("The course was personalized for the {} department.", context.department),
    };

    let role_question = Question {
        question_text: "Which role are the examples in this module written for?".to_string(),
        options: place_answer(&context.role, &ROLE_DISTRACTORS, (slot + 1) % 4),
        correct_answer: context.role.clone(),
        explanation: format!("Examples target the day-to-day work of a {}.", context.role),
    };

    let focus = format!("Applying {module_title} to real work");
    let focus_question = Question {
        question_text: format!("What is the main focus of \"{module_title}\"?"),
        options: place_answer(&focus, &FOCUS_DISTRACTORS, (slot + 2) % 4),
        correct_answer: focus.clone(),
        explanation: "Each module centres on putting its ideas into practice.".to_string(),
    };

    Quiz {
        title: format!("Quiz: {module_title}"),
        questions: vec![department_question, role_question, focus_question],
    }
}

/// Four options: three distractors that differ from `answer`, with `answer` at `slot`.
fn place_answer(answer: &str, distractors: &[&str], slot: usize) -> Vec<String> {
    let mut options: Vec<String> = distractors
        .iter()
        .filter(|d| !d.eq_ignore_ascii_case(answer))
        .take(3)
        .map(|d| d.to_string())
        .collect();
    let slot = slot.min(options.len());
    options.insert(slot, answer.to_string());
    options
}

fn pluralize(noun: &str) -> String {
    let lower = noun.to_lowercase();
    if lower.ends_with('s') {
        return noun.to_string();
    }
    let mut chars = lower.chars().rev();
    if let (Some('y'), Some(prev)) = (chars.next(), chars.next()) {
        if !"aeiou".contains(prev) {
            return format!("{}ies", &noun[..noun.len() - 1]);
        }
    }
    format!("{noun}s")
}
