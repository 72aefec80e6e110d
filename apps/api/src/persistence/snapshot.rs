use aws_sdk_s3::primitives::ByteStream;
use tracing::info;

use crate::models::content::GeneratedCourseContent;
use crate::persistence::PersistenceError;

/// `generated/{learnerId}/{courseId}/{versionTag}-{contentId}.md`
pub fn snapshot_key(content: &GeneratedCourseContent) -> String {
    format!(
        "generated/{}/{}/{}-{}.md",
        content.learner_id, content.course_id, content.version_tag, content.id
    )
}

/// Uploads the Markdown rendition of an artifact and returns its key.
pub async fn upload_snapshot(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    content: &GeneratedCourseContent,
) -> Result<String, PersistenceError> {
    let key = snapshot_key(content);
    let body = render_content_to_md(content);

    s3.put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(body.into_bytes()))
        .content_type("text/markdown")
        .send()
        .await
        .map_err(|e| PersistenceError::Storage(format!("S3 upload failed: {e}")))?;

    info!("Uploaded content snapshot to s3://{}/{}", bucket, key);
    Ok(key)
}

/// Renders an artifact as a readable Markdown document.
pub fn render_content_to_md(content: &GeneratedCourseContent) -> String {
    let mut md = format!("# {}\n\n", content.title);
    md.push_str(&format!("- **Version:** {}\n", content.version_tag));
    md.push_str(&format!("- **Origin:** {}\n", content.origin.as_str()));
    if let Some(reason) = &content.fallback_reason {
        md.push_str(&format!("- **Fallback reason:** {reason}\n"));
    }
    md.push_str(&format!(
        "- **Generated:** {}\n\n",
        content.generated_at.to_rfc3339()
    ));

    if !content.description.is_empty() {
        md.push_str(&format!("{}\n\n", content.description));
    }

    if !content.learning_objectives.is_empty() {
        md.push_str("## Learning Objectives\n\n");
        for objective in &content.learning_objectives {
            md.push_str(&format!("- {objective}\n"));
        }
        md.push('\n');
    }

    for module in &content.modules {
        md.push_str(&format!("## {}. {}\n\n", module.order_index, module.title));
        if !module.description.is_empty() {
            md.push_str(&format!("{}\n\n", module.description));
        }
        for section in &module.sections {
            md.push_str(&format!(
                "### {}.{} {} ({})\n\n",
                module.order_index,
                section.order_index,
                section.title,
                section.content_type.as_str()
            ));
            md.push_str(section.content.trim_end());
            md.push_str("\n\n");
        }
        if let Some(quiz) = &module.quiz {
            md.push_str(&format!("### {}\n\n", quiz.title));
            for (i, question) in quiz.questions.iter().enumerate() {
                md.push_str(&format!("{}. {}\n", i + 1, question.question_text));
                for option in &question.options {
                    let mark = if *option == question.correct_answer { "x" } else { " " };
                    md.push_str(&format!("   - [{mark}] {option}\n"));
                }
                if !question.explanation.is_empty() {
                    md.push_str(&format!("   > {}\n", question.explanation));
                }
            }
            md.push('\n');
        }
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::composer::CourseBrief;
    use crate::generation::fallback::synthesize_fallback;
    use crate::generation::personalization::{
        PersonalizationContext, PersonalizationOptions, StructureOptions,
    };
    use crate::models::content::ContentStamp;
    use crate::models::course::LearnerProfile;
    use uuid::Uuid;

    fn fallback_content() -> GeneratedCourseContent {
        let brief = CourseBrief {
            title: "Data Privacy".into(),
            description: "GDPR basics.".into(),
            category: "Compliance".into(),
            skill_level: "Beginner".into(),
            duration: "1 hour".into(),
        };
        let learner = LearnerProfile {
            id: Uuid::new_v4(),
            role: Some("Analyst".into()),
            department: Some("Finance".into()),
            ..Default::default()
        };
        let context =
            PersonalizationContext::build(&learner, None, &PersonalizationOptions::default());
        synthesize_fallback(
            &brief,
            &context,
            &StructureOptions::default(),
            &ContentStamp::now(Uuid::new_v4(), learner.id),
            "upstream unavailable",
        )
    }

    #[test]
    fn test_snapshot_key_layout() {
        let content = fallback_content();
        let key = snapshot_key(&content);
        assert!(key.starts_with(&format!(
            "generated/{}/{}/fallback-",
            content.learner_id, content.course_id
        )));
        assert!(key.ends_with(&format!("-{}.md", content.id)));
    }

    #[test]
    fn test_markdown_marks_correct_answers() {
        let md = render_content_to_md(&fallback_content());
        assert!(md.starts_with("# Data Privacy for Analysts"));
        assert!(md.contains("- **Origin:** fallback"));
        assert!(md.contains("## Learning Objectives"));
        assert!(md.contains("   - [x] Finance"));
        assert!(md.contains("### 1.1 Key Concepts (text)"));
    }
}
