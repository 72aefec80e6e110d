// All LLM prompt constants for the Generation module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for personalized course generation.
/// Replace `{json_only}` before sending.
pub const COURSE_GENERATION_SYSTEM: &str = "You are an expert instructional designer who \
    builds personalized corporate training courses. You adapt depth, examples and exercises \
    to the individual learner while keeping the course faithful to its catalog description. \
    {json_only}";

/// Course generation prompt template.
/// Replace: {personalization_instruction}, {course_json}, {learner_json},
///          {module_count}, {sections_per_module}, {quiz_rule}
pub const COURSE_GENERATION_PROMPT_TEMPLATE: &str = r#"{personalization_instruction}

COURSE (catalog metadata):
{course_json}

LEARNER PROFILE (personalize for this person):
{learner_json}

Return a JSON object with this EXACT schema (no extra fields):
{
  "title": "Course title adapted to the learner",
  "description": "Two or three sentences describing the personalized course",
  "learningObjectives": ["Objective phrased as an observable outcome"],
  "modules": [
    {
      "title": "Module title",
      "description": "What the module covers and why it matters to this learner",
      "sections": [
        {
          "title": "Section title",
          "content": "Full lesson text in markdown",
          "contentType": "text"
        }
      ],
      "quiz": {
        "title": "Quiz title",
        "questions": [
          {
            "questionText": "Question?",
            "options": ["Option A", "Option B", "Option C", "Option D"],
            "correctAnswer": "Option A",
            "explanation": "Why this answer is correct"
          }
        ]
      }
    }
  ]
}

HARD RULES:
1. Produce EXACTLY {module_count} modules, in teaching order
2. Every module has EXACTLY {sections_per_module} sections; none may be empty
3. `contentType` is one of "text", "video", "interactive", "exercise"
4. {quiz_rule}
5. Match the learner's learning style, difficulty and pace
6. Return 3 to 6 learning objectives"#;

pub const QUIZ_REQUIRED_RULE: &str = "Every module MUST include a quiz with 3 to 5 questions. \
    Each question has at least 2 options and `correctAnswer` MUST exactly equal one of its options";

pub const QUIZ_OMITTED_RULE: &str = "Do NOT include quizzes; set \"quiz\" to null for every module";
