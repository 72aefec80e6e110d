// Shared prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction appended to every personalized generation prompt.
pub const PERSONALIZATION_INSTRUCTION: &str = "\
    CRITICAL: Tailor every example, exercise and scenario to the learner profile provided. \
    Reference the learner's role, department and tools by name where natural. \
    Do NOT invent employer-specific facts that are not in the profile.";
