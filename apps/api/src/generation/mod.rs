// Content generation: personalization inputs, prompt composition, shape
// validation of model output, deterministic fallback and the pipeline that
// ties them to persistence.
// All LLM calls go through llm_client; no direct HTTP calls here.

pub mod composer;
pub mod fallback;
pub mod generator;
pub mod handlers;
pub mod personalization;
pub mod prompts;
pub mod validation;

pub use generator::ContentPipeline;
