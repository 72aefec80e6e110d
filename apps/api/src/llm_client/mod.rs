/// LLM Client: the single point of entry for all completion-service calls.
///
/// ARCHITECTURAL RULE: No other module may talk to the completion service directly.
/// All LLM interactions MUST go through this module.
///
/// Retry policy: transport failures and the configured transient statuses
/// (429, 500, 503 by default) are retried with linear backoff; anything else
/// aborts on the first attempt.
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::GenerationPolicy;

pub mod extract;
pub mod prompts;
pub mod transport;

pub use transport::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionTransport,
    HttpTransport, RawResponse,
};

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Unrecoverable response: {0}")]
    Parse(String),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}

impl LlmError {
    /// True for failures of the text-recovery step rather than of the call itself.
    pub fn is_parse(&self) -> bool {
        matches!(self, LlmError::Parse(_) | LlmError::EmptyContent)
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorEnvelope {
    error: UpstreamErrorBody,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    message: String,
}

/// How many times to retry, how long to wait, and which statuses count as transient.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub retriable_statuses: Vec<u16>,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `attempt * backoff_base`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }

    pub fn is_retriable(&self, status: u16) -> bool {
        self.retriable_statuses.contains(&status)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&GenerationPolicy::default())
    }
}

impl From<&GenerationPolicy> for RetryPolicy {
    fn from(policy: &GenerationPolicy) -> Self {
        Self {
            max_retries: policy.max_retries,
            backoff_base: policy.backoff_base,
            retriable_statuses: policy.retriable_statuses.clone(),
        }
    }
}

/// A system + user prompt pair with sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Settings for long-form content generation.
    pub fn creative(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// The single LLM client used by all services.
/// Wraps a [`CompletionTransport`] with retry logic and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    transport: Arc<dyn CompletionTransport>,
    model: String,
    policy: RetryPolicy,
}

impl LlmClient {
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        model: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            model: model.into(),
            policy,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Issues the request and returns the model's text payload.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let total_attempts = self.policy.max_retries + 1;
        let mut last_error: Option<LlmError> = None;

        for attempt in 1..=total_attempts {
            match self.transport.send(&body).await {
                Ok(raw) if raw.is_success() => return parse_envelope(&raw),
                Ok(raw) if self.policy.is_retriable(raw.status) => {
                    warn!(
                        "LLM call attempt {}/{} returned {}",
                        attempt, total_attempts, raw.status
                    );
                    last_error = Some(upstream_error(&raw));
                }
                Ok(raw) => {
                    warn!("LLM call returned non-retriable status {}", raw.status);
                    return Err(upstream_error(&raw));
                }
                Err(e) => {
                    warn!(
                        "LLM call attempt {}/{} failed: {}",
                        attempt, total_attempts, e
                    );
                    last_error = Some(e);
                }
            }

            if attempt < total_attempts {
                let delay = self.policy.delay_after(attempt);
                debug!("Retrying LLM call after {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or(LlmError::Upstream {
            status: 0,
            message: format!("no response after {total_attempts} attempts"),
        }))
    }

    /// Calls the LLM and recovers a JSON value from the text payload.
    pub async fn generate(&self, request: &CompletionRequest) -> Result<Value, LlmError> {
        let text = self.complete(request).await?;

        let extracted = extract::extract_json(&text).ok_or_else(|| {
            LlmError::Parse(format!(
                "no JSON found in {} chars of completion text",
                text.len()
            ))
        })?;

        info!("Recovered structured output via {:?}", extracted.method);
        Ok(extracted.value)
    }
}

fn parse_envelope(raw: &RawResponse) -> Result<String, LlmError> {
    let envelope: ChatCompletionResponse = serde_json::from_str(&raw.body).map_err(|e| {
        LlmError::Upstream {
            status: raw.status,
            message: format!("malformed completion envelope: {e}"),
        }
    })?;

    if let Some(usage) = &envelope.usage {
        debug!(
            "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
            usage.prompt_tokens, usage.completion_tokens
        );
    }

    envelope
        .text()
        .map(str::to_string)
        .ok_or(LlmError::EmptyContent)
}

fn upstream_error(raw: &RawResponse) -> LlmError {
    let message = serde_json::from_str::<UpstreamErrorEnvelope>(&raw.body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| raw.body.clone());
    LlmError::Upstream {
        status: raw.status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::transport::testing::{completion, status, ScriptedTransport};
    use super::*;

    fn client(transport: Arc<ScriptedTransport>) -> LlmClient {
        LlmClient::new(transport, "test-model", RetryPolicy::default())
    }

    fn request() -> CompletionRequest {
        CompletionRequest::creative("system", "user")
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_429_with_linear_backoff() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![status(429), status(429)],
            completion(r#"{"ok": true}"#),
        ));
        let llm = client(transport.clone());

        let value = llm.generate(&request()).await.unwrap();

        assert_eq!(value, serde_json::json!({"ok": true}));
        assert_eq!(transport.call_count(), 3);
        let at = transport.call_instants();
        assert_eq!(at[1] - at[0], Duration::from_millis(1000));
        assert_eq!(at[2] - at[1], Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_retries_on_persistent_503() {
        let transport = Arc::new(ScriptedTransport::always(status(503)));
        let llm = client(transport.clone());

        let err = llm.complete(&request()).await.unwrap_err();

        assert!(matches!(err, LlmError::Upstream { status: 503, .. }));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_are_retried() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![Err(LlmError::Transport("connection reset".into()))],
            completion("plain text"),
        ));
        let llm = client(transport.clone());

        let text = llm.complete(&request()).await.unwrap();

        assert_eq!(text, "plain text");
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retriable_status_aborts_immediately() {
        let transport = Arc::new(ScriptedTransport::always(status(401)));
        let llm = client(transport.clone());

        let err = llm.complete(&request()).await.unwrap_err();

        match err {
            LlmError::Upstream { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "status 401");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_text_is_parse_error() {
        let transport = Arc::new(ScriptedTransport::always(completion(
            "I could not produce a course today.",
        )));
        let err = client(transport).generate(&request()).await.unwrap_err();
        assert!(err.is_parse());
    }

    #[tokio::test]
    async fn test_empty_choice_is_empty_content() {
        let transport = Arc::new(ScriptedTransport::always(completion("   ")));
        let err = client(transport).complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }

    #[tokio::test]
    async fn test_request_carries_model_prompts_and_sampling() {
        let transport = Arc::new(ScriptedTransport::always(completion("{}")));
        let llm = client(transport.clone());

        llm.complete(&CompletionRequest::creative("sys", "usr"))
            .await
            .unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.model, "test-model");
        assert_eq!(sent.messages[0].role, "system");
        assert_eq!(sent.messages[0].content, "sys");
        assert_eq!(sent.messages[1].role, "user");
        assert_eq!(sent.messages[1].content, "usr");
        assert!((sent.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(sent.max_tokens, 4096);
    }

    #[test]
    fn test_delay_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert!(policy.is_retriable(429));
        assert!(!policy.is_retriable(502));
    }
}
