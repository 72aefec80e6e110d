use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_LLM_API_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_LLM_MODEL: &str = "llama-3.1-70b-versatile";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    /// Credential for the completion service. Never defaulted.
    pub llm_api_key: String,
    pub llm_api_url: String,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub generation: GenerationPolicy,
    /// Bearer token callers must present on the queue endpoints.
    pub queue_api_token: String,
    pub port: u16,
    pub rust_log: String,
}

/// Tunable numeric policy for the gateway, the queue and task polling.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub retriable_statuses: Vec<u16>,
    pub queue_concurrency: usize,
    /// Zero disables the background queue worker.
    pub queue_poll_interval: Duration,
    /// A `generating` row claimed longer ago than this is presumed abandoned.
    pub stale_claim_after: Duration,
    pub task_poll_interval: Duration,
    pub task_poll_max_attempts: u32,
    pub task_ttl: Duration,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(1000),
            retriable_statuses: vec![429, 500, 503],
            queue_concurrency: 5,
            queue_poll_interval: Duration::ZERO,
            stale_claim_after: Duration::from_secs(600),
            task_poll_interval: Duration::from_millis(1000),
            task_poll_max_attempts: 60,
            task_ttl: Duration::from_secs(86_400),
        }
    }
}

impl GenerationPolicy {
    /// Longest one generation can spend in the gateway: every attempt timing
    /// out plus every backoff, with a minute of headroom for persistence.
    pub fn claim_budget(&self, llm_timeout: Duration) -> Duration {
        let attempts = self.max_retries + 1;
        let backoff: u32 = (1..attempts).sum();
        llm_timeout * attempts + self.backoff_base * backoff + Duration::from_secs(60)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = GenerationPolicy::default();
        let llm_timeout = Duration::from_secs(optional_env("LLM_TIMEOUT_SECS", 120_u64)?);
        let mut generation = GenerationPolicy {
            max_retries: optional_env("LLM_MAX_RETRIES", defaults.max_retries)?,
            backoff_base: Duration::from_millis(optional_env(
                "LLM_BACKOFF_MS",
                defaults.backoff_base.as_millis() as u64,
            )?),
            retriable_statuses: match std::env::var("LLM_RETRIABLE_STATUSES") {
                Ok(raw) => parse_status_list(&raw)
                    .context("Environment variable 'LLM_RETRIABLE_STATUSES' is invalid")?,
                Err(_) => defaults.retriable_statuses,
            },
            queue_concurrency: optional_env("QUEUE_CONCURRENCY", defaults.queue_concurrency)?
                .max(1),
            queue_poll_interval: Duration::from_secs(optional_env(
                "QUEUE_POLL_INTERVAL_SECS",
                0_u64,
            )?),
            stale_claim_after: defaults.stale_claim_after,
            task_poll_interval: Duration::from_millis(optional_env(
                "TASK_POLL_INTERVAL_MS",
                defaults.task_poll_interval.as_millis() as u64,
            )?),
            task_poll_max_attempts: optional_env(
                "TASK_POLL_MAX_ATTEMPTS",
                defaults.task_poll_max_attempts,
            )?,
            task_ttl: Duration::from_secs(optional_env(
                "TASK_TTL_SECS",
                defaults.task_ttl.as_secs(),
            )?),
        };
        let claim_budget = generation.claim_budget(llm_timeout);
        generation.stale_claim_after = Duration::from_secs(optional_env(
            "QUEUE_STALE_CLAIM_SECS",
            claim_budget.as_secs(),
        )?);

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            llm_api_key: require_env("LLM_API_KEY")?,
            llm_api_url: std::env::var("LLM_API_URL")
                .unwrap_or_else(|_| DEFAULT_LLM_API_URL.to_string()),
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            llm_timeout,
            generation,
            queue_api_token: require_env("QUEUE_API_TOKEN")?,
            port: optional_env("PORT", 8080_u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    let value = std::env::var(key)
        .with_context(|| format!("Required environment variable '{key}' is not set"))?;
    if value.trim().is_empty() {
        anyhow::bail!("Required environment variable '{key}' is empty");
    }
    Ok(value)
}

/// Parses a comma-separated list of HTTP status codes, e.g. `429,500,503`.
fn parse_status_list(raw: &str) -> Result<Vec<u16>> {
    let statuses = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<u16>() {
            Ok(code) if (100..=599).contains(&code) => Ok(code),
            _ => Err(anyhow::anyhow!("'{part}' is not an HTTP status code")),
        })
        .collect::<Result<Vec<_>>>()?;
    if statuses.is_empty() {
        anyhow::bail!("expected at least one status code");
    }
    Ok(statuses)
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
