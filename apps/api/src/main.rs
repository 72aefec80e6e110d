mod auth;
mod config;
mod db;
mod errors;
mod generation;
mod llm_client;
mod models;
mod persistence;
mod queue;
mod routes;
mod state;
mod tasks;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::create_pool;
use crate::generation::ContentPipeline;
use crate::llm_client::{HttpTransport, LlmClient, RetryPolicy};
use crate::persistence::PgPersistence;
use crate::queue::{PgRequestStore, QueueCoordinator};
use crate::routes::build_router;
use crate::state::AppState;
use crate::tasks::{RedisTaskStore, TaskOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting coursegen v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    let task_store = RedisTaskStore::connect(&redis, config.generation.task_ttl).await?;
    info!("Redis client initialized");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client
    let transport = HttpTransport::new(
        &config.llm_api_url,
        config.llm_api_key.clone(),
        config.llm_timeout,
    )?;
    let llm = LlmClient::new(
        Arc::new(transport),
        config.llm_model.clone(),
        RetryPolicy::from(&config.generation),
    );
    info!(
        "LLM client initialized (model: {}, endpoint: {})",
        llm.model(),
        config.llm_api_url
    );

    // Wire services
    let store = Arc::new(PgPersistence::new(db.clone(), s3, config.s3_bucket.clone()));
    let pipeline = ContentPipeline::new(llm, store.clone());
    let queue = QueueCoordinator::new(
        Arc::new(PgRequestStore::new(db)),
        pipeline,
        &config.generation,
    );
    let tasks = TaskOrchestrator::new(Arc::new(task_store), queue.clone());

    if !config.generation.queue_poll_interval.is_zero() {
        queue.spawn_worker(config.generation.queue_poll_interval);
    } else {
        info!("Background queue worker disabled (QUEUE_POLL_INTERVAL_SECS=0)");
    }

    // Build app state
    let state = AppState {
        store,
        queue,
        tasks,
        policy: config.generation.clone(),
        queue_api_token: config.queue_api_token.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the admin UI host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "coursegen-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
