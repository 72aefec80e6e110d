//! Task Orchestrator: submit/poll wrapper around the generation chain for
//! callers that cannot block on a generation.
//!
//! Task records live in Redis with a TTL. Polling gives up after a bounded
//! number of attempts; giving up never cancels the task itself.

pub mod handlers;
pub mod orchestrator;
pub mod redis_store;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use orchestrator::{TaskOrchestrator, TaskSpec};
pub use redis_store::RedisTaskStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub kind: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn pending(kind: &str) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            kind: kind.to_string(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(Uuid),

    #[error("task {task_id} is still {status:?}")]
    NotFinished { task_id: Uuid, status: TaskStatus },

    #[error("task {task_id} failed: {message}")]
    Failed { task_id: Uuid, message: String },

    #[error("task {task_id} still running after {attempts} polls")]
    Timeout { task_id: Uuid, attempts: u32 },

    #[error("task store error: {0}")]
    Store(String),
}

impl From<redis::RedisError> for TaskError {
    fn from(err: redis::RedisError) -> Self {
        TaskError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        TaskError::Store(format!("corrupt task record: {err}"))
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, record: &TaskRecord) -> Result<(), TaskError>;

    async fn load(&self, task_id: Uuid) -> Result<Option<TaskRecord>, TaskError>;
}
