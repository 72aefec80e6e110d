use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::info;
use uuid::Uuid;

use crate::tasks::{TaskError, TaskRecord, TaskStore};

const KEY_PREFIX: &str = "coursegen:task:";

fn task_key(task_id: Uuid) -> String {
    format!("{KEY_PREFIX}{task_id}")
}

/// Task records as JSON strings with a per-write expiry.
#[derive(Clone)]
pub struct RedisTaskStore {
    conn: MultiplexedConnection,
    ttl: Duration,
}

impl RedisTaskStore {
    pub async fn connect(client: &redis::Client, ttl: Duration) -> Result<Self, TaskError> {
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis task store connected (ttl {}s)", ttl.as_secs());
        Ok(Self { conn, ttl })
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn save(&self, record: &TaskRecord) -> Result<(), TaskError> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(task_key(record.task_id))
            .arg(json)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn load(&self, task_id: Uuid) -> Result<Option<TaskRecord>, TaskError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(task_key(task_id))
            .query_async(&mut conn)
            .await?;
        raw.map(|json| serde_json::from_str(&json).map_err(TaskError::from))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_key_is_namespaced() {
        let id = Uuid::new_v4();
        assert_eq!(task_key(id), format!("coursegen:task:{id}"));
    }
}
