use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::tasks::{TaskError, TaskRecord, TaskStore};

#[derive(Default)]
pub struct MemoryTaskStore {
    records: Mutex<HashMap<Uuid, TaskRecord>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, record: &TaskRecord) -> Result<(), TaskError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.task_id, record.clone());
        Ok(())
    }

    async fn load(&self, task_id: Uuid) -> Result<Option<TaskRecord>, TaskError> {
        Ok(self.records.lock().unwrap().get(&task_id).cloned())
    }
}
