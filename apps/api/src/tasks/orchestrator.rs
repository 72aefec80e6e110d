use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::generation::generator::GenerationJob;
use crate::queue::QueueCoordinator;
use crate::tasks::{TaskError, TaskRecord, TaskStatus, TaskStore};

/// Work a task can carry.
#[derive(Debug, Clone)]
pub enum TaskSpec {
    GenerateContent(GenerationJob),
}

impl TaskSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskSpec::GenerateContent(_) => "generate_content",
        }
    }
}

#[derive(Clone)]
pub struct TaskOrchestrator {
    store: Arc<dyn TaskStore>,
    queue: QueueCoordinator,
}

impl TaskOrchestrator {
    pub fn new(store: Arc<dyn TaskStore>, queue: QueueCoordinator) -> Self {
        Self { store, queue }
    }

    /// Records the task as pending, starts it in the background and returns its id.
    /// Runs wait on the queue coordinator's permits like every other generation.
    pub async fn submit_task(&self, spec: TaskSpec) -> Result<Uuid, TaskError> {
        let record = TaskRecord::pending(spec.kind());
        let task_id = record.task_id;
        self.store.save(&record).await?;

        let this = self.clone();
        tokio::spawn(async move {
            this.execute(record, spec).await;
        });

        info!("Submitted task {task_id}");
        Ok(task_id)
    }

    async fn execute(&self, mut record: TaskRecord, spec: TaskSpec) {
        let task_id = record.task_id;
        record.status = TaskStatus::InProgress;
        record.updated_at = Utc::now();
        self.persist(&record).await;

        let outcome = match spec {
            TaskSpec::GenerateContent(job) => self
                .queue
                .run_direct(job)
                .await
                .map(|(request_id, outcome)| {
                    json!({
                        "requestId": request_id,
                        "contentId": outcome.content_id,
                        "degraded": outcome.degraded,
                    })
                })
                .map_err(|e| e.to_string()),
        };

        match outcome {
            Ok(result) => {
                record.status = TaskStatus::Completed;
                record.result = Some(result);
            }
            Err(message) => {
                warn!("Task {task_id} failed: {message}");
                record.status = TaskStatus::Failed;
                record.error = Some(message);
            }
        }
        record.updated_at = Utc::now();
        self.persist(&record).await;
    }

    async fn persist(&self, record: &TaskRecord) {
        if let Err(e) = self.store.save(record).await {
            error!(
                "Could not save task {} as {:?}: {e}",
                record.task_id, record.status
            );
        }
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<TaskRecord, TaskError> {
        self.store
            .load(task_id)
            .await?
            .ok_or(TaskError::NotFound(task_id))
    }

    pub async fn get_task_status(&self, task_id: Uuid) -> Result<TaskStatus, TaskError> {
        Ok(self.get_task(task_id).await?.status)
    }

    /// The task's result once completed; its error once failed.
    pub async fn get_task_result(&self, task_id: Uuid) -> Result<Value, TaskError> {
        let record = self.get_task(task_id).await?;
        match record.status {
            TaskStatus::Completed => Ok(record.result.unwrap_or(Value::Null)),
            TaskStatus::Failed => Err(TaskError::Failed {
                task_id,
                message: record.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
            status => Err(TaskError::NotFinished { task_id, status }),
        }
    }

    /// Checks the task up to `max_attempts` times, `interval` apart.
    /// Running out of attempts yields `Timeout`; the task keeps running.
    pub async fn poll_result(
        &self,
        task_id: Uuid,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<Value, TaskError> {
        let max_attempts = max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.get_task_result(task_id).await {
                Err(TaskError::NotFinished { .. }) => {
                    if attempt < max_attempts {
                        tokio::time::sleep(interval).await;
                    }
                }
                settled => return settled,
            }
        }

        warn!("Gave up polling task {task_id} after {max_attempts} attempts");
        Err(TaskError::Timeout {
            task_id,
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::generator::testing::model_course_json;
    use crate::generation::personalization::PersonalizationOptions;
    use crate::llm_client::transport::testing::{completion, status, ScriptedTransport};
    use crate::persistence::memory::MemoryPersistence;
    use crate::queue::coordinator::testing::coordinator;
    use crate::queue::store::memory::MemoryRequestStore;
    use crate::tasks::memory::MemoryTaskStore;

    fn orchestrator(transport: ScriptedTransport) -> (TaskOrchestrator, Arc<MemoryPersistence>) {
        shared_orchestrator(Arc::new(transport))
    }

    fn shared_orchestrator(
        transport: Arc<ScriptedTransport>,
    ) -> (TaskOrchestrator, Arc<MemoryPersistence>) {
        let content = Arc::new(MemoryPersistence::new());
        let queue = coordinator(
            transport,
            content.clone(),
            Arc::new(MemoryRequestStore::new()),
            5,
        );
        (
            TaskOrchestrator::new(Arc::new(MemoryTaskStore::new()), queue),
            content,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_then_poll_to_completion() {
        let (tasks, content) =
            orchestrator(ScriptedTransport::always(completion(&model_course_json(1))));
        let course = content.add_course("SQL Basics");
        let learner = content.add_learner("Analyst", "Finance");

        let task_id = tasks
            .submit_task(TaskSpec::GenerateContent(GenerationJob::new(
                learner,
                course,
                PersonalizationOptions::default(),
            )))
            .await
            .unwrap();

        let result = tasks
            .poll_result(task_id, Duration::from_secs(1), 60)
            .await
            .unwrap();

        assert_eq!(result["degraded"], false);
        assert_eq!(
            tasks.get_task_status(task_id).await.unwrap(),
            TaskStatus::Completed
        );
        let content_id: Uuid = serde_json::from_value(result["contentId"].clone()).unwrap();
        assert!(content
            .contents
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.id == content_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout_does_not_cancel_task() {
        // Three 503s with 1s + 2s backoff keep the task busy for ~3s.
        let (tasks, content) = orchestrator(ScriptedTransport::always(status(503)));
        let course = content.add_course("SQL Basics");
        let learner = content.add_learner("Analyst", "Finance");

        let task_id = tasks
            .submit_task(TaskSpec::GenerateContent(GenerationJob::new(
                learner,
                course,
                PersonalizationOptions::default(),
            )))
            .await
            .unwrap();

        let err = tasks
            .poll_result(task_id, Duration::from_millis(500), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Timeout { attempts: 2, .. }));

        let result = tasks
            .poll_result(task_id, Duration::from_secs(1), 60)
            .await
            .unwrap();
        assert_eq!(result["degraded"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_reports_error() {
        let (tasks, _content) =
            orchestrator(ScriptedTransport::always(completion(&model_course_json(1))));

        let task_id = tasks
            .submit_task(TaskSpec::GenerateContent(GenerationJob::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                PersonalizationOptions::default(),
            )))
            .await
            .unwrap();

        let err = tasks
            .poll_result(task_id, Duration::from_secs(1), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Failed { ref message, .. } if message.contains("not found")));
        assert_eq!(
            tasks.get_task_status(task_id).await.unwrap(),
            TaskStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let (tasks, _) = orchestrator(ScriptedTransport::always(status(503)));
        let id = Uuid::new_v4();
        assert!(matches!(
            tasks.get_task_status(id).await,
            Err(TaskError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_tasks_share_the_queue_concurrency_bound() {
        let transport = Arc::new(
            ScriptedTransport::always(completion(&model_course_json(1)))
                .with_latency(Duration::from_secs(2)),
        );
        let (tasks, content) = shared_orchestrator(transport.clone());
        let course = content.add_course("SQL Basics");

        let mut task_ids = Vec::new();
        for _ in 0..20 {
            let learner = content.add_learner("Analyst", "Finance");
            task_ids.push(
                tasks
                    .submit_task(TaskSpec::GenerateContent(GenerationJob::new(
                        learner,
                        course,
                        PersonalizationOptions::default(),
                    )))
                    .await
                    .unwrap(),
            );
        }
        for task_id in task_ids {
            tasks
                .poll_result(task_id, Duration::from_secs(1), 60)
                .await
                .unwrap();
        }

        assert_eq!(transport.call_count(), 20);
        assert_eq!(transport.peak_in_flight(), 5);
    }
}
