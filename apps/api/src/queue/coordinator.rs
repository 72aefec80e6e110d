//! Queue Coordinator: owns the lifecycle of `generation_requests` rows.
//!
//! Rows are claimed oldest-first with a compare-and-set, then run through the
//! content pipeline on spawned tasks. Every generation, queued or direct,
//! holds a permit from one shared semaphore, so `queue_concurrency` bounds
//! upstream calls across the whole process. A spawned run outlives the
//! caller that started it; a dropped HTTP request never strands a claim.

use std::sync::Arc;
use std::time::Duration;

use futures::{stream::FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::GenerationPolicy;
use crate::errors::AppError;
use crate::generation::generator::{ContentPipeline, GenerationJob, GenerationOutcome};
use crate::generation::personalization::PersonalizationOptions;
use crate::models::request::{GenerationRequest, QueueStatus};
use crate::queue::store::RequestStore;

/// Upper bound accepted for `limit` on `/queue/process`.
pub const MAX_BATCH_LIMIT: usize = 100;

/// A row abandoned this many times is failed instead of requeued.
pub const MAX_CLAIM_ATTEMPTS: i32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct QueueCoordinator {
    store: Arc<dyn RequestStore>,
    pipeline: ContentPipeline,
    concurrency: usize,
    permits: Arc<Semaphore>,
    stale_after: Duration,
}

impl QueueCoordinator {
    pub fn new(
        store: Arc<dyn RequestStore>,
        pipeline: ContentPipeline,
        policy: &GenerationPolicy,
    ) -> Self {
        let concurrency = policy.queue_concurrency.max(1);
        Self {
            store,
            pipeline,
            concurrency,
            permits: Arc::new(Semaphore::new(concurrency)),
            stale_after: policy.stale_claim_after,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Records a pending request. Options are validated now so a bad request
    /// never reaches a worker.
    pub async fn enqueue(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
        options: &PersonalizationOptions,
    ) -> Result<Uuid, AppError> {
        options.structure().map_err(AppError::invalid_fields)?;
        let options = serde_json::to_value(options)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize options: {e}")))?;

        let id = self
            .store
            .insert_pending(learner_id, course_id, options)
            .await?;
        info!("Enqueued generation request {id} for learner {learner_id} course {course_id}");
        Ok(id)
    }

    /// Claims up to `limit` pending rows and runs each to a terminal status.
    /// Stale claims are released first so an earlier crash cannot wedge a pair.
    pub async fn process_pending(&self, limit: usize) -> Result<BatchSummary, AppError> {
        self.reclaim_stale().await;

        let claimed = self.store.claim_pending(limit).await?;
        if claimed.is_empty() {
            return Ok(BatchSummary::default());
        }
        info!("Claimed {} pending generation requests", claimed.len());

        let mut runs: FuturesUnordered<JoinHandle<bool>> = claimed
            .into_iter()
            .map(|request| {
                let this = self.clone();
                tokio::spawn(async move {
                    let _permit = this.permits.clone().acquire_owned().await;
                    this.run_claimed(request).await
                })
            })
            .collect();

        let mut summary = BatchSummary::default();
        while let Some(joined) = runs.next().await {
            summary.processed += 1;
            match joined {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    error!("Generation task panicked: {e}");
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Queue batch finished: processed={}, succeeded={}, failed={}",
            summary.processed, summary.succeeded, summary.failed
        );
        Ok(summary)
    }

    async fn reclaim_stale(&self) {
        match self
            .store
            .reclaim_stale(self.stale_after, MAX_CLAIM_ATTEMPTS)
            .await
        {
            Ok(sweep) if sweep.requeued + sweep.failed > 0 => warn!(
                "Released stale claims: requeued={}, failed={}",
                sweep.requeued, sweep.failed
            ),
            Ok(_) => {}
            Err(e) => error!("Stale claim sweep failed: {e}"),
        }
    }

    /// Degraded (fallback) content still counts as success.
    async fn run_claimed(&self, request: GenerationRequest) -> bool {
        let options: PersonalizationOptions = match serde_json::from_value(request.options.clone())
        {
            Ok(options) => options,
            Err(e) => {
                self.mark_failed(request.id, &format!("unreadable options: {e}"))
                    .await;
                return false;
            }
        };

        let job = GenerationJob {
            request_id: Some(request.id),
            ..GenerationJob::new(request.learner_id, request.course_id, options)
        };

        match self.pipeline.run(&job).await {
            Ok(outcome) => {
                if let Err(e) = self
                    .store
                    .complete(request.id, outcome.content_id, outcome.degraded)
                    .await
                {
                    error!("Could not mark request {} completed: {e}", request.id);
                    return false;
                }
                true
            }
            Err(e) => {
                warn!("Generation request {} failed: {e}", request.id);
                self.mark_failed(request.id, &e.to_string()).await;
                false
            }
        }
    }

    async fn mark_failed(&self, id: Uuid, message: &str) {
        if let Err(e) = self.store.fail(id, message).await {
            error!("Could not mark request {id} failed: {e}");
        }
    }

    pub async fn queue_status(&self) -> Result<QueueStatus, AppError> {
        Ok(self.store.counts().await?)
    }

    pub async fn get_request(&self, id: Uuid) -> Result<GenerationRequest, AppError> {
        Ok(self.store.get(id).await?)
    }

    /// Runs a generation under a fresh `generating` row, so direct callers
    /// obey the same single-flight rule as queued ones. The run happens on a
    /// spawned task; dropping the returned future only stops the wait.
    pub async fn run_direct(
        &self,
        job: GenerationJob,
    ) -> Result<(Uuid, GenerationOutcome), AppError> {
        job.options.structure().map_err(AppError::invalid_fields)?;
        let options = serde_json::to_value(&job.options)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize options: {e}")))?;

        let request_id = self
            .store
            .begin_direct(job.learner_id, job.course_id, options)
            .await?;
        let job = GenerationJob {
            request_id: Some(request_id),
            ..job
        };

        let this = self.clone();
        let run = tokio::spawn(async move {
            let _permit = this.permits.clone().acquire_owned().await;
            this.run_started(request_id, job).await
        });

        let outcome = run.await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Generation task for request {request_id} did not finish: {e}"
            ))
        })??;
        Ok((request_id, outcome))
    }

    async fn run_started(
        &self,
        request_id: Uuid,
        job: GenerationJob,
    ) -> Result<GenerationOutcome, AppError> {
        match self.pipeline.run(&job).await {
            Ok(outcome) => {
                self.store
                    .complete(request_id, outcome.content_id, outcome.degraded)
                    .await?;
                Ok(outcome)
            }
            Err(e) => {
                self.mark_failed(request_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Polls the queue on `interval` until the process exits.
    pub fn spawn_worker(&self, interval: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            info!(
                "Queue worker started (interval {}s, batch {})",
                interval.as_secs(),
                this.concurrency
            );
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = this.process_pending(this.concurrency).await {
                    error!("Queue worker batch failed: {e}");
                }
            }
        })
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use super::QueueCoordinator;
    use crate::config::GenerationPolicy;
    use crate::generation::generator::testing::pipeline;
    use crate::llm_client::transport::testing::ScriptedTransport;
    use crate::persistence::memory::MemoryPersistence;
    use crate::queue::store::memory::MemoryRequestStore;

    pub fn coordinator(
        transport: Arc<ScriptedTransport>,
        content: Arc<MemoryPersistence>,
        requests: Arc<MemoryRequestStore>,
        concurrency: usize,
    ) -> QueueCoordinator {
        let policy = GenerationPolicy {
            queue_concurrency: concurrency,
            ..GenerationPolicy::default()
        };
        QueueCoordinator::new(requests, pipeline(transport, content), &policy)
    }
}
