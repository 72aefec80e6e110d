use std::sync::Arc;

use crate::config::GenerationPolicy;
use crate::persistence::PersistenceAdapter;
use crate::queue::QueueCoordinator;
use crate::tasks::TaskOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PersistenceAdapter>,
    pub queue: QueueCoordinator,
    pub tasks: TaskOrchestrator,
    /// Retry, concurrency and task-polling knobs.
    pub policy: GenerationPolicy,
    /// Bearer token required on the queue mutation endpoints.
    pub queue_api_token: String,
}

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use super::AppState;
    use crate::config::GenerationPolicy;
    use crate::llm_client::transport::testing::ScriptedTransport;
    use crate::persistence::memory::MemoryPersistence;
    use crate::queue::coordinator::testing::coordinator;
    use crate::queue::store::memory::MemoryRequestStore;
    use crate::tasks::memory::MemoryTaskStore;
    use crate::tasks::TaskOrchestrator;

    pub const TEST_TOKEN: &str = "test-queue-token";

    pub struct TestApp {
        pub state: AppState,
        pub content: Arc<MemoryPersistence>,
        pub requests: Arc<MemoryRequestStore>,
    }

    /// Wires the real coordinator and orchestrator over in-memory stores.
    pub fn test_app(transport: ScriptedTransport) -> TestApp {
        let content = Arc::new(MemoryPersistence::new());
        let requests = Arc::new(MemoryRequestStore::new());
        let policy = GenerationPolicy::default();
        let queue = coordinator(
            Arc::new(transport),
            content.clone(),
            requests.clone(),
            policy.queue_concurrency,
        );
        let tasks = TaskOrchestrator::new(Arc::new(MemoryTaskStore::new()), queue.clone());

        TestApp {
            state: AppState {
                store: content.clone(),
                queue,
                tasks,
                policy,
                queue_api_token: TEST_TOKEN.to_string(),
            },
            content,
            requests,
        }
    }
}
