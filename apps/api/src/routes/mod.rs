pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::generation::handlers as generation;
use crate::queue::handlers as queue;
use crate::state::AppState;
use crate::tasks::handlers as tasks;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation
        .route("/generate", post(generation::handle_generate))
        .route("/enhance", post(generation::handle_enhance))
        .route("/batch-generate", post(generation::handle_batch_generate))
        // Queue
        .route("/queue/process", post(queue::handle_process))
        .route("/queue/status", get(queue::handle_status))
        .route("/queue/enqueue", post(queue::handle_enqueue))
        .route("/queue/requests/:id", get(queue::handle_get_request))
        // Tasks
        .route("/tasks/:id", get(tasks::handle_get_task))
        .route("/tasks/:id/status", get(tasks::handle_get_task_status))
        .with_state(state)
}
