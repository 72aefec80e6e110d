// Queue Coordinator: durable generation requests with single-flight per
// (learner, course), claimed oldest-first and processed with bounded concurrency.

pub mod coordinator;
pub mod handlers;
pub mod store;

pub use coordinator::QueueCoordinator;
pub use store::PgRequestStore;
