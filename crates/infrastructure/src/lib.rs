pub mod memory_store;
pub mod metrics;
pub mod notifier;
pub mod redis_store;
pub mod repositories;

pub use memory_store::MemoryStore;
pub use metrics::MetricsCollector;
pub use notifier::{BroadcastNotifier, TracingNotifier};
pub use redis_store::RedisStore;
pub use repositories::{InMemoryExecutionRepository, InMemoryWorkflowRepository};
