pub mod config;
pub mod errors;
pub mod fault_tolerance;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::{OrchestratorError, OrchestratorResult};
pub use fault_tolerance::{BreakerConfig, BreakerState, BreakerStatus, FaultToleranceGuard};
pub use traits::{
    AgentGateway, ExecutionRepository, LifecycleEvent, MockAgentGateway, MockExecutionRepository,
    MockWorkflowRepository, Notifier, SharedStore, WorkflowRepository,
};
