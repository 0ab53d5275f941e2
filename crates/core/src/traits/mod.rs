pub mod gateway;
pub mod notifier;
pub mod repository;
pub mod store;

pub use gateway::{AgentGateway, MockAgentGateway};
pub use notifier::{LifecycleEvent, Notifier};
pub use repository::{
    ExecutionFilter, ExecutionRepository, MockExecutionRepository, MockWorkflowRepository, Page,
    PageRequest, WorkflowRepository,
};
pub use store::SharedStore;
