pub mod engine;
pub mod orchestrator;

pub use engine::{StepObserver, WorkflowEngine};
pub use orchestrator::Orchestrator;
