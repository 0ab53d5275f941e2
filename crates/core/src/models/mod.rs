pub mod agent;
pub mod context;
pub mod execution;
pub mod message;
pub mod resource;
pub mod schedule;
pub mod workflow;

pub use agent::{
    AgentInstance, CallOverride, ExecutionOutcome, HttpMethod, InstanceStatus, OutcomeCode,
    OutcomeError, OutcomeMetadata,
};
pub use context::{AuditEntry, ContextMetrics, GlobalContext, AUDIT_TRAIL_LIMIT};
pub use execution::{ExecutionRecord, RecordStatus};
pub use message::{Message, MessagePriority, DEFAULT_MESSAGE_TTL_SECONDS};
pub use resource::{ResourceAllocation, ResourcePool};
pub use schedule::{ScheduleSpec, ScheduleTarget, ScheduledTask, TaskExecStatus, TaskExecution};
pub use workflow::{
    ExecutionContext, ExecutionStatus, RetryPolicy, StepError, StepResult, WorkflowDefinition,
    WorkflowExecutionResult, WorkflowStep,
};
