use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ExecutionStatus, TaskExecStatus};

/// 推送给外部监听方的生命周期事件，封闭枚举
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    WorkflowStarted {
        execution_id: String,
        workflow_id: String,
        tenant_id: String,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        execution_id: String,
        step_id: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        execution_id: String,
        status: ExecutionStatus,
        timestamp: DateTime<Utc>,
    },
    CircuitBreakerOpened {
        breaker_id: String,
        failure_count: u32,
        timestamp: DateTime<Utc>,
    },
    TaskExecutionCompleted {
        task_id: String,
        execution_id: String,
        status: TaskExecStatus,
        timestamp: DateTime<Utc>,
    },
    MessageExpired {
        message_id: String,
        recipient: String,
        timestamp: DateTime<Utc>,
    },
    ResourceLeaseExpired {
        pool: String,
        resource_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::WorkflowStarted { .. } => "workflow_started",
            LifecycleEvent::StepCompleted { .. } => "step_completed",
            LifecycleEvent::WorkflowCompleted { .. } => "workflow_completed",
            LifecycleEvent::CircuitBreakerOpened { .. } => "circuit_breaker_opened",
            LifecycleEvent::TaskExecutionCompleted { .. } => "task_execution_completed",
            LifecycleEvent::MessageExpired { .. } => "message_expired",
            LifecycleEvent::ResourceLeaseExpired { .. } => "resource_lease_expired",
        }
    }
}

/// 通知通道：尽力而为，从不阻塞核心流程，失败只记录日志
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: LifecycleEvent);
}
