use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 定时任务的调度规格
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// 标准CRON表达式（秒级，6或7字段）
    Cron { expr: String },
    /// 固定间隔模式，独立于CRON语义
    Interval { seconds: u64 },
}

/// 定时触发的目标
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleTarget {
    Workflow { workflow_id: String, tenant_id: String },
    Agent { agent: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub schedule: ScheduleSpec,
    pub enabled: bool,
    pub target: ScheduleTarget,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub last_run: Option<DateTime<Utc>>,
    /// 每次触发后重新计算
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn new(name: impl Into<String>, schedule: ScheduleSpec, target: ScheduleTarget) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            schedule,
            enabled: true,
            target,
            payload: serde_json::Value::Null,
            last_run: None,
            next_run: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run.map(|t| t <= now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskExecStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// 定时任务的一次触发记录，进入终态后不再变更
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: String,
    pub task_id: String,
    pub status: TaskExecStatus,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TaskExecution {
    pub fn new(task_id: impl Into<String>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            status: TaskExecStatus::Pending,
            scheduled_at,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskExecStatus::Completed | TaskExecStatus::Failed | TaskExecStatus::Cancelled
        )
    }

    pub fn mark_running(&mut self) {
        self.status = TaskExecStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn mark_completed(&mut self, result: Option<serde_json::Value>) {
        self.status = TaskExecStatus::Completed;
        self.result = result;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskExecStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = TaskExecStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some((completed - started).num_milliseconds()),
            _ => None,
        }
    }
}
