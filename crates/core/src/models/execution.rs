use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::workflow::{ExecutionStatus, WorkflowExecutionResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Running,
    Success,
    Partial,
    Failure,
}

impl From<ExecutionStatus> for RecordStatus {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Success => RecordStatus::Success,
            ExecutionStatus::Partial => RecordStatus::Partial,
            ExecutionStatus::Failure => RecordStatus::Failure,
        }
    }
}

/// 一次工作流执行的持久化审计记录，按租户隔离
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow_id: String,
    pub tenant_id: String,
    pub status: RecordStatus,
    pub input: serde_json::Value,
    pub result: Option<WorkflowExecutionResult>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    pub fn start(
        workflow_id: impl Into<String>,
        tenant_id: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            tenant_id: tenant_id.into(),
            status: RecordStatus::Running,
            input,
            result: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self, result: WorkflowExecutionResult) {
        self.status = result.status.into();
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = RecordStatus::Failure;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}
