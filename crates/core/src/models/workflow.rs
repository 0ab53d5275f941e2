use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 工作流定义：一组有序的步骤
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<WorkflowStep>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 工作流中的单个步骤，纯数据，由引擎负责分发
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub agent: String,
    #[serde(default)]
    pub input: HashMap<String, serde_json::Value>,
    pub timeout_ms: Option<u64>,
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub priority: i32,
}

/// 重试退避参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// delay(n) = min(initial · multiplier^(n-1), max)，n 从 1 开始
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepError {
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// 单个步骤的终态结果，每次执行中每个步骤恰好一份
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<StepError>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub attempts: u32,
}

impl StepResult {
    pub fn success(data: Option<serde_json::Value>, started_at: DateTime<Utc>, attempts: u32) -> Self {
        let completed_at = Utc::now();
        Self {
            success: true,
            data,
            error: None,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
            attempts,
        }
    }

    pub fn failure(error: StepError, started_at: DateTime<Utc>, attempts: u32) -> Self {
        let completed_at = Utc::now();
        Self {
            success: false,
            data: None,
            error: Some(error),
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
            attempts,
        }
    }
}

/// 整次执行的最终状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// 所有步骤成功
    Success,
    /// 部分步骤成功
    Partial,
    /// 没有步骤成功
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionResult {
    pub status: ExecutionStatus,
    pub step_results: HashMap<String, StepResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl WorkflowExecutionResult {
    /// 按照 全部/部分/零 成功的规则汇总步骤结果
    pub fn from_step_results(
        step_results: HashMap<String, StepResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let total = step_results.len();
        let succeeded = step_results.values().filter(|r| r.success).count();
        let status = if total > 0 && succeeded == total {
            ExecutionStatus::Success
        } else if succeeded > 0 {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Failure
        };
        Self {
            status,
            step_results,
            started_at,
            completed_at: Utc::now(),
            error: None,
        }
    }
}

/// 执行期间的可变上下文，一次执行一份，不跨执行共享
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub session_id: String,
    #[serde(default)]
    pub shared_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub step_results: HashMap<String, StepResult>,
}

impl ExecutionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            shared_data: HashMap::new(),
            step_results: HashMap::new(),
        }
    }

    pub fn record_step_result(&mut self, step_id: &str, result: StepResult) {
        self.step_results.insert(step_id.to_string(), result);
    }

    pub fn step_succeeded(&self, step_id: &str) -> bool {
        self.step_results
            .get(step_id)
            .map(|r| r.success)
            .unwrap_or(false)
    }
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, description: Option<String>, steps: Vec<WorkflowStep>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description,
            steps,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent: agent.into(),
            input: HashMap::new(),
            timeout_ms: None,
            retry_policy: None,
            depends_on: Vec::new(),
            parallel: false,
            priority: 0,
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    pub fn with_dependency(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }
}
