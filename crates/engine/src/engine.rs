use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use orchestrator_core::models::{
    CallOverride, ExecutionContext, HttpMethod, OutcomeCode, OutcomeError, StepError, StepResult,
    WorkflowDefinition, WorkflowExecutionResult, WorkflowStep,
};
use orchestrator_core::traits::AgentGateway;
use orchestrator_core::{OrchestratorError, OrchestratorResult};

/// 步骤分发路径：每个智能体以 POST {base_url}/execute 接收工作
const AGENT_EXECUTE_PATH: &str = "/execute";

/// 步骤完成回调，编排器用它更新全局上下文并推送事件
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn on_step_completed(&self, step: &WorkflowStep, result: &StepResult);
}

/// 工作流引擎。
///
/// 步骤是纯数据，分发由引擎负责：按声明顺序逐个执行，
/// 依赖只做成功校验、不用于重排或并行化；parallel与priority
/// 字段随数据携带但不影响控制流。
pub struct WorkflowEngine {
    gateway: Arc<dyn AgentGateway>,
}

impl WorkflowEngine {
    pub fn new(gateway: Arc<dyn AgentGateway>) -> Self {
        Self { gateway }
    }

    /// 创建并校验工作流定义，非法定义直接拒绝
    pub fn create_workflow(
        &self,
        name: &str,
        description: Option<String>,
        steps: Vec<WorkflowStep>,
    ) -> OrchestratorResult<WorkflowDefinition> {
        let definition = WorkflowDefinition::new(name, description, steps);
        let problems = Self::validation_problems(&definition);
        if !problems.is_empty() {
            return Err(OrchestratorError::Validation(format!(
                "工作流 {} 定义非法: {}",
                definition.name,
                problems.join("; ")
            )));
        }
        Ok(definition)
    }

    /// 定义合法当且仅当步骤id唯一且依赖都指向已有步骤
    pub fn validate_workflow(definition: &WorkflowDefinition) -> bool {
        Self::validation_problems(definition).is_empty()
    }

    fn validation_problems(definition: &WorkflowDefinition) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();
        for step in &definition.steps {
            if !seen.insert(step.id.as_str()) {
                problems.push(format!("步骤id重复: {}", step.id));
            }
        }
        let known: HashSet<&str> = definition.steps.iter().map(|s| s.id.as_str()).collect();
        for step in &definition.steps {
            for dependency in &step.depends_on {
                if !known.contains(dependency.as_str()) {
                    problems.push(format!(
                        "步骤 {} 依赖不存在的步骤 {}",
                        step.id, dependency
                    ));
                }
            }
        }
        problems
    }

    pub async fn execute_workflow(
        &self,
        definition: &WorkflowDefinition,
        context: &mut ExecutionContext,
    ) -> OrchestratorResult<WorkflowExecutionResult> {
        self.execute_workflow_observed(definition, context, None)
            .await
    }

    /// 按声明顺序执行所有步骤并汇总结果。
    /// 依赖未全部成功的步骤记为失败后继续执行后续步骤，
    /// 而不是中止整个工作流。
    pub async fn execute_workflow_observed(
        &self,
        definition: &WorkflowDefinition,
        context: &mut ExecutionContext,
        observer: Option<&dyn StepObserver>,
    ) -> OrchestratorResult<WorkflowExecutionResult> {
        let problems = Self::validation_problems(definition);
        if !problems.is_empty() {
            return Err(OrchestratorError::Validation(format!(
                "工作流 {} 验证失败: {}",
                definition.name,
                problems.join("; ")
            )));
        }

        let started_at = Utc::now();
        debug!(
            "开始执行工作流 {} ({} 个步骤)，会话 {}",
            definition.name,
            definition.steps.len(),
            context.session_id
        );

        for step in &definition.steps {
            let result = self.execute_step(step, context).await;
            if let Some(observer) = observer {
                observer.on_step_completed(step, &result).await;
            }
            context.record_step_result(&step.id, result);
        }

        let result =
            WorkflowExecutionResult::from_step_results(context.step_results.clone(), started_at);
        debug!(
            "工作流 {} 执行结束，状态 {:?}",
            definition.name, result.status
        );
        Ok(result)
    }

    async fn execute_step(&self, step: &WorkflowStep, context: &ExecutionContext) -> StepResult {
        let started_at = Utc::now();

        let unmet: Vec<&str> = step
            .depends_on
            .iter()
            .filter(|dependency| !context.step_succeeded(dependency))
            .map(String::as_str)
            .collect();
        if !unmet.is_empty() {
            warn!(
                "步骤 {} 的依赖未满足: {}，跳过分发",
                step.id,
                unmet.join(", ")
            );
            return StepResult::failure(
                StepError {
                    message: format!("unmet dependencies: {}", unmet.join(", ")),
                    code: OutcomeCode::UnmetDependencies.as_str().to_string(),
                    details: Some(serde_json::json!({ "unmet": unmet })),
                },
                started_at,
                0,
            );
        }

        let input = Self::merge_step_input(step, context);
        let outcome = self
            .gateway
            .execute(
                &step.agent,
                HttpMethod::Post,
                AGENT_EXECUTE_PATH,
                Some(serde_json::Value::Object(input)),
                Some(CallOverride {
                    timeout_ms: step.timeout_ms,
                    max_retries: step
                        .retry_policy
                        .as_ref()
                        .map(|policy| policy.max_attempts.saturating_sub(1)),
                    base_url: None,
                }),
            )
            .await;

        let attempts = outcome.metadata.retries + 1;
        if outcome.success {
            StepResult::success(outcome.data, started_at, attempts)
        } else {
            let error = outcome.error.unwrap_or(OutcomeError {
                message: "agent call failed without error detail".to_string(),
                code: OutcomeCode::Internal,
                status: None,
            });
            StepResult::failure(
                StepError {
                    message: error.message,
                    code: error.code.as_str().to_string(),
                    details: error.status.map(|status| serde_json::json!({ "status": status })),
                },
                started_at,
                attempts,
            )
        }
    }

    /// 步骤输入 = 共享数据 ⊕ 步骤自身输入 ⊕ 此前步骤结果 ⊕ 会话id
    fn merge_step_input(
        step: &WorkflowStep,
        context: &ExecutionContext,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut input = serde_json::Map::new();
        for (key, value) in &context.shared_data {
            input.insert(key.clone(), value.clone());
        }
        for (key, value) in &step.input {
            input.insert(key.clone(), value.clone());
        }
        input.insert(
            "step_results".to_string(),
            serde_json::to_value(&context.step_results).unwrap_or(serde_json::Value::Null),
        );
        input.insert(
            "session_id".to_string(),
            serde_json::Value::String(context.session_id.clone()),
        );
        input
    }
}
