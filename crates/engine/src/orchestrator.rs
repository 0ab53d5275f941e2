use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use orchestrator_core::models::{
    ExecutionContext, ExecutionRecord, HttpMethod, RetryPolicy, ScheduleTarget, StepResult,
    WorkflowDefinition, WorkflowExecutionResult, WorkflowStep,
};
use orchestrator_core::traits::{
    AgentGateway, ExecutionRepository, LifecycleEvent, Notifier, WorkflowRepository,
};
use orchestrator_core::{FaultToleranceGuard, OrchestratorError, OrchestratorResult};
use orchestrator_coordination::GlobalContextStore;
use orchestrator_scheduler::TargetRunner;

use crate::engine::{StepObserver, WorkflowEngine};

/// 顶层编排器：装配工作流引擎、持久化端口、全局上下文、
/// 容错防护与通知通道，负责一次执行的完整生命周期。
pub struct Orchestrator {
    engine: Arc<WorkflowEngine>,
    gateway: Arc<dyn AgentGateway>,
    workflows: Arc<dyn WorkflowRepository>,
    executions: Arc<dyn ExecutionRepository>,
    contexts: Arc<GlobalContextStore>,
    guard: Arc<FaultToleranceGuard>,
    notifier: Arc<dyn Notifier>,
    /// 整个工作流级别的重试策略。工作流执行不保证幂等，
    /// 默认只跑一次，熔断保护仍然生效。
    workflow_retry_policy: RetryPolicy,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn AgentGateway>,
        workflows: Arc<dyn WorkflowRepository>,
        executions: Arc<dyn ExecutionRepository>,
        contexts: Arc<GlobalContextStore>,
        guard: Arc<FaultToleranceGuard>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            engine: Arc::new(WorkflowEngine::new(gateway.clone())),
            gateway,
            workflows,
            executions,
            contexts,
            guard,
            notifier,
            workflow_retry_policy: RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
        }
    }

    pub fn with_workflow_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.workflow_retry_policy = policy;
        self
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// 执行一个已注册的工作流。
    ///
    /// 未知的工作流id是配置类错误，立即返回。步骤级失败不会
    /// 抛错，而是体现在返回结果的partial/failure状态里；编排
    /// 过程中的意外错误会把执行记录置为失败并在清理后重新抛出。
    pub async fn execute(
        &self,
        workflow_id: &str,
        tenant_id: &str,
        input: serde_json::Value,
        user_id: Option<String>,
    ) -> OrchestratorResult<WorkflowExecutionResult> {
        let definition = self
            .workflows
            .find_by_id(tenant_id, workflow_id)
            .await?
            .ok_or_else(|| OrchestratorError::workflow_not_found(workflow_id))?;

        let record = ExecutionRecord::start(workflow_id, tenant_id, input.clone());
        self.executions.create(&record).await?;

        // 会话id即执行记录id，上下文随执行创建、随执行销毁
        let session_id = record.id.clone();
        self.contexts
            .create(&session_id, tenant_id, user_id)
            .await?;

        self.notifier
            .notify(LifecycleEvent::WorkflowStarted {
                execution_id: record.id.clone(),
                workflow_id: workflow_id.to_string(),
                tenant_id: tenant_id.to_string(),
                timestamp: Utc::now(),
            })
            .await;
        info!(
            "工作流 {} 开始执行，执行记录 {}，租户 {}",
            workflow_id, record.id, tenant_id
        );

        let outcome = self
            .run_guarded(&definition, &session_id, &record.id, &input)
            .await;
        self.finalize(record, outcome).await
    }

    async fn run_guarded(
        &self,
        definition: &WorkflowDefinition,
        session_id: &str,
        execution_id: &str,
        input: &serde_json::Value,
    ) -> OrchestratorResult<WorkflowExecutionResult> {
        let breaker_id = format!("workflow_{}", definition.id);
        let observer = ContextStepObserver {
            contexts: self.contexts.clone(),
            notifier: self.notifier.clone(),
            session_id: session_id.to_string(),
            execution_id: execution_id.to_string(),
        };

        self.guard
            .execute_with_retry(&breaker_id, &self.workflow_retry_policy, || {
                let mut context = Self::seed_context(session_id, input);
                let engine = self.engine.clone();
                let definition = definition.clone();
                let observer = observer.clone();
                async move {
                    engine
                        .execute_workflow_observed(&definition, &mut context, Some(&observer))
                        .await
                }
            })
            .await
    }

    /// 工作流输入作为初始共享数据；非对象输入挂在input键下
    fn seed_context(session_id: &str, input: &serde_json::Value) -> ExecutionContext {
        let mut context = ExecutionContext::new(session_id);
        match input {
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    context.shared_data.insert(key.clone(), value.clone());
                }
            }
            serde_json::Value::Null => {}
            other => {
                context
                    .shared_data
                    .insert("input".to_string(), other.clone());
            }
        }
        context
    }

    async fn finalize(
        &self,
        mut record: ExecutionRecord,
        outcome: OrchestratorResult<WorkflowExecutionResult>,
    ) -> OrchestratorResult<WorkflowExecutionResult> {
        let session_id = record.id.clone();
        match outcome {
            Ok(result) => {
                record.finish(result.clone());
                let update_result = self.executions.update(&record).await;
                self.notifier
                    .notify(LifecycleEvent::WorkflowCompleted {
                        execution_id: record.id.clone(),
                        status: result.status,
                        timestamp: Utc::now(),
                    })
                    .await;
                info!(
                    "工作流执行 {} 结束，状态 {:?}",
                    record.id, result.status
                );
                if let Err(cleanup_error) = self.contexts.delete(&session_id).await {
                    warn!("清理会话上下文 {} 失败: {}", session_id, cleanup_error);
                }
                // 记录写入失败也要先清理，再向调用方报错
                update_result?;
                Ok(result)
            }
            Err(error) => {
                error!("工作流执行 {} 异常中止: {}", record.id, error);
                record.fail(error.to_string());
                if let Err(update_error) = self.executions.update(&record).await {
                    error!(
                        "写入失败的执行记录 {} 出错: {}",
                        record.id, update_error
                    );
                }
                if let Err(cleanup_error) = self.contexts.delete(&session_id).await {
                    warn!("清理会话上下文 {} 失败: {}", session_id, cleanup_error);
                }
                // 清理完成后把原始错误抛还调用方
                Err(error)
            }
        }
    }
}

/// 把步骤结果同步进全局上下文并推送step_completed事件
#[derive(Clone)]
struct ContextStepObserver {
    contexts: Arc<GlobalContextStore>,
    notifier: Arc<dyn Notifier>,
    session_id: String,
    execution_id: String,
}

#[async_trait]
impl StepObserver for ContextStepObserver {
    async fn on_step_completed(&self, step: &WorkflowStep, result: &StepResult) {
        if let Err(error) = self.contexts.increment_step_count(&self.session_id).await {
            warn!("更新会话 {} 步骤计数失败: {}", self.session_id, error);
        }
        if result.attempts > 0 {
            if let Err(error) = self
                .contexts
                .record_agent_invocation(&self.session_id)
                .await
            {
                warn!("更新会话 {} 调用计数失败: {}", self.session_id, error);
            }
        }
        if let Err(error) = self
            .contexts
            .add_audit_entry(
                &self.session_id,
                if result.success {
                    "step_completed"
                } else {
                    "step_failed"
                },
                &step.agent,
                Some(serde_json::json!({
                    "step_id": step.id,
                    "duration_ms": result.duration_ms,
                    "attempts": result.attempts,
                })),
            )
            .await
        {
            warn!("写入会话 {} 审计条目失败: {}", self.session_id, error);
        }

        self.notifier
            .notify(LifecycleEvent::StepCompleted {
                execution_id: self.execution_id.clone(),
                step_id: step.id.clone(),
                success: result.success,
                timestamp: Utc::now(),
            })
            .await;
    }
}

/// 调度器触发的目标经由编排器执行：工作流走完整生命周期，
/// 智能体目标直接经连接器分发
#[async_trait]
impl TargetRunner for Orchestrator {
    async fn run(
        &self,
        target: &ScheduleTarget,
        payload: serde_json::Value,
    ) -> OrchestratorResult<serde_json::Value> {
        match target {
            ScheduleTarget::Workflow {
                workflow_id,
                tenant_id,
            } => {
                let result = self.execute(workflow_id, tenant_id, payload, None).await?;
                Ok(serde_json::to_value(result)?)
            }
            ScheduleTarget::Agent { agent } => {
                let outcome = self
                    .gateway
                    .execute(agent, HttpMethod::Post, "/execute", Some(payload), None)
                    .await;
                if outcome.success {
                    Ok(outcome.data.unwrap_or(serde_json::Value::Null))
                } else {
                    let message = outcome
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "agent call failed".to_string());
                    Err(OrchestratorError::AgentExecution(message))
                }
            }
        }
    }
}

