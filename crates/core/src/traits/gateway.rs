use async_trait::async_trait;
use mockall::automock;

use crate::models::{CallOverride, ExecutionOutcome, HttpMethod};

/// 远程智能体调用入口。
///
/// 实现方负责按名称解析智能体配置、超时控制和有界重试；
/// 调用失败同样以 `ExecutionOutcome` 返回，从不抛错。
#[automock]
#[async_trait]
pub trait AgentGateway: Send + Sync {
    async fn execute(
        &self,
        agent: &str,
        method: HttpMethod,
        path: &str,
        body: Option<serde_json::Value>,
        override_config: Option<CallOverride>,
    ) -> ExecutionOutcome;
}
