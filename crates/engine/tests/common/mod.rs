#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use orchestrator_core::models::{
    CallOverride, ExecutionOutcome, HttpMethod, OutcomeCode, OutcomeError, OutcomeMetadata,
};
use orchestrator_core::traits::AgentGateway;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub agent: String,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

/// 可编程的网关假件：默认全部成功，可按智能体脚本化结果，
/// 记录每次调用以便断言分发行为
#[derive(Default)]
pub struct FakeGateway {
    scripted: Mutex<HashMap<String, VecDeque<ExecutionOutcome>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn always_fail(&self, agent: &str, retries: u32) {
        let outcome = ExecutionOutcome::fail(
            OutcomeError {
                message: "connect timeout".to_string(),
                code: OutcomeCode::Timeout,
                status: None,
            },
            OutcomeMetadata {
                duration_ms: 5,
                retries,
            },
        );
        // 队列耗尽后也失败：放一条并在execute里循环复用最后一条
        self.scripted
            .lock()
            .unwrap()
            .insert(agent.to_string(), vec![outcome].into());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_agents(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.agent).collect()
    }
}

#[async_trait]
impl AgentGateway for FakeGateway {
    async fn execute(
        &self,
        agent: &str,
        _method: HttpMethod,
        path: &str,
        body: Option<serde_json::Value>,
        _override_config: Option<CallOverride>,
    ) -> ExecutionOutcome {
        self.calls.lock().unwrap().push(RecordedCall {
            agent: agent.to_string(),
            path: path.to_string(),
            body,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut scripted = self.scripted.lock().unwrap();
        match scripted.get_mut(agent) {
            Some(queue) => {
                if queue.len() > 1 {
                    queue.pop_front().unwrap()
                } else {
                    // 最后一条脚本结果保留并持续生效
                    queue.front().cloned().unwrap_or_else(default_ok)
                }
            }
            None => default_ok(),
        }
    }
}

fn default_ok() -> ExecutionOutcome {
    ExecutionOutcome::ok(
        Some(serde_json::json!({"ok": true})),
        OutcomeMetadata {
            duration_ms: 3,
            retries: 0,
        },
    )
}
