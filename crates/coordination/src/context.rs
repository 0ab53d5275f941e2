use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use orchestrator_core::config::ContextSection;
use orchestrator_core::models::{AuditEntry, GlobalContext};
use orchestrator_core::traits::SharedStore;
use orchestrator_core::{OrchestratorError, OrchestratorResult};

fn context_key(session_id: &str) -> String {
    format!("context:{session_id}")
}

/// 按session id存取的执行级全局上下文。
///
/// 每次变更都会刷新last_update并重置存储层的过期窗口，
/// 不活跃的上下文到期自动清除。
pub struct GlobalContextStore {
    store: Arc<dyn SharedStore>,
    config: ContextSection,
}

impl GlobalContextStore {
    pub fn new(store: Arc<dyn SharedStore>, config: ContextSection) -> Self {
        Self { store, config }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_seconds)
    }

    async fn save(&self, context: &GlobalContext) -> OrchestratorResult<()> {
        self.store
            .set(
                &context_key(&context.session_id),
                &serde_json::to_string(context)?,
                Some(self.ttl()),
            )
            .await
    }

    async fn load(&self, session_id: &str) -> OrchestratorResult<GlobalContext> {
        match self.store.get(&context_key(session_id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(OrchestratorError::ContextNotFound {
                session_id: session_id.to_string(),
            }),
        }
    }

    /// 修改-保存的公共路径，每次变更刷新时间戳与过期窗口
    async fn mutate<F>(&self, session_id: &str, apply: F) -> OrchestratorResult<GlobalContext>
    where
        F: FnOnce(&mut GlobalContext),
    {
        let mut context = self.load(session_id).await?;
        apply(&mut context);
        context.touch();
        self.save(&context).await?;
        Ok(context)
    }

    pub async fn create(
        &self,
        session_id: &str,
        tenant_id: &str,
        user_id: Option<String>,
    ) -> OrchestratorResult<GlobalContext> {
        let context = GlobalContext::new(session_id, tenant_id, user_id);
        self.save(&context).await?;
        debug!("创建会话上下文 {}，租户 {}", session_id, tenant_id);
        Ok(context)
    }

    pub async fn get(&self, session_id: &str) -> OrchestratorResult<Option<GlobalContext>> {
        match self.store.get(&context_key(session_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn update_shared_data(
        &self,
        session_id: &str,
        patch: HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<GlobalContext> {
        self.mutate(session_id, |context| {
            context.shared_data.extend(patch);
        })
        .await
    }

    pub async fn update_agent_state(
        &self,
        session_id: &str,
        agent: &str,
        state: serde_json::Value,
    ) -> OrchestratorResult<GlobalContext> {
        let agent = agent.to_string();
        self.mutate(session_id, move |context| {
            context.agent_states.insert(agent, state);
        })
        .await
    }

    pub async fn increment_step_count(&self, session_id: &str) -> OrchestratorResult<u64> {
        let context = self
            .mutate(session_id, |context| {
                context.metrics.step_count += 1;
            })
            .await?;
        Ok(context.metrics.step_count)
    }

    pub async fn record_agent_invocation(&self, session_id: &str) -> OrchestratorResult<u64> {
        let context = self
            .mutate(session_id, |context| {
                context.metrics.agent_invocations += 1;
            })
            .await?;
        Ok(context.metrics.agent_invocations)
    }

    pub async fn add_audit_entry(
        &self,
        session_id: &str,
        action: &str,
        actor: &str,
        details: Option<serde_json::Value>,
    ) -> OrchestratorResult<()> {
        let entry = AuditEntry {
            action: action.to_string(),
            actor: actor.to_string(),
            details,
            timestamp: Utc::now(),
        };
        self.mutate(session_id, move |context| {
            context.push_audit_entry(entry);
        })
        .await?;
        Ok(())
    }

    pub async fn delete(&self, session_id: &str) -> OrchestratorResult<bool> {
        let removed = self.store.delete(&context_key(session_id)).await?;
        if removed {
            debug!("删除会话上下文 {}", session_id);
        }
        Ok(removed)
    }
}
