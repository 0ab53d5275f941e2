use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use orchestrator_core::models::{AgentInstance, InstanceStatus};
use orchestrator_core::traits::SharedStore;
use orchestrator_core::OrchestratorResult;

const INSTANCE_KEY_PREFIX: &str = "agents:";

fn instance_key(agent: &str, instance_id: &str) -> String {
    format!("{INSTANCE_KEY_PREFIX}{agent}:instances:{instance_id}")
}

fn agent_prefix(agent: &str) -> String {
    format!("{INSTANCE_KEY_PREFIX}{agent}:instances:")
}

/// Registry of the live instances behind each named agent, shared across
/// processes through the store.
pub struct InstanceRegistry {
    store: Arc<dyn SharedStore>,
    /// Instances that miss this many consecutive heartbeats are still listed;
    /// entries are dropped only by explicit deregistration or key expiry.
    instance_ttl: Option<Duration>,
}

impl InstanceRegistry {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            instance_ttl: None,
        }
    }

    /// Expire instance entries that stop being refreshed (crashed replicas).
    pub fn with_instance_ttl(mut self, ttl: Duration) -> Self {
        self.instance_ttl = Some(ttl);
        self
    }

    pub async fn register(&self, instance: &AgentInstance) -> OrchestratorResult<()> {
        let key = instance_key(&instance.agent, &instance.id);
        self.store
            .set(&key, &serde_json::to_string(instance)?, self.instance_ttl)
            .await?;
        info!(
            "Registered instance {} for agent {} at {}",
            instance.id,
            instance.agent,
            instance.base_url()
        );
        Ok(())
    }

    pub async fn deregister(&self, agent: &str, instance_id: &str) -> OrchestratorResult<bool> {
        let removed = self.store.delete(&instance_key(agent, instance_id)).await?;
        if removed {
            info!("Deregistered instance {} for agent {}", instance_id, agent);
        }
        Ok(removed)
    }

    pub async fn update(&self, instance: &AgentInstance) -> OrchestratorResult<()> {
        let key = instance_key(&instance.agent, &instance.id);
        self.store
            .set(&key, &serde_json::to_string(instance)?, self.instance_ttl)
            .await
    }

    /// List an agent's instances in stable registration order.
    pub async fn list(&self, agent: &str) -> OrchestratorResult<Vec<AgentInstance>> {
        let keys = self.store.keys_with_prefix(&agent_prefix(agent)).await?;
        let mut instances = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.store.get(&key).await? {
                let instance: AgentInstance = serde_json::from_str(&raw)?;
                instances.push(instance);
            }
        }
        instances.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(instances)
    }

    pub async fn healthy_instances(&self, agent: &str) -> OrchestratorResult<Vec<AgentInstance>> {
        Ok(self
            .list(agent)
            .await?
            .into_iter()
            .filter(AgentInstance::is_healthy)
            .collect())
    }

    pub async fn mark_status(
        &self,
        agent: &str,
        instance_id: &str,
        status: InstanceStatus,
        load: Option<u8>,
    ) -> OrchestratorResult<bool> {
        let key = instance_key(agent, instance_id);
        let Some(raw) = self.store.get(&key).await? else {
            debug!("Instance {} for agent {} is gone, skipping status update", instance_id, agent);
            return Ok(false);
        };
        let mut instance: AgentInstance = serde_json::from_str(&raw)?;
        instance.status = status;
        if let Some(load) = load {
            instance.load = load.min(100);
        }
        instance.last_health_check = Some(Utc::now());
        self.update(&instance).await?;
        Ok(true)
    }

    /// Names of all agents that currently have at least one registered instance.
    pub async fn agent_names(&self) -> OrchestratorResult<Vec<String>> {
        let keys = self.store.keys_with_prefix(INSTANCE_KEY_PREFIX).await?;
        let mut names: Vec<String> = keys
            .iter()
            .filter_map(|key| {
                key.strip_prefix(INSTANCE_KEY_PREFIX)
                    .and_then(|rest| rest.split(":instances:").next())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
