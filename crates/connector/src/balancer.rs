use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use orchestrator_core::config::LoadBalancerSection;
use orchestrator_core::models::AgentInstance;
use orchestrator_core::traits::SharedStore;
use orchestrator_core::OrchestratorResult;

use crate::registry::InstanceRegistry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    LeastConnections,
    WeightedRoundRobin,
    IpHash,
}

/// Selects one healthy instance per call for a named agent.
///
/// Healthy instances below the saturation threshold are preferred; when all
/// healthy instances are saturated any healthy one may be picked. Round-robin
/// cursors are persisted in the shared store so selection keeps rotating
/// across processes.
pub struct LoadBalancer {
    store: Arc<dyn SharedStore>,
    registry: Arc<InstanceRegistry>,
    config: LoadBalancerSection,
}

impl LoadBalancer {
    pub fn new(
        store: Arc<dyn SharedStore>,
        registry: Arc<InstanceRegistry>,
        config: LoadBalancerSection,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    pub async fn next_instance(
        &self,
        agent: &str,
        strategy: Strategy,
        client_key: Option<&str>,
    ) -> OrchestratorResult<Option<AgentInstance>> {
        let healthy = self.registry.healthy_instances(agent).await?;
        if healthy.is_empty() {
            debug!("No healthy instances for agent {}", agent);
            return Ok(None);
        }

        let unsaturated: Vec<AgentInstance> = healthy
            .iter()
            .filter(|i| !i.is_saturated(self.config.saturation_threshold))
            .cloned()
            .collect();
        let candidates = if unsaturated.is_empty() {
            healthy
        } else {
            unsaturated
        };

        let selected = match strategy {
            Strategy::RoundRobin => self.round_robin(agent, "rr", &candidates).await?,
            Strategy::LeastConnections => Self::least_connections(&candidates),
            Strategy::WeightedRoundRobin => {
                let expanded = Self::expand_by_weight(&candidates);
                self.round_robin(agent, "wrr", &expanded).await?
            }
            Strategy::IpHash => match client_key {
                Some(key) => Self::ip_hash(key, &candidates),
                // 没有客户端标识时退化为最小连接
                None => Self::least_connections(&candidates),
            },
        };

        if let Some(instance) = &selected {
            debug!(
                "Selected instance {} ({}) for agent {} via {:?}",
                instance.id,
                instance.base_url(),
                agent,
                strategy
            );
        }
        Ok(selected)
    }

    async fn round_robin(
        &self,
        agent: &str,
        cursor_kind: &str,
        candidates: &[AgentInstance],
    ) -> OrchestratorResult<Option<AgentInstance>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let cursor_key = format!("lb:{cursor_kind}:{agent}");
        let position = self.store.increment(&cursor_key, 1).await?;
        let index = ((position - 1).max(0) as usize) % candidates.len();
        Ok(Some(candidates[index].clone()))
    }

    fn least_connections(candidates: &[AgentInstance]) -> Option<AgentInstance> {
        candidates.iter().min_by_key(|i| i.load).cloned()
    }

    fn expand_by_weight(candidates: &[AgentInstance]) -> Vec<AgentInstance> {
        let mut expanded = Vec::new();
        for instance in candidates {
            let weight = instance.capacity.max(1);
            for _ in 0..weight {
                expanded.push(instance.clone());
            }
        }
        expanded
    }

    fn ip_hash(client_key: &str, candidates: &[AgentInstance]) -> Option<AgentInstance> {
        let mut hasher = DefaultHasher::new();
        client_key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % candidates.len();
        candidates.get(index).cloned()
    }
}
