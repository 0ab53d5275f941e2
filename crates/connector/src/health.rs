use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use orchestrator_core::config::LoadBalancerSection;
use orchestrator_core::models::{AgentInstance, CallOverride, HttpMethod, InstanceStatus};
use orchestrator_core::traits::AgentGateway;
use orchestrator_core::OrchestratorResult;

use crate::registry::InstanceRegistry;

/// Expected shape of an agent's `/health` response.
#[derive(Debug, Deserialize)]
struct HealthReport {
    status: String,
    #[serde(default)]
    load: Option<u8>,
}

/// Periodically probes every registered instance through the agent
/// connector and records the result in the registry. A failed probe marks
/// the instance unhealthy; instances in maintenance are left alone.
pub struct HealthChecker {
    gateway: Arc<dyn AgentGateway>,
    registry: Arc<InstanceRegistry>,
    config: LoadBalancerSection,
}

impl HealthChecker {
    pub fn new(
        gateway: Arc<dyn AgentGateway>,
        registry: Arc<InstanceRegistry>,
        config: LoadBalancerSection,
    ) -> Self {
        Self {
            gateway,
            registry,
            config,
        }
    }

    pub async fn check_instance(&self, instance: &AgentInstance) -> OrchestratorResult<bool> {
        let outcome = self
            .gateway
            .execute(
                &instance.agent,
                HttpMethod::Get,
                "/health",
                None,
                Some(CallOverride {
                    timeout_ms: Some(self.config.health_check_timeout_ms),
                    max_retries: Some(0),
                    base_url: Some(instance.base_url()),
                }),
            )
            .await;

        let report = outcome
            .data
            .as_ref()
            .and_then(|data| serde_json::from_value::<HealthReport>(data.clone()).ok());
        let healthy =
            outcome.success && report.as_ref().map(|r| r.status == "healthy").unwrap_or(false);
        let load = report.and_then(|r| r.load);

        let status = if healthy {
            InstanceStatus::Healthy
        } else {
            InstanceStatus::Unhealthy
        };
        self.registry
            .mark_status(&instance.agent, &instance.id, status, load)
            .await?;

        if !healthy {
            warn!(
                "Health probe failed for instance {} of agent {}: {}",
                instance.id,
                instance.agent,
                outcome
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "unexpected health payload".to_string())
            );
        }
        Ok(healthy)
    }

    /// Probe all instances of one agent; returns the healthy count.
    pub async fn check_agent(&self, agent: &str) -> OrchestratorResult<usize> {
        let instances = self.registry.list(agent).await?;
        let mut healthy_count = 0;
        for instance in instances {
            if instance.status == InstanceStatus::Maintenance {
                debug!(
                    "Instance {} of agent {} is in maintenance, skipping probe",
                    instance.id, agent
                );
                continue;
            }
            if self.check_instance(&instance).await? {
                healthy_count += 1;
            }
        }
        Ok(healthy_count)
    }

    pub async fn check_all(&self) -> OrchestratorResult<()> {
        for agent in self.registry.agent_names().await? {
            let healthy = self.check_agent(&agent).await?;
            debug!("Agent {} has {} healthy instances", agent, healthy);
        }
        Ok(())
    }

    /// Background driver; runs until the returned handle is aborted.
    pub fn spawn_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs(self.config.health_check_interval_seconds.max(1));
        info!(
            "Starting health check loop, interval {}s",
            interval.as_secs()
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(error) = self.check_all().await {
                    warn!("Health check sweep failed: {}", error);
                }
            }
        })
    }
}
