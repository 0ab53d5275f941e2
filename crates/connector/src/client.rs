use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use orchestrator_core::config::AgentConfig;
use orchestrator_core::models::{
    CallOverride, ExecutionOutcome, HttpMethod, OutcomeCode, OutcomeError, OutcomeMetadata,
};
use orchestrator_core::traits::AgentGateway;

use crate::balancer::{LoadBalancer, Strategy};

/// Base delay for the connector's own retry loop; doubles per retry,
/// capped at MAX_BACKOFF_MS.
const BASE_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 10_000;

/// Typed HTTP client to named remote agents.
///
/// Agent base configuration is resolved by name; unknown names fail
/// immediately with a configuration outcome and no network call. Call
/// failures are absorbed into the returned `ExecutionOutcome` — this
/// component never returns an error to its caller.
pub struct AgentConnector {
    agents: HashMap<String, AgentConfig>,
    balancer: Option<Arc<LoadBalancer>>,
    default_strategy: Strategy,
    http: reqwest::Client,
}

impl AgentConnector {
    pub fn new(agents: HashMap<String, AgentConfig>) -> Self {
        Self {
            agents,
            balancer: None,
            default_strategy: Strategy::RoundRobin,
            http: reqwest::Client::new(),
        }
    }

    /// Route calls through the load balancer when the agent has registered
    /// instances; falls back to the configured base url otherwise.
    pub fn with_balancer(mut self, balancer: Arc<LoadBalancer>, strategy: Strategy) -> Self {
        self.balancer = Some(balancer);
        self.default_strategy = strategy;
        self
    }

    pub fn known_agents(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    async fn resolve_base_url(&self, agent: &str, config: &AgentConfig) -> String {
        if let Some(balancer) = &self.balancer {
            match balancer
                .next_instance(agent, self.default_strategy, None)
                .await
            {
                Ok(Some(instance)) => return instance.base_url(),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        "Load balancer lookup for agent {} failed: {}, using configured url",
                        agent, error
                    );
                }
            }
        }
        config.base_url.clone()
    }

    fn backoff_delay(retries: u32) -> Duration {
        let shift = retries.saturating_sub(1).min(16);
        let delay_ms = BASE_BACKOFF_MS.saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
    }

    async fn attempt(
        &self,
        base_url: &str,
        method: HttpMethod,
        path: &str,
        body: &Option<serde_json::Value>,
        timeout: Duration,
        request_id: &str,
    ) -> Result<Option<serde_json::Value>, OutcomeError> {
        let url = format!("{base_url}{path}");
        let mut request = match method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url),
            HttpMethod::Put => self.http.put(&url),
            HttpMethod::Delete => self.http.delete(&url),
            HttpMethod::Patch => self.http.patch(&url),
        }
        .timeout(timeout)
        .header("x-request-id", request_id);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            let code = if e.is_timeout() {
                OutcomeCode::Timeout
            } else {
                OutcomeCode::Connection
            };
            OutcomeError {
                message: e.to_string(),
                code,
                status: None,
            }
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(OutcomeError {
                message: format!("HTTP {status}: {text}"),
                code: OutcomeCode::Http,
                status: Some(status.as_u16()),
            });
        }
        if text.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            // 非JSON响应按原文透传
            Err(_) => Ok(Some(serde_json::Value::String(text))),
        }
    }
}

#[async_trait]
impl AgentGateway for AgentConnector {
    async fn execute(
        &self,
        agent: &str,
        method: HttpMethod,
        path: &str,
        body: Option<serde_json::Value>,
        override_config: Option<CallOverride>,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let Some(config) = self.agents.get(agent) else {
            warn!("Call to unknown agent {} rejected without dispatch", agent);
            return ExecutionOutcome::config_failure(format!("unknown agent: {agent}"));
        };

        let override_config = override_config.unwrap_or_default();
        let timeout =
            Duration::from_millis(override_config.timeout_ms.unwrap_or(config.timeout_ms));
        let max_retries = override_config.max_retries.unwrap_or(config.max_retries);
        let base_url = match override_config.base_url {
            Some(url) => url,
            None => self.resolve_base_url(agent, config).await,
        };
        let request_id = Uuid::new_v4().to_string();

        let mut retries: u32 = 0;
        loop {
            let span = tracing::debug_span!(
                "agent_call",
                agent,
                method = method.as_str(),
                path,
                retries
            );
            let _guard = span.enter();

            match self
                .attempt(&base_url, method, path, &body, timeout, &request_id)
                .await
            {
                Ok(data) => {
                    let metadata = OutcomeMetadata {
                        duration_ms: started.elapsed().as_millis() as u64,
                        retries,
                    };
                    debug!(
                        "Agent {} call {}{} succeeded in {}ms after {} retries",
                        agent, base_url, path, metadata.duration_ms, retries
                    );
                    return ExecutionOutcome::ok(data, metadata);
                }
                Err(error) => {
                    if retries >= max_retries {
                        let metadata = OutcomeMetadata {
                            duration_ms: started.elapsed().as_millis() as u64,
                            retries,
                        };
                        warn!(
                            "Agent {} call {}{} failed after {} retries: {}",
                            agent, base_url, path, retries, error.message
                        );
                        return ExecutionOutcome::fail(error, metadata);
                    }
                    retries += 1;
                    let backoff = Self::backoff_delay(retries);
                    debug!(
                        "Agent {} call failed ({}), retry {}/{} in {}ms",
                        agent,
                        error.message,
                        retries,
                        max_retries,
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
