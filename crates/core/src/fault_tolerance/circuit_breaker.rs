use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::traits::{LifecycleEvent, Notifier, SharedStore};
use crate::{OrchestratorError, OrchestratorResult};

const BREAKER_KEY_PREFIX: &str = "breaker:";

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Cooldown before an open circuit admits a trial call
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker state as persisted in the shared store, one entry per id.
/// Absence of state behaves as always-closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerState {
    pub id: String,
    pub status: BreakerStatus,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub config: BreakerConfig,
}

impl BreakerState {
    pub fn closed(id: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            id: id.into(),
            status: BreakerStatus::Closed,
            failure_count: 0,
            last_failure_at: None,
            next_attempt_at: None,
            config,
        }
    }

    /// Record one failure; returns true when this failure opened the circuit.
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> bool {
        self.failure_count += 1;
        self.last_failure_at = Some(now);
        match self.status {
            BreakerStatus::Closed if self.failure_count >= self.config.failure_threshold => {
                self.status = BreakerStatus::Open;
                self.next_attempt_at = Some(now + chrono::Duration::from_std(self.config.open_timeout).unwrap_or_else(|_| chrono::Duration::seconds(60)));
                true
            }
            // A failed trial call sends the breaker straight back to open
            BreakerStatus::HalfOpen => {
                self.status = BreakerStatus::Open;
                self.next_attempt_at = Some(now + chrono::Duration::from_std(self.config.open_timeout).unwrap_or_else(|_| chrono::Duration::seconds(60)));
                true
            }
            _ => false,
        }
    }

    /// A success from any state resets the breaker to closed.
    pub fn record_success(&mut self) {
        self.status = BreakerStatus::Closed;
        self.failure_count = 0;
        self.next_attempt_at = None;
    }

    pub fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map(|t| now >= t).unwrap_or(true)
    }
}

/// Fault tolerance guard: circuit breakers keyed by an arbitrary string id
/// (an agent name, `workflow_<id>`, ...), state shared across processes
/// through the store.
///
/// Failure counters are read-modify-write; concurrent callers racing on the
/// same id can interleave updates. The open→half-open transition is the one
/// single-writer edge: it is claimed via compare-and-swap so exactly one
/// caller gets the trial slot.
pub struct FaultToleranceGuard {
    store: Arc<dyn SharedStore>,
    config: BreakerConfig,
    notifier: Option<Arc<dyn Notifier>>,
}

impl FaultToleranceGuard {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self::with_config(store, BreakerConfig::default())
    }

    pub fn with_config(store: Arc<dyn SharedStore>, config: BreakerConfig) -> Self {
        Self {
            store,
            config,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn key(id: &str) -> String {
        format!("{BREAKER_KEY_PREFIX}{id}")
    }

    pub async fn state(&self, id: &str) -> OrchestratorResult<Option<BreakerState>> {
        match self.store.get(&Self::key(id)).await? {
            Some(raw) => {
                let state: BreakerState = serde_json::from_str(&raw)?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Whether a call for this id is currently permitted.
    ///
    /// Open circuits whose cooldown has elapsed admit exactly one caller:
    /// the CAS winner moves the state to half-open and gets the trial call,
    /// everyone else keeps being rejected until the trial reports.
    pub async fn can_execute(&self, id: &str) -> OrchestratorResult<bool> {
        let key = Self::key(id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(true);
        };
        let state: BreakerState = serde_json::from_str(&raw)?;
        match state.status {
            BreakerStatus::Closed => Ok(true),
            BreakerStatus::HalfOpen => Ok(false),
            BreakerStatus::Open => {
                let now = Utc::now();
                if !state.cooldown_elapsed(now) {
                    return Ok(false);
                }
                let mut trial = state.clone();
                trial.status = BreakerStatus::HalfOpen;
                let claimed = self
                    .store
                    .compare_and_swap(&key, &raw, &serde_json::to_string(&trial)?, None)
                    .await?;
                if claimed {
                    debug!("熔断器 {} 进入半开状态，放行试探调用", id);
                }
                Ok(claimed)
            }
        }
    }

    pub async fn report_success(&self, id: &str) -> OrchestratorResult<()> {
        let mut state = self
            .state(id)
            .await?
            .unwrap_or_else(|| BreakerState::closed(id, self.config.clone()));
        state.record_success();
        self.store
            .set(&Self::key(id), &serde_json::to_string(&state)?, None)
            .await
    }

    pub async fn report_failure(&self, id: &str) -> OrchestratorResult<()> {
        let mut state = self
            .state(id)
            .await?
            .unwrap_or_else(|| BreakerState::closed(id, self.config.clone()));
        let opened = state.record_failure(Utc::now());
        self.store
            .set(&Self::key(id), &serde_json::to_string(&state)?, None)
            .await?;

        if opened {
            warn!(
                "熔断器 {} 打开，连续失败 {} 次，{} 前拒绝调用",
                id,
                state.failure_count,
                state
                    .next_attempt_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_default()
            );
            if let Some(notifier) = &self.notifier {
                notifier
                    .notify(LifecycleEvent::CircuitBreakerOpened {
                        breaker_id: id.to_string(),
                        failure_count: state.failure_count,
                        timestamp: Utc::now(),
                    })
                    .await;
            }
        }
        Ok(())
    }

    /// Reset the breaker for an id back to closed (operational override).
    pub async fn reset(&self, id: &str) -> OrchestratorResult<()> {
        let state = BreakerState::closed(id, self.config.clone());
        self.store
            .set(&Self::key(id), &serde_json::to_string(&state)?, None)
            .await
    }

    pub async fn delete(&self, id: &str) -> OrchestratorResult<bool> {
        self.store.delete(&Self::key(id)).await
    }

    pub(crate) fn circuit_open_error(id: &str) -> OrchestratorError {
        OrchestratorError::CircuitOpen { id: id.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, timeout_secs: u64) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            open_timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[test]
    fn test_failures_open_the_circuit_at_threshold() {
        let mut state = BreakerState::closed("agent_x", config(3, 60));
        let now = Utc::now();
        assert!(!state.record_failure(now));
        assert!(!state.record_failure(now));
        assert_eq!(state.status, BreakerStatus::Closed);

        assert!(state.record_failure(now));
        assert_eq!(state.status, BreakerStatus::Open);
        assert_eq!(state.failure_count, 3);
        assert!(state.next_attempt_at.is_some());
    }

    #[test]
    fn test_cooldown_gate() {
        let mut state = BreakerState::closed("agent_x", config(1, 60));
        let now = Utc::now();
        state.record_failure(now);
        assert!(!state.cooldown_elapsed(now));
        assert!(!state.cooldown_elapsed(now + chrono::Duration::seconds(59)));
        assert!(state.cooldown_elapsed(now + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut state = BreakerState::closed("agent_x", config(1, 60));
        let now = Utc::now();
        state.record_failure(now);
        state.status = BreakerStatus::HalfOpen;

        let reopened = state.record_failure(now + chrono::Duration::seconds(61));
        assert!(reopened);
        assert_eq!(state.status, BreakerStatus::Open);
        // 新的冷却窗口从试探失败时刻起算
        assert!(state.next_attempt_at.unwrap() > now + chrono::Duration::seconds(61));
    }

    #[test]
    fn test_success_resets_to_closed() {
        let mut state = BreakerState::closed("agent_x", config(1, 60));
        state.record_failure(Utc::now());
        state.status = BreakerStatus::HalfOpen;

        state.record_success();
        assert_eq!(state.status, BreakerStatus::Closed);
        assert_eq!(state.failure_count, 0);
        assert!(state.next_attempt_at.is_none());
    }
}
