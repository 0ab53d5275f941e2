use std::future::Future;

use tracing::{debug, warn};

use crate::models::RetryPolicy;
use crate::OrchestratorResult;

use super::circuit_breaker::FaultToleranceGuard;

impl FaultToleranceGuard {
    /// Run an operation under breaker protection with backoff retries.
    ///
    /// The breaker for `id` is consulted before every attempt; a rejected
    /// attempt fails fast with `CircuitOpen` without invoking the operation.
    /// Outcomes are reported back to the breaker. After the final attempt
    /// the original error is returned to the caller, never swallowed.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        id: &str,
        policy: &RetryPolicy,
        mut operation: F,
    ) -> OrchestratorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = OrchestratorResult<T>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if !self.can_execute(id).await? {
                debug!("熔断器 {} 拒绝本次调用，快速失败", id);
                return Err(Self::circuit_open_error(id));
            }

            match operation().await {
                Ok(value) => {
                    self.report_success(id).await?;
                    return Ok(value);
                }
                Err(error) => {
                    self.report_failure(id).await?;
                    if attempt >= max_attempts {
                        warn!("操作 {} 在 {} 次尝试后仍然失败: {}", id, attempt, error);
                        return Err(error);
                    }
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        "操作 {} 第 {} 次尝试失败: {}，{}ms 后重试",
                        id,
                        attempt,
                        error,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
