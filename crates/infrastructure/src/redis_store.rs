use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::debug;

use orchestrator_core::traits::SharedStore;
use orchestrator_core::{OrchestratorError, OrchestratorResult};

use crate::metrics::MetricsCollector;

/// Compare-and-swap has to be atomic on the server side, so it runs as a
/// single Lua script.
const CAS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    if ARGV[3] ~= '' then
        redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
    else
        redis.call('SET', KEYS[1], ARGV[2])
    end
    return 1
else
    return 0
end
"#;

/// Redis-backed shared store. All process-wide state (breakers, queues,
/// pools, registries, contexts) lives here so horizontally scaled
/// orchestrator processes observe the same values.
pub struct RedisStore {
    connection: ConnectionManager,
    cas_script: Script,
    metrics: Arc<MetricsCollector>,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> OrchestratorResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| OrchestratorError::Store(format!("Failed to create Redis client: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| OrchestratorError::Store(format!("Failed to connect to Redis: {e}")))?;
        debug!("Connected to Redis shared store");
        Ok(Self {
            connection,
            cas_script: Script::new(CAS_SCRIPT),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    async fn run<T: redis::FromRedisValue>(
        &self,
        operation: &'static str,
        cmd: &redis::Cmd,
    ) -> OrchestratorResult<T> {
        let started = Instant::now();
        let mut connection = self.connection.clone();
        let result = cmd.query_async::<T>(&mut connection).await.map_err(|e| {
            self.metrics.record_store_error(operation);
            OrchestratorError::Store(format!("Redis {operation} failed: {e}"))
        });
        self.metrics.record_store_operation(operation, started);
        result
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> OrchestratorResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run("get", &cmd).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> OrchestratorResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        self.run::<()>("set", &cmd).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> OrchestratorResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        let reply: Option<String> = self.run("set_if_absent", &cmd).await?;
        Ok(reply.is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> OrchestratorResult<bool> {
        let started = Instant::now();
        let ttl_ms = ttl
            .map(|ttl| (ttl.as_millis() as u64).to_string())
            .unwrap_or_default();
        let mut connection = self.connection.clone();
        let swapped: i64 = self
            .cas_script
            .key(key)
            .arg(expected)
            .arg(new)
            .arg(ttl_ms)
            .invoke_async(&mut connection)
            .await
            .map_err(|e| {
                self.metrics.record_store_error("compare_and_swap");
                OrchestratorError::Store(format!("Redis compare_and_swap failed: {e}"))
            })?;
        self.metrics
            .record_store_operation("compare_and_swap", started);
        Ok(swapped == 1)
    }

    async fn delete(&self, key: &str) -> OrchestratorResult<bool> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed: i64 = self.run("delete", &cmd).await?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> OrchestratorResult<bool> {
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(ttl.as_millis() as u64);
        let set: i64 = self.run("expire", &cmd).await?;
        Ok(set == 1)
    }

    async fn increment(&self, key: &str, delta: i64) -> OrchestratorResult<i64> {
        let mut cmd = redis::cmd("INCRBY");
        cmd.arg(key).arg(delta);
        self.run("increment", &cmd).await
    }

    async fn list_push_back(&self, key: &str, value: &str) -> OrchestratorResult<u64> {
        let mut cmd = redis::cmd("RPUSH");
        cmd.arg(key).arg(value);
        self.run("list_push_back", &cmd).await
    }

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> OrchestratorResult<Vec<String>> {
        let mut cmd = redis::cmd("LRANGE");
        cmd.arg(key).arg(start as i64).arg(stop as i64);
        self.run("list_range", &cmd).await
    }

    async fn list_remove(&self, key: &str, value: &str) -> OrchestratorResult<u64> {
        let mut cmd = redis::cmd("LREM");
        cmd.arg(key).arg(1).arg(value);
        self.run("list_remove", &cmd).await
    }

    async fn list_len(&self, key: &str) -> OrchestratorResult<u64> {
        let mut cmd = redis::cmd("LLEN");
        cmd.arg(key);
        self.run("list_len", &cmd).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> OrchestratorResult<Vec<String>> {
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor).arg("MATCH").arg(&pattern).arg("COUNT").arg(100);
            let (next, batch): (u64, Vec<String>) = self.run("keys_with_prefix", &cmd).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}
