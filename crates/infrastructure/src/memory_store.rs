use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use orchestrator_core::traits::SharedStore;
use orchestrator_core::{OrchestratorError, OrchestratorResult};

/// 内存版共享存储实现
///
/// 使用读写锁保护的哈希表模拟带过期的键值与列表原语，
/// 适用于测试和嵌入式单进程部署场景。过期键在访问时惰性清理。
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    lists: RwLock<HashMap<String, VecDeque<String>>>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| now >= t).unwrap_or(false)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(entry: Option<&Entry>, now: Instant) -> Option<String> {
        match entry {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// 移除所有已过期键，返回清理数量
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("内存存储清理了 {} 个过期键", removed);
        }
        removed
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> OrchestratorResult<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(Self::live_value(entries.get(key), now))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> OrchestratorResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> OrchestratorResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if Self::live_value(entries.get(key), now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> OrchestratorResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match Self::live_value(entries.get(key), now) {
            Some(current) if current == expected => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: new.to_string(),
                        expires_at: ttl.map(|ttl| now + ttl),
                    },
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> OrchestratorResult<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> OrchestratorResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment(&self, key: &str, delta: i64) -> OrchestratorResult<i64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let current = match Self::live_value(entries.get(key), now) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                OrchestratorError::Store(format!("键 {key} 的值不是整数，无法自增"))
            })?,
            None => 0,
        };
        let next = current + delta;
        // 已过期键的旧期限不能带到新值上
        let expires_at = entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at);
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn list_push_back(&self, key: &str, value: &str) -> OrchestratorResult<u64> {
        let mut lists = self.lists.write().await;
        let list = lists.entry(key.to_string()).or_default();
        list.push_back(value.to_string());
        Ok(list.len() as u64)
    }

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> OrchestratorResult<Vec<String>> {
        let lists = self.lists.read().await;
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = list.len() as isize;
        let normalize = |index: isize| -> isize {
            if index < 0 {
                (len + index).max(0)
            } else {
                index
            }
        };
        let from = normalize(start);
        let to = normalize(stop).min(len - 1);
        if len == 0 || from > to {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(from as usize)
            .take((to - from + 1) as usize)
            .cloned()
            .collect())
    }

    async fn list_remove(&self, key: &str, value: &str) -> OrchestratorResult<u64> {
        let mut lists = self.lists.write().await;
        let Some(list) = lists.get_mut(key) else {
            return Ok(0);
        };
        match list.iter().position(|item| item == value) {
            Some(position) => {
                list.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn list_len(&self, key: &str) -> OrchestratorResult<u64> {
        let lists = self.lists.read().await;
        Ok(lists.get(key).map(|l| l.len() as u64).unwrap_or(0))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> OrchestratorResult<Vec<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
