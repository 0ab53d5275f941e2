use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use orchestrator_core::models::{ResourceAllocation, ResourcePool};
use orchestrator_core::traits::{LifecycleEvent, Notifier, SharedStore};
use orchestrator_core::{OrchestratorError, OrchestratorResult};

fn pool_key(name: &str) -> String {
    format!("pool:{name}")
}

fn allocation_key(pool: &str, resource_id: &str) -> String {
    format!("alloc:{pool}:{resource_id}")
}

fn allocation_prefix(pool: &str) -> String {
    format!("alloc:{pool}:")
}

/// 命名资源池与时限租约。
///
/// 资源id的唯一持有通过set-if-absent保证；池内已分配计数是
/// 读-改-写更新，同名并发调用可能交错，这是设计接受的竞态。
pub struct ResourcePoolManager {
    store: Arc<dyn SharedStore>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ResourcePoolManager {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn create_pool(&self, name: &str, capacity: u32) -> OrchestratorResult<ResourcePool> {
        let pool = ResourcePool::new(name, capacity);
        let created = self
            .store
            .set_if_absent(&pool_key(name), &serde_json::to_string(&pool)?, None)
            .await?;
        if !created {
            return Err(OrchestratorError::Validation(format!(
                "资源池 {name} 已存在"
            )));
        }
        info!("创建资源池 {}，容量 {}", name, capacity);
        Ok(pool)
    }

    pub async fn delete_pool(&self, name: &str) -> OrchestratorResult<bool> {
        for key in self.store.keys_with_prefix(&allocation_prefix(name)).await? {
            self.store.delete(&key).await?;
        }
        let removed = self.store.delete(&pool_key(name)).await?;
        if removed {
            info!("删除资源池 {}", name);
        }
        Ok(removed)
    }

    pub async fn pool_status(&self, name: &str) -> OrchestratorResult<ResourcePool> {
        self.load_pool(name).await
    }

    async fn load_pool(&self, name: &str) -> OrchestratorResult<ResourcePool> {
        match self.store.get(&pool_key(name)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(OrchestratorError::PoolNotFound {
                name: name.to_string(),
            }),
        }
    }

    async fn save_pool(&self, pool: &ResourcePool) -> OrchestratorResult<()> {
        self.store
            .set(&pool_key(&pool.name), &serde_json::to_string(pool)?, None)
            .await
    }

    /// 申请租约。资源id已被持有或池已满时失败。
    pub async fn allocate(
        &self,
        pool_name: &str,
        resource_id: &str,
        holder: &str,
        duration_seconds: u64,
        metadata: HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<ResourceAllocation> {
        let mut pool = self.load_pool(pool_name).await?;
        if !pool.has_capacity() {
            return Err(OrchestratorError::ResourceExhausted(format!(
                "资源池 {pool_name} 已达容量上限 {}",
                pool.capacity
            )));
        }

        let allocation =
            ResourceAllocation::new(pool_name, resource_id, holder, duration_seconds, metadata);
        let claimed = self
            .store
            .set_if_absent(
                &allocation_key(pool_name, resource_id),
                &serde_json::to_string(&allocation)?,
                None,
            )
            .await?;
        if !claimed {
            return Err(OrchestratorError::Validation(format!(
                "资源 {resource_id} 在池 {pool_name} 中已被持有"
            )));
        }

        pool.allocated += 1;
        self.save_pool(&pool).await?;
        debug!(
            "资源 {} 租给 {}，{} 秒后过期",
            resource_id, holder, duration_seconds
        );
        Ok(allocation)
    }

    /// 显式释放租约，返回是否确有释放
    pub async fn release(&self, pool_name: &str, resource_id: &str) -> OrchestratorResult<bool> {
        let removed = self
            .store
            .delete(&allocation_key(pool_name, resource_id))
            .await?;
        if removed {
            let mut pool = self.load_pool(pool_name).await?;
            pool.allocated = pool.allocated.saturating_sub(1);
            self.save_pool(&pool).await?;
            debug!("资源 {} 从池 {} 释放", resource_id, pool_name);
        }
        Ok(removed)
    }

    /// 资源当前是否可被申请（无活跃未过期租约）
    pub async fn is_available(&self, pool_name: &str, resource_id: &str) -> OrchestratorResult<bool> {
        match self
            .store
            .get(&allocation_key(pool_name, resource_id))
            .await?
        {
            Some(raw) => {
                let allocation: ResourceAllocation = serde_json::from_str(&raw)?;
                Ok(allocation.is_expired(Utc::now()))
            }
            None => Ok(true),
        }
    }

    /// 清扫过期租约：释放资源id并回减池计数，返回清理数量
    pub async fn cleanup_expired(&self, pool_name: &str) -> OrchestratorResult<u32> {
        let now = Utc::now();
        let mut released = 0u32;
        for key in self
            .store
            .keys_with_prefix(&allocation_prefix(pool_name))
            .await?
        {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let allocation: ResourceAllocation = serde_json::from_str(&raw)?;
            if !allocation.is_expired(now) {
                continue;
            }
            if self.store.delete(&key).await? {
                released += 1;
                warn!(
                    "资源 {} 的租约已过期，持有者 {}，自动回收",
                    allocation.resource_id, allocation.holder
                );
                if let Some(notifier) = &self.notifier {
                    notifier
                        .notify(LifecycleEvent::ResourceLeaseExpired {
                            pool: pool_name.to_string(),
                            resource_id: allocation.resource_id.clone(),
                            timestamp: now,
                        })
                        .await;
                }
            }
        }
        if released > 0 {
            let mut pool = self.load_pool(pool_name).await?;
            pool.allocated = pool.allocated.saturating_sub(released);
            self.save_pool(&pool).await?;
            info!("资源池 {} 清理了 {} 个过期租约", pool_name, released);
        }
        Ok(released)
    }
}
