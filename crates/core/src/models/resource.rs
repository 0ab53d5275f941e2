use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 有限容量的命名资源池
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePool {
    pub name: String,
    pub capacity: u32,
    /// 当前已分配数量，必须 ≤ capacity
    pub allocated: u32,
    pub created_at: DateTime<Utc>,
}

impl ResourcePool {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            allocated: 0,
            created_at: Utc::now(),
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.allocated < self.capacity
    }
}

/// 对池内资源的一次租约，同一资源id最多一个活跃租约
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub resource_id: String,
    pub pool: String,
    pub holder: String,
    pub allocated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ResourceAllocation {
    pub fn new(
        pool: impl Into<String>,
        resource_id: impl Into<String>,
        holder: impl Into<String>,
        duration_seconds: u64,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            resource_id: resource_id.into(),
            pool: pool.into(),
            holder: holder.into(),
            allocated_at: now,
            expires_at: now + chrono::Duration::seconds(duration_seconds as i64),
            metadata,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_capacity() {
        let mut pool = ResourcePool::new("gpu", 2);
        assert!(pool.has_capacity());
        pool.allocated = 2;
        assert!(!pool.has_capacity());
    }

    #[test]
    fn test_allocation_expiry() {
        let lease = ResourceAllocation::new("gpu", "gpu-0", "worker-1", 30, HashMap::new());
        assert!(!lease.is_expired(lease.allocated_at + chrono::Duration::seconds(29)));
        assert!(lease.is_expired(lease.allocated_at + chrono::Duration::seconds(30)));
    }
}
