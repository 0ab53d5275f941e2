use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 审计轨迹上限，超出后淘汰最旧条目
pub const AUDIT_TRAIL_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextMetrics {
    pub step_count: u64,
    pub agent_invocations: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub actor: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// 跨步骤的执行级共享状态，按session id存取，带有限生命周期
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalContext {
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub shared_data: HashMap<String, serde_json::Value>,
    /// 每个智能体最近一次上报的状态快照
    #[serde(default)]
    pub agent_states: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub metrics: ContextMetrics,
    #[serde(default)]
    pub audit_trail: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl GlobalContext {
    pub fn new(
        session_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            tenant_id: tenant_id.into(),
            user_id,
            shared_data: HashMap::new(),
            agent_states: HashMap::new(),
            metrics: ContextMetrics::default(),
            audit_trail: Vec::new(),
            created_at: now,
            last_update: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_update = Utc::now();
    }

    pub fn push_audit_entry(&mut self, entry: AuditEntry) {
        self.audit_trail.push(entry);
        if self.audit_trail.len() > AUDIT_TRAIL_LIMIT {
            let excess = self.audit_trail.len() - AUDIT_TRAIL_LIMIT;
            self.audit_trail.drain(0..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_trail_is_capped() {
        let mut ctx = GlobalContext::new("s-1", "tenant-a", None);
        for i in 0..150 {
            ctx.push_audit_entry(AuditEntry {
                action: format!("action-{i}"),
                actor: "engine".to_string(),
                details: None,
                timestamp: Utc::now(),
            });
        }
        assert_eq!(ctx.audit_trail.len(), AUDIT_TRAIL_LIMIT);
        // 最旧的条目被淘汰
        assert_eq!(ctx.audit_trail[0].action, "action-50");
        assert_eq!(ctx.audit_trail.last().unwrap().action, "action-149");
    }

    #[test]
    fn test_touch_refreshes_last_update() {
        let mut ctx = GlobalContext::new("s-1", "tenant-a", Some("user-9".to_string()));
        let before = ctx.last_update;
        std::thread::sleep(std::time::Duration::from_millis(5));
        ctx.touch();
        assert!(ctx.last_update > before);
    }
}
