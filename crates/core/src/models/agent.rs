use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一个已部署的智能体副本
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstance {
    pub id: String,
    pub agent: String,
    pub host: String,
    pub port: u16,
    pub status: InstanceStatus,
    /// 当前负载 0-100
    pub load: u8,
    /// 权重，加权轮询时使用
    pub capacity: u32,
    pub registered_at: DateTime<Utc>,
    pub last_health_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Healthy,
    Unhealthy,
    Maintenance,
}

impl AgentInstance {
    pub fn new(agent: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent: agent.into(),
            host: host.into(),
            port,
            status: InstanceStatus::Healthy,
            load: 0,
            capacity: 1,
            registered_at: Utc::now(),
            last_health_check: None,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == InstanceStatus::Healthy
    }

    pub fn is_saturated(&self, threshold: u8) -> bool {
        self.load >= threshold
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

/// 调用失败的分类，调用方按类别区分处理
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCode {
    AgentNotConfigured,
    Timeout,
    Connection,
    Http,
    CircuitOpen,
    UnmetDependencies,
    Internal,
}

impl OutcomeCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeCode::AgentNotConfigured => "agent_not_configured",
            OutcomeCode::Timeout => "timeout",
            OutcomeCode::Connection => "connection",
            OutcomeCode::Http => "http",
            OutcomeCode::CircuitOpen => "circuit_open",
            OutcomeCode::UnmetDependencies => "unmet_dependencies",
            OutcomeCode::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeError {
    pub message: String,
    pub code: OutcomeCode,
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeMetadata {
    pub duration_ms: u64,
    pub retries: u32,
}

/// 智能体调用结果。连接器从不向调用方抛错，
/// 所有结局都以带标记的结果返回。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<OutcomeError>,
    pub metadata: OutcomeMetadata,
}

impl ExecutionOutcome {
    pub fn ok(data: Option<serde_json::Value>, metadata: OutcomeMetadata) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata,
        }
    }

    pub fn fail(error: OutcomeError, metadata: OutcomeMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata,
        }
    }

    pub fn config_failure(message: impl Into<String>) -> Self {
        Self::fail(
            OutcomeError {
                message: message.into(),
                code: OutcomeCode::AgentNotConfigured,
                status: None,
            },
            OutcomeMetadata::default(),
        )
    }
}

/// 按步骤覆盖连接器的默认配置
#[derive(Debug, Clone, Default)]
pub struct CallOverride {
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    /// 指定实例地址时跳过负载均衡
    pub base_url: Option<String>,
}
