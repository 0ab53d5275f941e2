use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fault_tolerance::BreakerConfig;
use crate::{OrchestratorError, OrchestratorResult};

/// 单个智能体的连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub base_url: String,
    #[serde(default = "default_agent_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_agent_max_retries")]
    pub max_retries: u32,
}

fn default_agent_timeout_ms() -> u64 {
    30_000
}

fn default_agent_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultToleranceSection {
    pub failure_threshold: u32,
    pub open_timeout_ms: u64,
}

impl Default for FaultToleranceSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_ms: 60_000,
        }
    }
}

impl FaultToleranceSection {
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerSection {
    /// 负载达到该值的实例视为饱和，选择时降级
    pub saturation_threshold: u8,
    pub health_check_interval_seconds: u64,
    pub health_check_timeout_ms: u64,
}

impl Default for LoadBalancerSection {
    fn default() -> Self {
        Self {
            saturation_threshold: 90,
            health_check_interval_seconds: 30,
            health_check_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub scan_interval_seconds: u64,
    /// 每个任务保留的执行历史条数
    pub history_limit: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            scan_interval_seconds: 5,
            history_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingSection {
    pub default_ttl_seconds: u64,
    pub ack_timeout_ms: u64,
    pub ack_poll_interval_ms: u64,
}

impl Default for MessagingSection {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 3600,
            ack_timeout_ms: 5_000,
            ack_poll_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    /// 会话上下文的不活跃过期窗口
    pub ttl_seconds: u64,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self { ttl_seconds: 3600 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackend,
    pub redis_url: Option<String>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: None,
        }
    }
}

/// 编排核心的顶层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agents: HashMap<String, AgentConfig>,
    pub fault_tolerance: FaultToleranceSection,
    pub load_balancer: LoadBalancerSection,
    pub scheduler: SchedulerSection,
    pub messaging: MessagingSection,
    pub context: ContextSection,
    pub store: StoreSection,
}

impl AppConfig {
    /// 从TOML文件和 ORCHESTRATOR__ 前缀的环境变量加载配置，
    /// 环境变量优先于文件
    pub fn load(path: Option<&str>) -> OrchestratorResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("ORCHESTRATOR").separator("__"))
            .build()
            .map_err(|e| OrchestratorError::Configuration(format!("配置加载失败: {e}")))?;

        let app_config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| OrchestratorError::Configuration(format!("配置解析失败: {e}")))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        for (name, agent) in &self.agents {
            if agent.base_url.is_empty() {
                return Err(OrchestratorError::Configuration(format!(
                    "智能体 {name} 的 base_url 不能为空"
                )));
            }
            if agent.timeout_ms == 0 {
                return Err(OrchestratorError::Configuration(format!(
                    "智能体 {name} 的 timeout_ms 必须大于0"
                )));
            }
        }
        if self.fault_tolerance.failure_threshold == 0 {
            return Err(OrchestratorError::Configuration(
                "fault_tolerance.failure_threshold 必须大于0".to_string(),
            ));
        }
        if self.load_balancer.saturation_threshold == 0
            || self.load_balancer.saturation_threshold > 100
        {
            return Err(OrchestratorError::Configuration(
                "load_balancer.saturation_threshold 必须在1-100之间".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_none() {
            return Err(OrchestratorError::Configuration(
                "store.backend为redis时必须提供store.redis_url".to_string(),
            ));
        }
        Ok(())
    }

    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }
}
