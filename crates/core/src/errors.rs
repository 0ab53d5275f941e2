use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("工作流未找到: {id}")]
    WorkflowNotFound { id: String },
    #[error("执行记录未找到: {id}")]
    ExecutionNotFound { id: String },
    #[error("调度任务未找到: {id}")]
    TaskNotFound { id: String },
    #[error("资源池未找到: {name}")]
    PoolNotFound { name: String },
    #[error("会话上下文未找到: {session_id}")]
    ContextNotFound { session_id: String },
    #[error("熔断器打开: {id}")]
    CircuitOpen { id: String },
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("共享存储错误: {0}")]
    Store(String),
    #[error("消息队列错误: {0}")]
    MessageQueue(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("智能体调用错误: {0}")]
    AgentExecution(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("资源不足: {0}")]
    ResourceExhausted(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn store_error<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }
    pub fn workflow_not_found<S: Into<String>>(id: S) -> Self {
        Self::WorkflowNotFound { id: id.into() }
    }
    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }
    pub fn circuit_open<S: Into<String>>(id: S) -> Self {
        Self::CircuitOpen { id: id.into() }
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Internal(_)
                | OrchestratorError::Configuration(_)
                | OrchestratorError::ResourceExhausted(_)
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Store(_)
                | OrchestratorError::MessageQueue(_)
                | OrchestratorError::Network(_)
                | OrchestratorError::Timeout(_)
                | OrchestratorError::AgentExecution(_)
        )
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
