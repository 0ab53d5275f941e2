use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::models::{ExecutionRecord, RecordStatus, WorkflowDefinition};
use crate::OrchestratorResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl PageRequest {
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// 执行记录列表过滤条件，仅做基础筛选，不承载查询逻辑
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionFilter {
    pub workflow_id: Option<String>,
    pub status: Option<RecordStatus>,
}

/// 工作流定义的持久化端口，关系型实现由外部协作方提供
#[automock]
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> OrchestratorResult<Option<WorkflowDefinition>>;

    async fn save(&self, tenant_id: &str, definition: &WorkflowDefinition)
        -> OrchestratorResult<()>;

    async fn delete(&self, tenant_id: &str, id: &str) -> OrchestratorResult<bool>;

    async fn list(
        &self,
        tenant_id: &str,
        page: PageRequest,
    ) -> OrchestratorResult<Page<WorkflowDefinition>>;
}

/// 执行审计记录的持久化端口
#[automock]
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create(&self, record: &ExecutionRecord) -> OrchestratorResult<()>;

    async fn update(&self, record: &ExecutionRecord) -> OrchestratorResult<()>;

    async fn find_by_id(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> OrchestratorResult<Option<ExecutionRecord>>;

    async fn list(
        &self,
        tenant_id: &str,
        filter: ExecutionFilter,
        page: PageRequest,
    ) -> OrchestratorResult<Page<ExecutionRecord>>;
}
