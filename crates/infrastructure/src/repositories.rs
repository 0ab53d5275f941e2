use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use orchestrator_core::models::{ExecutionRecord, WorkflowDefinition};
use orchestrator_core::traits::{
    ExecutionFilter, ExecutionRepository, Page, PageRequest, WorkflowRepository,
};
use orchestrator_core::OrchestratorResult;

/// In-memory workflow definition repository for tests and embedded
/// deployments; relational implementations live outside this workspace.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    definitions: RwLock<HashMap<(String, String), WorkflowDefinition>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn find_by_id(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> OrchestratorResult<Option<WorkflowDefinition>> {
        let definitions = self.definitions.read().await;
        Ok(definitions
            .get(&(tenant_id.to_string(), id.to_string()))
            .cloned())
    }

    async fn save(
        &self,
        tenant_id: &str,
        definition: &WorkflowDefinition,
    ) -> OrchestratorResult<()> {
        let mut definitions = self.definitions.write().await;
        definitions.insert(
            (tenant_id.to_string(), definition.id.clone()),
            definition.clone(),
        );
        Ok(())
    }

    async fn delete(&self, tenant_id: &str, id: &str) -> OrchestratorResult<bool> {
        let mut definitions = self.definitions.write().await;
        Ok(definitions
            .remove(&(tenant_id.to_string(), id.to_string()))
            .is_some())
    }

    async fn list(
        &self,
        tenant_id: &str,
        page: PageRequest,
    ) -> OrchestratorResult<Page<WorkflowDefinition>> {
        let definitions = self.definitions.read().await;
        let mut items: Vec<WorkflowDefinition> = definitions
            .iter()
            .filter(|((tenant, _), _)| tenant == tenant_id)
            .map(|(_, def)| def.clone())
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(page.offset())
            .take(page.page_size as usize)
            .collect();
        Ok(Page {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryExecutionRepository {
    records: RwLock<HashMap<(String, String), ExecutionRecord>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, record: &ExecutionRecord) -> OrchestratorResult<()> {
        let mut records = self.records.write().await;
        records.insert(
            (record.tenant_id.clone(), record.id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn update(&self, record: &ExecutionRecord) -> OrchestratorResult<()> {
        let mut records = self.records.write().await;
        records.insert(
            (record.tenant_id.clone(), record.id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn find_by_id(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> OrchestratorResult<Option<ExecutionRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(tenant_id.to_string(), id.to_string())).cloned())
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: ExecutionFilter,
        page: PageRequest,
    ) -> OrchestratorResult<Page<ExecutionRecord>> {
        let records = self.records.read().await;
        let mut items: Vec<ExecutionRecord> = records
            .iter()
            .filter(|((tenant, _), _)| tenant == tenant_id)
            .map(|(_, record)| record.clone())
            .filter(|record| {
                filter
                    .workflow_id
                    .as_ref()
                    .map(|id| &record.workflow_id == id)
                    .unwrap_or(true)
                    && filter
                        .status
                        .map(|status| record.status == status)
                        .unwrap_or(true)
            })
            .collect();
        items.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(page.offset())
            .take(page.page_size as usize)
            .collect();
        Ok(Page {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }
}
