use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mockall::automock;
use tracing::{debug, error, info, warn};

use orchestrator_core::config::SchedulerSection;
use orchestrator_core::models::{
    ScheduleSpec, ScheduleTarget, ScheduledTask, TaskExecStatus, TaskExecution,
};
use orchestrator_core::traits::{LifecycleEvent, Notifier, SharedStore};
use orchestrator_core::{OrchestratorError, OrchestratorResult};

use crate::cron_utils::{next_fire, validate_spec};

fn task_key(task_id: &str) -> String {
    format!("schedtask:{task_id}")
}

fn execution_key(execution_id: &str) -> String {
    format!("schedexec:{execution_id}")
}

fn history_key(task_id: &str) -> String {
    format!("schedhist:{task_id}")
}

const TASK_KEY_PREFIX: &str = "schedtask:";

/// 定时触发的目标执行端口：工作流交给编排器，
/// 智能体直接走连接器
#[automock]
#[async_trait]
pub trait TargetRunner: Send + Sync {
    async fn run(
        &self,
        target: &ScheduleTarget,
        payload: serde_json::Value,
    ) -> OrchestratorResult<serde_json::Value>;
}

/// 任务调度器：管理定时任务、扫描到期任务并触发执行，
/// 记录每次触发的执行历史。
pub struct TaskScheduler {
    store: Arc<dyn SharedStore>,
    runner: Arc<dyn TargetRunner>,
    notifier: Option<Arc<dyn Notifier>>,
    config: SchedulerSection,
}

impl TaskScheduler {
    pub fn new(
        store: Arc<dyn SharedStore>,
        runner: Arc<dyn TargetRunner>,
        config: SchedulerSection,
    ) -> Self {
        Self {
            store,
            runner,
            notifier: None,
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    async fn save_task(&self, task: &ScheduledTask) -> OrchestratorResult<()> {
        self.store
            .set(&task_key(&task.id), &serde_json::to_string(task)?, None)
            .await
    }

    async fn save_execution(&self, execution: &TaskExecution) -> OrchestratorResult<()> {
        self.store
            .set(
                &execution_key(&execution.id),
                &serde_json::to_string(execution)?,
                None,
            )
            .await
    }

    pub async fn create_task(
        &self,
        name: &str,
        schedule: ScheduleSpec,
        target: ScheduleTarget,
        payload: serde_json::Value,
    ) -> OrchestratorResult<ScheduledTask> {
        validate_spec(&schedule)?;
        let mut task = ScheduledTask::new(name, schedule, target);
        task.payload = payload;
        task.next_run = next_fire(&task.schedule, Utc::now())?;
        self.save_task(&task).await?;
        info!(
            "创建定时任务 {} ({})，下次执行时间 {:?}",
            task.name, task.id, task.next_run
        );
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> OrchestratorResult<Option<ScheduledTask>> {
        match self.store.get(&task_key(task_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn require_task(&self, task_id: &str) -> OrchestratorResult<ScheduledTask> {
        self.get_task(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::task_not_found(task_id))
    }

    pub async fn list_tasks(&self) -> OrchestratorResult<Vec<ScheduledTask>> {
        let keys = self.store.keys_with_prefix(TASK_KEY_PREFIX).await?;
        let mut tasks = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.store.get(&key).await? {
                tasks.push(serde_json::from_str(&raw)?);
            }
        }
        tasks.sort_by(|a: &ScheduledTask, b: &ScheduledTask| a.created_at.cmp(&b.created_at));
        Ok(tasks)
    }

    /// 更新调度规格/目标/负载，重新计算下次执行时间
    pub async fn update_task(
        &self,
        task_id: &str,
        schedule: Option<ScheduleSpec>,
        payload: Option<serde_json::Value>,
    ) -> OrchestratorResult<ScheduledTask> {
        let mut task = self.require_task(task_id).await?;
        if let Some(schedule) = schedule {
            validate_spec(&schedule)?;
            task.schedule = schedule;
            task.next_run = next_fire(&task.schedule, Utc::now())?;
        }
        if let Some(payload) = payload {
            task.payload = payload;
        }
        task.updated_at = Utc::now();
        self.save_task(&task).await?;
        Ok(task)
    }

    pub async fn delete_task(&self, task_id: &str) -> OrchestratorResult<bool> {
        let removed = self.store.delete(&task_key(task_id)).await?;
        if removed {
            info!("删除定时任务 {}", task_id);
        }
        Ok(removed)
    }

    pub async fn enable_task(&self, task_id: &str) -> OrchestratorResult<ScheduledTask> {
        let mut task = self.require_task(task_id).await?;
        task.enabled = true;
        // 重新武装：从当前时刻起算下一次触发
        task.next_run = next_fire(&task.schedule, Utc::now())?;
        task.updated_at = Utc::now();
        self.save_task(&task).await?;
        Ok(task)
    }

    pub async fn disable_task(&self, task_id: &str) -> OrchestratorResult<ScheduledTask> {
        let mut task = self.require_task(task_id).await?;
        task.enabled = false;
        task.updated_at = Utc::now();
        self.save_task(&task).await?;
        Ok(task)
    }

    pub async fn get_execution(
        &self,
        execution_id: &str,
    ) -> OrchestratorResult<Option<TaskExecution>> {
        match self.store.get(&execution_key(execution_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// 按触发顺序返回任务的执行历史
    pub async fn list_executions(&self, task_id: &str) -> OrchestratorResult<Vec<TaskExecution>> {
        let ids = self.store.list_range(&history_key(task_id), 0, -1).await?;
        let mut executions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(execution) = self.get_execution(&id).await? {
                executions.push(execution);
            }
        }
        Ok(executions)
    }

    /// 协作式取消：标记取消并停止该次触发的后续处理，
    /// 不会中断已经发出的网络调用
    pub async fn cancel_execution(&self, execution_id: &str) -> OrchestratorResult<bool> {
        let Some(mut execution) = self.get_execution(execution_id).await? else {
            return Ok(false);
        };
        if execution.is_terminal() {
            return Ok(false);
        }
        execution.mark_cancelled();
        self.save_execution(&execution).await?;
        info!("任务执行 {} 已取消", execution_id);
        Ok(true)
    }

    /// 立即触发一次（不等待调度时间），返回执行记录
    pub async fn execute_task(&self, task_id: &str) -> OrchestratorResult<TaskExecution> {
        let task = self.require_task(task_id).await?;
        let execution = TaskExecution::new(&task.id, Utc::now());
        self.save_execution(&execution).await?;
        self.record_history(&task.id, &execution.id).await?;
        self.run_execution(task, execution.clone()).await;
        // 回读终态
        Ok(self
            .get_execution(&execution.id)
            .await?
            .unwrap_or(execution))
    }

    /// 扫描到期任务并触发，返回本轮触发的执行记录。
    /// next_run在触发时即重新计算，任务保持武装。
    pub async fn scan_once(&self) -> OrchestratorResult<Vec<TaskExecution>> {
        let now = Utc::now();
        let mut fired = Vec::new();
        for mut task in self.list_tasks().await? {
            if !task.is_due(now) {
                continue;
            }
            debug!("任务 {} 到达调度时间", task.name);

            task.last_run = Some(now);
            task.next_run = match next_fire(&task.schedule, now) {
                Ok(next) => next,
                Err(error) => {
                    error!("任务 {} 重新计算下次执行时间失败: {}", task.id, error);
                    None
                }
            };
            self.save_task(&task).await?;

            let execution = TaskExecution::new(&task.id, now);
            self.save_execution(&execution).await?;
            self.record_history(&task.id, &execution.id).await?;
            fired.push(execution.clone());
            self.run_execution(task, execution).await;
        }
        if !fired.is_empty() {
            info!("本轮调度触发了 {} 个任务", fired.len());
        }
        Ok(fired)
    }

    async fn record_history(&self, task_id: &str, execution_id: &str) -> OrchestratorResult<()> {
        let history = history_key(task_id);
        self.store.list_push_back(&history, execution_id).await?;
        // 修剪最旧的历史条目
        let ids = self.store.list_range(&history, 0, -1).await?;
        if ids.len() > self.config.history_limit {
            for stale in &ids[..ids.len() - self.config.history_limit] {
                self.store.list_remove(&history, stale).await?;
                self.store.delete(&execution_key(stale)).await?;
            }
        }
        Ok(())
    }

    async fn run_execution(&self, task: ScheduledTask, mut execution: TaskExecution) {
        execution.mark_running();
        if let Err(error) = self.save_execution(&execution).await {
            error!("保存执行记录 {} 失败: {}", execution.id, error);
            return;
        }

        let result = self.runner.run(&task.target, task.payload.clone()).await;

        // 运行期间可能被协作式取消，取消后不再写入终态
        match self.get_execution(&execution.id).await {
            Ok(Some(current)) if current.status == TaskExecStatus::Cancelled => {
                info!("任务执行 {} 在运行中被取消，丢弃结果", execution.id);
                return;
            }
            _ => {}
        }

        match result {
            Ok(output) => {
                execution.mark_completed(Some(output));
                debug!(
                    "任务 {} 执行 {} 完成，耗时 {:?}ms",
                    task.name,
                    execution.id,
                    execution.duration_ms()
                );
            }
            Err(error) => {
                execution.mark_failed(error.to_string());
                warn!("任务 {} 执行 {} 失败: {}", task.name, execution.id, error);
            }
        }
        if let Err(error) = self.save_execution(&execution).await {
            error!("保存执行记录 {} 终态失败: {}", execution.id, error);
        }

        if let Some(notifier) = &self.notifier {
            notifier
                .notify(LifecycleEvent::TaskExecutionCompleted {
                    task_id: task.id.clone(),
                    execution_id: execution.id.clone(),
                    status: execution.status,
                    timestamp: Utc::now(),
                })
                .await;
        }
    }

    /// 后台扫描循环，按配置的间隔驱动scan_once
    pub fn spawn_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs(self.config.scan_interval_seconds.max(1));
        info!("启动调度扫描循环，间隔 {}s", interval.as_secs());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(error) = self.scan_once().await {
                    error!("调度扫描失败: {}", error);
                }
            }
        })
    }
}
