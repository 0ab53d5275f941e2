use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use orchestrator_core::config::SchedulerSection;
use orchestrator_core::models::{ScheduleSpec, ScheduleTarget, TaskExecStatus};
use orchestrator_core::traits::SharedStore;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use orchestrator_infrastructure::MemoryStore;
use orchestrator_scheduler::{TargetRunner, TaskScheduler};

/// 可编程的目标执行桩：固定结果，可选延迟
struct StubRunner {
    delay: Duration,
    fail: bool,
}

impl StubRunner {
    fn ok() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: true,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self { delay, fail: false }
    }
}

#[async_trait]
impl TargetRunner for StubRunner {
    async fn run(
        &self,
        target: &ScheduleTarget,
        payload: serde_json::Value,
    ) -> OrchestratorResult<serde_json::Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(OrchestratorError::AgentExecution(
                "target unavailable".to_string(),
            ));
        }
        Ok(json!({"target": format!("{target:?}"), "echo": payload}))
    }
}

fn scheduler_with(runner: StubRunner) -> Arc<TaskScheduler> {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    Arc::new(TaskScheduler::new(
        store,
        Arc::new(runner),
        SchedulerSection {
            scan_interval_seconds: 1,
            history_limit: 3,
        },
    ))
}

fn agent_target() -> ScheduleTarget {
    ScheduleTarget::Agent {
        agent: "reporter".to_string(),
    }
}

#[tokio::test]
async fn create_task_arms_next_run() {
    let scheduler = scheduler_with(StubRunner::ok());
    let task = scheduler
        .create_task(
            "hourly-report",
            ScheduleSpec::Cron {
                expr: "0 0 * * * *".to_string(),
            },
            agent_target(),
            json!({"format": "pdf"}),
        )
        .await
        .unwrap();

    assert!(task.enabled);
    let next = task.next_run.expect("armed");
    assert!(next > Utc::now());

    let interval_task = scheduler
        .create_task(
            "sweep",
            ScheduleSpec::Interval { seconds: 120 },
            agent_target(),
            json!({}),
        )
        .await
        .unwrap();
    let delta = interval_task.next_run.unwrap() - Utc::now();
    assert!((118..=122).contains(&delta.num_seconds()));
}

#[tokio::test]
async fn invalid_schedule_is_rejected() {
    let scheduler = scheduler_with(StubRunner::ok());
    let bad_cron = scheduler
        .create_task(
            "bad",
            ScheduleSpec::Cron {
                expr: "nope".to_string(),
            },
            agent_target(),
            json!({}),
        )
        .await;
    assert!(matches!(bad_cron, Err(OrchestratorError::InvalidCron { .. })));

    let zero_interval = scheduler
        .create_task(
            "bad",
            ScheduleSpec::Interval { seconds: 0 },
            agent_target(),
            json!({}),
        )
        .await;
    assert!(matches!(zero_interval, Err(OrchestratorError::Validation(_))));
}

#[tokio::test]
async fn scan_fires_due_task_and_rearms() {
    let scheduler = scheduler_with(StubRunner::ok());
    let task = scheduler
        .create_task(
            "sweep",
            ScheduleSpec::Interval { seconds: 1 },
            agent_target(),
            json!({"n": 1}),
        )
        .await
        .unwrap();

    // 尚未到期，本轮不触发
    assert!(scheduler.scan_once().await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let fired = scheduler.scan_once().await.unwrap();
    assert_eq!(fired.len(), 1);

    let execution = scheduler
        .get_execution(&fired[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, TaskExecStatus::Completed);
    assert!(execution.result.is_some());
    assert!(execution.duration_ms().is_some());

    let rearmed = scheduler.get_task(&task.id).await.unwrap().unwrap();
    assert!(rearmed.last_run.is_some());
    assert!(rearmed.next_run.unwrap() > Utc::now());
}

#[tokio::test]
async fn failed_runner_marks_execution_failed() {
    let scheduler = scheduler_with(StubRunner::failing());
    let task = scheduler
        .create_task(
            "doomed",
            ScheduleSpec::Interval { seconds: 3600 },
            agent_target(),
            json!({}),
        )
        .await
        .unwrap();

    let execution = scheduler.execute_task(&task.id).await.unwrap();
    assert_eq!(execution.status, TaskExecStatus::Failed);
    assert!(execution.error.as_deref().unwrap().contains("target unavailable"));
}

#[tokio::test]
async fn disabled_task_is_not_fired() {
    let scheduler = scheduler_with(StubRunner::ok());
    let task = scheduler
        .create_task(
            "paused",
            ScheduleSpec::Interval { seconds: 1 },
            agent_target(),
            json!({}),
        )
        .await
        .unwrap();
    scheduler.disable_task(&task.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(scheduler.scan_once().await.unwrap().is_empty());

    // 重新启用后从当前时刻重新武装
    let enabled = scheduler.enable_task(&task.id).await.unwrap();
    assert!(enabled.next_run.unwrap() > Utc::now());
}

#[tokio::test]
async fn execute_task_runs_immediately_out_of_band() {
    let scheduler = scheduler_with(StubRunner::ok());
    let task = scheduler
        .create_task(
            "on-demand",
            ScheduleSpec::Interval { seconds: 86_400 },
            ScheduleTarget::Workflow {
                workflow_id: "wf-1".to_string(),
                tenant_id: "tenant-a".to_string(),
            },
            json!({"run": "now"}),
        )
        .await
        .unwrap();
    let armed_next_run = task.next_run;

    let execution = scheduler.execute_task(&task.id).await.unwrap();
    assert_eq!(execution.status, TaskExecStatus::Completed);

    // 立即触发不消耗调度时间
    let unchanged = scheduler.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(unchanged.next_run, armed_next_run);
    assert!(unchanged.last_run.is_none());
}

#[tokio::test]
async fn unknown_task_execution_fails() {
    let scheduler = scheduler_with(StubRunner::ok());
    let result = scheduler.execute_task("ghost").await;
    assert!(matches!(result, Err(OrchestratorError::TaskNotFound { .. })));
}

#[tokio::test]
async fn cancellation_is_cooperative() {
    let scheduler = scheduler_with(StubRunner::slow(Duration::from_millis(150)));
    let task = scheduler
        .create_task(
            "long-haul",
            ScheduleSpec::Interval { seconds: 3600 },
            agent_target(),
            json!({}),
        )
        .await
        .unwrap();

    let runner_handle = {
        let scheduler = scheduler.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move { scheduler.execute_task(&task_id).await.unwrap() })
    };

    // 等执行进入running后取消
    tokio::time::sleep(Duration::from_millis(50)).await;
    let running = scheduler.list_executions(&task.id).await.unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].status, TaskExecStatus::Running);
    assert!(scheduler.cancel_execution(&running[0].id).await.unwrap());

    let finished = runner_handle.await.unwrap();
    assert_eq!(finished.status, TaskExecStatus::Cancelled);
    // 终态不可再取消
    assert!(!scheduler.cancel_execution(&finished.id).await.unwrap());
}

#[tokio::test]
async fn history_is_trimmed_to_limit() {
    let scheduler = scheduler_with(StubRunner::ok());
    let task = scheduler
        .create_task(
            "chatty",
            ScheduleSpec::Interval { seconds: 3600 },
            agent_target(),
            json!({}),
        )
        .await
        .unwrap();

    for _ in 0..5 {
        scheduler.execute_task(&task.id).await.unwrap();
    }

    // history_limit=3
    let history = scheduler.list_executions(&task.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|e| e.status == TaskExecStatus::Completed));
}
