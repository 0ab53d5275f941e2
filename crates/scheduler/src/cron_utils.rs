use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;

use orchestrator_core::models::ScheduleSpec;
use orchestrator_core::{OrchestratorError, OrchestratorResult};

/// CRON表达式解析和触发时间计算。
/// 使用真实CRON语义（秒级，6或7字段），而不是固定偏移近似。
pub struct CronSchedule {
    schedule: Schedule,
}

impl CronSchedule {
    pub fn new(cron_expr: &str) -> OrchestratorResult<Self> {
        let schedule =
            Schedule::from_str(cron_expr).map_err(|e| OrchestratorError::InvalidCron {
                expr: cron_expr.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { schedule })
    }

    /// 验证CRON表达式是否有效
    pub fn validate(cron_expr: &str) -> OrchestratorResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    /// 获取下一次执行时间
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 检查任务是否已过期（超过预期执行时间太久）
    pub fn is_overdue(
        &self,
        last_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        grace_period_minutes: i64,
    ) -> bool {
        let check_from = last_run.unwrap_or(now - Duration::hours(24));
        match self.schedule.after(&check_from).next() {
            Some(expected) => {
                expected < now && now > expected + Duration::minutes(grace_period_minutes)
            }
            None => false,
        }
    }
}

/// 按调度规格计算下一次触发时间。
/// 固定间隔模式独立于CRON语义，总有下一次；CRON表达式
/// 可能没有未来触发点（例如指定了过去的年份）。
pub fn next_fire(
    spec: &ScheduleSpec,
    from: DateTime<Utc>,
) -> OrchestratorResult<Option<DateTime<Utc>>> {
    match spec {
        ScheduleSpec::Cron { expr } => Ok(CronSchedule::new(expr)?.next_after(from)),
        ScheduleSpec::Interval { seconds } => {
            Ok(Some(from + Duration::seconds((*seconds).max(1) as i64)))
        }
    }
}

/// 创建任务前校验调度规格
pub fn validate_spec(spec: &ScheduleSpec) -> OrchestratorResult<()> {
    match spec {
        ScheduleSpec::Cron { expr } => CronSchedule::validate(expr),
        ScheduleSpec::Interval { seconds } => {
            if *seconds == 0 {
                return Err(OrchestratorError::Validation(
                    "固定间隔必须大于0秒".to_string(),
                ));
            }
            Ok(())
        }
    }
}
