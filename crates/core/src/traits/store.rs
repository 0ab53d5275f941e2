use std::time::Duration;

use async_trait::async_trait;

use crate::OrchestratorResult;

/// 进程间共享状态的键值存储抽象。
///
/// 所有跨进程状态（熔断器、实例注册表、资源池、消息队列、
/// 定时任务、会话上下文）都通过这组原语读写，任何提供
/// 带过期键值和有序列表的存储都可以替换实现。
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> OrchestratorResult<Option<String>>;

    /// 写入值，可选按键过期
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> OrchestratorResult<()>;

    /// 仅当键不存在时写入，返回是否写入成功
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> OrchestratorResult<bool>;

    /// 仅当当前值等于expected时替换，单写者状态迁移使用
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> OrchestratorResult<bool>;

    async fn delete(&self, key: &str) -> OrchestratorResult<bool>;

    async fn expire(&self, key: &str, ttl: Duration) -> OrchestratorResult<bool>;

    async fn increment(&self, key: &str, delta: i64) -> OrchestratorResult<i64>;

    /// 追加到列表尾部，返回追加后的长度
    async fn list_push_back(&self, key: &str, value: &str) -> OrchestratorResult<u64>;

    /// 读取 [start, stop] 区间（含端点，支持-1表示末尾），不移除
    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> OrchestratorResult<Vec<String>>;

    /// 移除列表中第一个等于value的元素，返回移除个数
    async fn list_remove(&self, key: &str, value: &str) -> OrchestratorResult<u64>;

    async fn list_len(&self, key: &str) -> OrchestratorResult<u64>;

    async fn keys_with_prefix(&self, prefix: &str) -> OrchestratorResult<Vec<String>>;
}
