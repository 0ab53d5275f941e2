use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use orchestrator_core::config::MessagingSection;
use orchestrator_core::models::Message;
use orchestrator_core::traits::{LifecycleEvent, Notifier, SharedStore};
use orchestrator_core::OrchestratorResult;

fn body_key(message_id: &str) -> String {
    format!("msg:{message_id}")
}

fn queue_key(recipient: &str) -> String {
    format!("queue:{recipient}")
}

fn ack_key(recipient: &str, message_id: &str) -> String {
    format!("ack:{recipient}:{message_id}")
}

/// 组件间异步通信协议。
///
/// 消息体按ttl存储，消息id追加到接收方的FIFO队列；
/// 读取只窥视不移除，确认时才把id弹出队列并删除消息体，
/// 由此获得至少一次投递语义。
pub struct CommunicationProtocol {
    store: Arc<dyn SharedStore>,
    config: MessagingSection,
    notifier: Option<Arc<dyn Notifier>>,
}

impl CommunicationProtocol {
    pub fn new(store: Arc<dyn SharedStore>, config: MessagingSection) -> Self {
        Self {
            store,
            config,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn message_ttl(&self, message: &Message) -> Duration {
        let seconds = if message.ttl_seconds > 0 {
            message.ttl_seconds
        } else {
            self.config.default_ttl_seconds
        };
        Duration::from_secs(seconds)
    }

    /// 存储消息体并入队，按接收方保持FIFO顺序
    pub async fn send(&self, message: &Message) -> OrchestratorResult<()> {
        self.store
            .set(
                &body_key(&message.id),
                &message.serialize()?,
                Some(self.message_ttl(message)),
            )
            .await?;
        let depth = self
            .store
            .list_push_back(&queue_key(&message.recipient), &message.id)
            .await?;
        debug!(
            "消息 {} ({}) 已投递给 {}，当前队列深度 {}",
            message.id, message.message_type, message.recipient, depth
        );
        Ok(())
    }

    /// 按入队顺序读取至多limit条消息，不移除。
    /// 消息体已过期的id顺带出队并发出过期事件。
    pub async fn receive(&self, recipient: &str, limit: usize) -> OrchestratorResult<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let queue = queue_key(recipient);
        let ids = self.store.list_range(&queue, 0, -1).await?;
        let mut messages = Vec::new();
        for id in ids {
            if messages.len() >= limit {
                break;
            }
            match self.store.get(&body_key(&id)).await? {
                Some(raw) => {
                    let message = Message::deserialize(&raw)
                        .map_err(orchestrator_core::OrchestratorError::from)?;
                    messages.push(message);
                }
                None => {
                    // 消息体过期，队列里的悬挂id直接清除
                    self.store.list_remove(&queue, &id).await?;
                    warn!("消息 {} 已过期，从 {} 的队列中移除", id, recipient);
                    if let Some(notifier) = &self.notifier {
                        notifier
                            .notify(LifecycleEvent::MessageExpired {
                                message_id: id.clone(),
                                recipient: recipient.to_string(),
                                timestamp: Utc::now(),
                            })
                            .await;
                    }
                }
            }
        }
        Ok(messages)
    }

    /// 确认消息：记录ack、弹出队列中的id并删除消息体
    pub async fn acknowledge(&self, message_id: &str, recipient: &str) -> OrchestratorResult<bool> {
        self.store
            .set(
                &ack_key(recipient, message_id),
                &Utc::now().to_rfc3339(),
                Some(Duration::from_secs(self.config.default_ttl_seconds)),
            )
            .await?;
        let removed = self
            .store
            .list_remove(&queue_key(recipient), message_id)
            .await?;
        self.store.delete(&body_key(message_id)).await?;
        debug!("消息 {} 被 {} 确认", message_id, recipient);
        Ok(removed > 0)
    }

    pub async fn is_acknowledged(
        &self,
        message_id: &str,
        recipient: &str,
    ) -> OrchestratorResult<bool> {
        Ok(self
            .store
            .get(&ack_key(recipient, message_id))
            .await?
            .is_some())
    }

    pub async fn queue_depth(&self, recipient: &str) -> OrchestratorResult<u64> {
        self.store.list_len(&queue_key(recipient)).await
    }

    /// 向多个接收方广播，每个接收方收到独立id的副本
    pub async fn broadcast(
        &self,
        message: &Message,
        recipients: &[String],
    ) -> OrchestratorResult<Vec<String>> {
        let mut message_ids = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let copy = message.for_recipient(recipient);
            self.send(&copy).await?;
            message_ids.push(copy.id);
        }
        info!(
            "消息 {} 广播给 {} 个接收方",
            message.message_type,
            recipients.len()
        );
        Ok(message_ids)
    }

    /// 发送并等待确认，确认超时则线性退避后重发。
    /// 真正轮询ack记录，只有所有重试都未确认才返回false。
    pub async fn send_with_guaranteed_delivery(
        &self,
        message: &Message,
        max_retries: u32,
    ) -> OrchestratorResult<bool> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.send(message).await?;
            if self.wait_for_ack(&message.id, &message.recipient).await? {
                debug!("消息 {} 在第 {} 次发送后被确认", message.id, attempt);
                return Ok(true);
            }
            if attempt > max_retries {
                warn!(
                    "消息 {} 经过 {} 次发送仍未确认，放弃",
                    message.id, attempt
                );
                return Ok(false);
            }
            // 线性退避：1000ms × 已尝试次数
            tokio::time::sleep(Duration::from_millis(
                self.retry_backoff_ms().saturating_mul(attempt as u64),
            ))
            .await;
        }
    }

    fn retry_backoff_ms(&self) -> u64 {
        1000
    }

    async fn wait_for_ack(&self, message_id: &str, recipient: &str) -> OrchestratorResult<bool> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.ack_timeout_ms);
        let poll_interval = Duration::from_millis(self.config.ack_poll_interval_ms.max(1));
        loop {
            if self.is_acknowledged(message_id, recipient).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
