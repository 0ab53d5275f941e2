use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use orchestrator_core::traits::{LifecycleEvent, Notifier};

use crate::metrics::MetricsCollector;

/// Log-only notifier; the default when no push channel is wired up.
#[derive(Debug, Default)]
pub struct TracingNotifier {
    metrics: MetricsCollector,
}

impl TracingNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: LifecycleEvent) {
        self.metrics.record_event(event.name());
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = event.name(), "{}", payload),
            Err(_) => info!(event = event.name(), "lifecycle event"),
        }
    }
}

/// Fan-out notifier over a tokio broadcast channel. Slow or absent
/// subscribers lose events instead of blocking the core.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<LifecycleEvent>,
    metrics: MetricsCollector,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: LifecycleEvent) {
        self.metrics.record_event(event.name());
        if self.sender.send(event).is_err() {
            debug!("no lifecycle event subscribers, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let notifier = BroadcastNotifier::new(16);
        let mut receiver = notifier.subscribe();

        notifier
            .notify(LifecycleEvent::WorkflowStarted {
                execution_id: "exec-1".to_string(),
                workflow_id: "wf-1".to_string(),
                tenant_id: "tenant-a".to_string(),
                timestamp: Utc::now(),
            })
            .await;

        let event = receiver.recv().await.expect("event delivered");
        assert_eq!(event.name(), "workflow_started");
    }

    #[tokio::test]
    async fn test_notify_without_subscribers_does_not_block() {
        let notifier = BroadcastNotifier::new(1);
        // 没有订阅者时也必须立即返回
        notifier
            .notify(LifecycleEvent::MessageExpired {
                message_id: "m-1".to_string(),
                recipient: "ui".to_string(),
                timestamp: Utc::now(),
            })
            .await;
    }
}
