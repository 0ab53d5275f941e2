use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_MESSAGE_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

/// 组件间异步通信的单条消息，至少一次投递，超过ttl后过期
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub message_type: String,
    pub sender: String,
    pub recipient: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub priority: MessagePriority,
    pub ttl_seconds: u64,
}

impl Message {
    pub fn new(
        message_type: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type: message_type.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
            priority: MessagePriority::Normal,
            ttl_seconds: DEFAULT_MESSAGE_TTL_SECONDS,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// 广播时以新id复制给另一个接收方
    pub fn for_recipient(&self, recipient: &str) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4().to_string();
        copy.recipient = recipient.to_string();
        copy
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp > chrono::Duration::seconds(self.ttl_seconds as i64)
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
