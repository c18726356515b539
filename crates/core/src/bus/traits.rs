use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Position of a message within its topic.
pub type MessageId = u64;

#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The broker could not be reached; callers retry or leave the message
    /// unacknowledged for redelivery.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// A message as stored on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    pub key: String,
    pub payload: String,
    pub published_at: DateTime<Utc>,
}

/// Identifies one claimed message for acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHandle {
    pub topic: String,
    pub group: String,
    pub message_id: MessageId,
}

/// A claimed message plus what is needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub ack: AckHandle,
    /// 1 on first delivery, higher on redelivery.
    pub delivery_count: u32,
}

/// Publish/subscribe broker client.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Append a message to the named topic. Never waits on consumers.
    async fn publish(&self, topic: &str, key: &str, payload: String)
        -> Result<MessageId, BusError>;

    /// Open a subscription that yields messages not yet acknowledged by `group`.
    async fn subscribe(&self, topic: &str, group: &str)
        -> Result<Box<dyn Subscription>, BusError>;

    /// Acknowledge a delivery. Acknowledging twice is a no-op.
    async fn ack(&self, handle: &AckHandle) -> Result<(), BusError>;
}

/// A restartable stream of deliveries for one consumer group.
#[async_trait]
pub trait Subscription: Send {
    fn topic(&self) -> &str;

    /// Wait up to `wait` for the next delivery. `Ok(None)` means nothing
    /// arrived in time; a zero wait only checks what is already available.
    async fn poll(&mut self, wait: Duration) -> Result<Option<Delivery>, BusError>;
}
