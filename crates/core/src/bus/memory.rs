//! In-process message bus.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::config::BusConfig;
use super::traits::{AckHandle, BusError, Delivery, Message, MessageBus, MessageId, Subscription};

/// In-process bus with per-group cursors and visibility-timeout redelivery.
///
/// Topics are append-only logs kept for the life of the bus, so a group that
/// subscribes late still sees everything published before it joined.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

struct Inner {
    config: BusConfig,
    state: Mutex<BusState>,
    notify: Notify,
}

#[derive(Default)]
struct BusState {
    topics: HashMap<String, TopicState>,
}

#[derive(Default)]
struct TopicState {
    log: Vec<Message>,
    groups: HashMap<String, GroupState>,
}

#[derive(Default)]
struct GroupState {
    /// Next message never handed to this group.
    cursor: usize,
    in_flight: BTreeMap<MessageId, InFlight>,
}

struct InFlight {
    deadline: Instant,
    deliveries: u32,
}

enum Claim {
    Delivered(Delivery),
    Empty { next_expiry: Option<Instant> },
}

impl InMemoryBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(BusState::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Snapshot of every message ever published to `topic`.
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.inner
            .lock()
            .map(|state| {
                state
                    .topics
                    .get(topic)
                    .map(|t| t.log.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Messages on `topic` that `group` has not acknowledged yet.
    pub fn pending(&self, topic: &str, group: &str) -> usize {
        self.inner
            .lock()
            .map(|state| match state.topics.get(topic) {
                Some(t) => match t.groups.get(group) {
                    Some(g) => t.log.len() - g.cursor + g.in_flight.len(),
                    None => t.log.len(),
                },
                None => 0,
            })
            .unwrap_or_default()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, BusState>, BusError> {
        self.state
            .lock()
            .map_err(|_| BusError::Unavailable("bus state lock poisoned".to_string()))
    }

    fn visibility(&self) -> Duration {
        Duration::from_millis(self.config.visibility_timeout_ms)
    }

    fn claim(&self, topic: &str, group: &str) -> Result<Claim, BusError> {
        let mut state = self.lock()?;
        let now = Instant::now();
        let visibility = self.visibility();

        let TopicState { log, groups } = state.topics.entry(topic.to_string()).or_default();
        let group_state = groups.entry(group.to_string()).or_default();

        // Expired claims go out again before anything new.
        let expired = group_state
            .in_flight
            .iter()
            .find(|(_, f)| f.deadline <= now)
            .map(|(id, _)| *id);

        let (id, deliveries) = if let Some(id) = expired {
            let Some(entry) = group_state.in_flight.get_mut(&id) else {
                return Ok(Claim::Empty { next_expiry: None });
            };
            entry.deliveries += 1;
            entry.deadline = now + visibility;
            debug!(topic, group, message_id = id, deliveries = entry.deliveries, "Redelivering message");
            (id, entry.deliveries)
        } else if group_state.cursor < log.len() {
            let id = group_state.cursor as MessageId;
            group_state.cursor += 1;
            group_state.in_flight.insert(
                id,
                InFlight {
                    deadline: now + visibility,
                    deliveries: 1,
                },
            );
            (id, 1)
        } else {
            let next_expiry = group_state.in_flight.values().map(|f| f.deadline).min();
            return Ok(Claim::Empty { next_expiry });
        };

        let message = log[id as usize].clone();
        Ok(Claim::Delivered(Delivery {
            ack: AckHandle {
                topic: topic.to_string(),
                group: group.to_string(),
                message_id: id,
            },
            message,
            delivery_count: deliveries,
        }))
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: String,
    ) -> Result<MessageId, BusError> {
        let id = {
            let mut state = self.inner.lock()?;
            let topic_state = state.topics.entry(topic.to_string()).or_default();
            let id = topic_state.log.len() as MessageId;
            topic_state.log.push(Message {
                id,
                topic: topic.to_string(),
                key: key.to_string(),
                payload,
                published_at: Utc::now(),
            });
            id
        };
        self.inner.notify.notify_waiters();
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn Subscription>, BusError> {
        {
            let mut state = self.inner.lock()?;
            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .groups
                .entry(group.to_string())
                .or_default();
        }
        Ok(Box::new(InMemorySubscription {
            inner: Arc::clone(&self.inner),
            topic: topic.to_string(),
            group: group.to_string(),
        }))
    }

    async fn ack(&self, handle: &AckHandle) -> Result<(), BusError> {
        let mut state = self.inner.lock()?;
        let removed = state
            .topics
            .get_mut(&handle.topic)
            .and_then(|t| t.groups.get_mut(&handle.group))
            .and_then(|g| g.in_flight.remove(&handle.message_id));
        if removed.is_none() {
            debug!(
                topic = %handle.topic,
                group = %handle.group,
                message_id = handle.message_id,
                "Ack for message that is not in flight"
            );
        }
        Ok(())
    }
}

struct InMemorySubscription {
    inner: Arc<Inner>,
    topic: String,
    group: String,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn poll(&mut self, wait: Duration) -> Result<Option<Delivery>, BusError> {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking so a publish in between is not missed.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_expiry = match self.inner.claim(&self.topic, &self.group)? {
                Claim::Delivered(delivery) => return Ok(Some(delivery)),
                Claim::Empty { next_expiry } => next_expiry,
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let wake_at = next_expiry.map_or(deadline, |expiry| expiry.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }
}
