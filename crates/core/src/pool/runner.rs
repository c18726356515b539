//! Worker pool runtime.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{BusError, Delivery, MessageBus, Subscription};
use crate::metrics;
use crate::progress::ProgressTracker;
use crate::task::{topics, FailedTask, Outgoing, Task, TaskKind};

use super::config::PoolConfig;
use super::handler::{HandlerError, TaskContext, TaskHandler};
use super::types::{PoolStats, PoolStatus};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Consumes one task kind's topic with bounded concurrency.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    group: String,
    poll_interval: Duration,
    semaphore: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

/// State every in-flight task needs once it leaves the poll loop.
struct PoolShared {
    name: String,
    kind: TaskKind,
    config: PoolConfig,
    bus: Arc<dyn MessageBus>,
    handler: Arc<dyn TaskHandler>,
    tracker: Option<ProgressTracker>,
    stats: PoolStats,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, bus: Arc<dyn MessageBus>, handler: Arc<dyn TaskHandler>) -> Self {
        let kind = handler.kind();
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency_limit)),
            group: format!("{}-workers", kind.as_str()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_tx,
            loop_handle: Mutex::new(None),
            shared: Arc::new(PoolShared {
                name: format!("{}-pool", kind.as_str()),
                kind,
                config,
                bus,
                handler,
                tracker: None,
                stats: PoolStats::default(),
            }),
        }
    }

    /// Record per-kind completions, retries and failures in the run stats.
    /// Must be called before `start`.
    pub fn with_run_stats(mut self, tracker: ProgressTracker) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.tracker = Some(tracker);
        }
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Override the consumer group. Pools sharing a group split the topic.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn kind(&self) -> TaskKind {
        self.shared.kind
    }

    /// Subscribe and spawn the poll loop.
    pub async fn start(&self) -> Result<(), BusError> {
        if self.shared.stats.running.swap(true, Ordering::SeqCst) {
            warn!(pool = %self.shared.name, "Worker pool already running");
            return Ok(());
        }

        let subscription = match self
            .shared
            .bus
            .subscribe(self.shared.kind.topic(), &self.group)
            .await
        {
            Ok(sub) => sub,
            Err(e) => {
                self.shared.stats.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        info!(
            pool = %self.shared.name,
            topic = self.shared.kind.topic(),
            concurrency = self.shared.config.concurrency_limit,
            "Starting worker pool"
        );

        let handle = self.spawn_poll_loop(subscription);
        *self.loop_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop taking new deliveries. Handlers already running finish on their
    /// own; anything unacknowledged is redelivered after the visibility timeout.
    pub async fn stop(&self) {
        if !self.shared.stats.running.swap(false, Ordering::SeqCst) {
            debug!(pool = %self.shared.name, "Worker pool not running");
            return;
        }

        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.loop_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(pool = %self.shared.name, "Poll loop ended abnormally: {}", e);
            }
        }
        info!(pool = %self.shared.name, "Worker pool stopped");
    }

    pub fn status(&self) -> PoolStatus {
        self.shared.stats.to_status(
            &self.shared.name,
            self.shared.kind,
            self.shared.config.concurrency_limit,
        )
    }

    fn spawn_poll_loop(&self, mut subscription: Box<dyn Subscription>) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let semaphore = Arc::clone(&self.semaphore);
        let poll_interval = self.poll_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                // A permit first, so a claimed message never waits for capacity.
                let permit = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let polled = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    polled = subscription.poll(poll_interval) => polled,
                };

                match polled {
                    Ok(Some(delivery)) => {
                        tokio::spawn(Arc::clone(&shared).process(delivery, permit));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(pool = %shared.name, "Poll failed, backing off: {}", e);
                        drop(permit);
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            }
            debug!(pool = %shared.name, "Poll loop exited");
        })
    }
}

impl PoolShared {
    fn decode(&self, delivery: &Delivery) -> Result<Task, String> {
        let task: Task = serde_json::from_str(&delivery.message.payload)
            .map_err(|e| format!("undecodable payload: {}", e))?;
        if task.kind() != self.kind {
            return Err(format!(
                "{} task does not belong on {}",
                task.kind(),
                delivery.message.topic
            ));
        }
        Ok(task)
    }

    async fn process(self: Arc<Self>, delivery: Delivery, permit: OwnedSemaphorePermit) {
        let task = match self.decode(&delivery) {
            Ok(task) => task,
            Err(reason) => {
                drop(permit);
                self.reject_malformed(&delivery, &reason).await;
                return;
            }
        };

        let ctx = TaskContext {
            attempt: task.attempt,
            max_attempts: self.config.max_attempts,
            delivery_count: delivery.delivery_count,
        };

        debug!(
            pool = %self.name,
            task = %task.label(),
            attempt = task.attempt,
            delivery = delivery.delivery_count,
            "Handling task"
        );

        self.stats.active.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let result = self.handler.handle(&task, &ctx).await;
        metrics::HANDLER_DURATION
            .with_label_values(&[self.kind.as_str()])
            .observe(started.elapsed().as_secs_f64());
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        drop(permit);

        match result {
            Ok(outgoing) => self.complete(&delivery, &task, outgoing).await,
            Err(err) if err.is_retryable() && ctx.has_attempts_left() => {
                self.retry(&delivery, &task, &err).await
            }
            Err(err) => self.fail(&delivery, &task, &err).await,
        }
    }

    async fn complete(&self, delivery: &Delivery, task: &Task, outgoing: Vec<Outgoing>) {
        for out in &outgoing {
            if let Err(e) = self
                .bus
                .publish(out.topic, &out.key, out.payload.clone())
                .await
            {
                // Outputs are idempotent downstream; redelivery republishes them.
                warn!(
                    pool = %self.name,
                    task = %task.label(),
                    "Publishing to {} failed, leaving delivery for redelivery: {}",
                    out.topic,
                    e
                );
                return;
            }
        }

        if !self.ack(delivery).await {
            return;
        }

        self.stats.total_processed.fetch_add(1, Ordering::SeqCst);
        metrics::TASKS_PROCESSED
            .with_label_values(&[self.kind.as_str(), "success"])
            .inc();
        if let Some(tracker) = &self.tracker {
            if let Err(e) = tracker.bump_completed(self.kind).await {
                debug!(pool = %self.name, "Run stats not updated: {}", e);
            }
        }
        debug!(pool = %self.name, task = %task.label(), outputs = outgoing.len(), "Task completed");
    }

    async fn retry(&self, delivery: &Delivery, task: &Task, err: &HandlerError) {
        let delay = self.config.backoff(task.attempt);
        warn!(
            pool = %self.name,
            task = %task.label(),
            attempt = task.attempt + 1,
            max_attempts = self.config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Task failed, retrying: {}",
            err
        );

        tokio::time::sleep(delay).await;

        let next = task.next_attempt();
        let republished = match Outgoing::task(&next) {
            Ok(out) => self.bus.publish(out.topic, &out.key, out.payload).await,
            Err(e) => {
                error!(pool = %self.name, task = %task.label(), "Could not encode retry: {}", e);
                return;
            }
        };
        if let Err(e) = republished {
            warn!(pool = %self.name, task = %task.label(), "Requeue failed, leaving delivery for redelivery: {}", e);
            return;
        }

        if !self.ack(delivery).await {
            return;
        }

        self.stats.total_retried.fetch_add(1, Ordering::SeqCst);
        metrics::TASK_RETRIES
            .with_label_values(&[self.kind.as_str()])
            .inc();
        if let Some(tracker) = &self.tracker {
            if let Err(e) = tracker.bump_retried(self.kind).await {
                debug!(pool = %self.name, "Run stats not updated: {}", e);
            }
        }
    }

    async fn fail(&self, delivery: &Delivery, task: &Task, err: &HandlerError) {
        let failed = FailedTask::from_task(task, err.failure_kind(), err.to_string());
        match err {
            HandlerError::InvariantViolation(_) => error!(
                pool = %self.name,
                task = %task.label(),
                "Invariant violated, routing to error topic: {}",
                err
            ),
            _ => warn!(
                pool = %self.name,
                task = %task.label(),
                attempts = failed.attempts,
                "Task failed permanently, routing to error topic: {}",
                err
            ),
        }

        if !self.route_to_errors(delivery, &task.bill_id, &failed).await {
            return;
        }

        self.stats.total_failed.fetch_add(1, Ordering::SeqCst);
        metrics::TASKS_PROCESSED
            .with_label_values(&[self.kind.as_str(), "failed"])
            .inc();
        if let Some(tracker) = &self.tracker {
            if let Err(e) = tracker.bump_failed(self.kind).await {
                debug!(pool = %self.name, "Run stats not updated: {}", e);
            }
        }
    }

    async fn reject_malformed(&self, delivery: &Delivery, reason: &str) {
        warn!(
            pool = %self.name,
            message_id = delivery.message.id,
            "Malformed task, routing to error topic: {}",
            reason
        );
        let failed = FailedTask::malformed(&delivery.message.topic, &delivery.message.payload, reason);
        if self
            .route_to_errors(delivery, &delivery.message.key, &failed)
            .await
        {
            self.stats.total_failed.fetch_add(1, Ordering::SeqCst);
            metrics::TASKS_PROCESSED
                .with_label_values(&[self.kind.as_str(), "malformed"])
                .inc();
        }
    }

    /// Publish to the error topic, then ack. False leaves the delivery to be
    /// redelivered.
    async fn route_to_errors(&self, delivery: &Delivery, key: &str, failed: &FailedTask) -> bool {
        let payload = match serde_json::to_string(failed) {
            Ok(payload) => payload,
            Err(e) => {
                error!(pool = %self.name, "Could not encode failed task: {}", e);
                return false;
            }
        };
        if let Err(e) = self.bus.publish(topics::PIPELINE_ERRORS, key, payload).await {
            warn!(pool = %self.name, "Error topic publish failed, leaving delivery for redelivery: {}", e);
            return false;
        }
        metrics::ERROR_TOPIC_MESSAGES
            .with_label_values(&[self.kind.as_str(), failed.failure.as_str()])
            .inc();
        self.ack(delivery).await
    }

    async fn ack(&self, delivery: &Delivery) -> bool {
        match self.bus.ack(&delivery.ack).await {
            Ok(()) => true,
            Err(e) => {
                warn!(pool = %self.name, message_id = delivery.message.id, "Ack failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use crate::bus::{BusConfig, InMemoryBus};
    use crate::task::FailureKind;

    /// Fails with the given error for the first `failures` attempts.
    struct ScriptedHandler {
        failures: u32,
        error: fn() -> HandlerError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TaskHandler for ScriptedHandler {
        fn kind(&self) -> TaskKind {
            TaskKind::LinkCheck
        }

        async fn handle(&self, task: &Task, _ctx: &TaskContext) -> Result<Vec<Outgoing>, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if task.attempt < self.failures {
                return Err((self.error)());
            }
            Ok(vec![Outgoing {
                topic: topics::LINK_CHECK_RESULTS,
                key: task.bill_id.clone(),
                payload: "done".to_string(),
            }])
        }
    }

    fn fast_pool(bus: &InMemoryBus, failures: u32, error: fn() -> HandlerError) -> (WorkerPool, Arc<ScriptedHandler>) {
        let handler = Arc::new(ScriptedHandler {
            failures,
            error,
            calls: AtomicU32::new(0),
        });
        let pool = WorkerPool::new(
            PoolConfig::default().with_max_attempts(3).with_backoff(5, 20),
            Arc::new(bus.clone()),
            handler.clone(),
        )
        .with_poll_interval(Duration::from_millis(10));
        (pool, handler)
    }

    fn test_bus() -> InMemoryBus {
        InMemoryBus::new(BusConfig {
            visibility_timeout_ms: 5_000,
            poll_interval_ms: 10,
        })
    }

    async fn publish_link_task(bus: &InMemoryBus) {
        let out = Outgoing::task(&Task::link_check("H.R.1", "https://example.com")).unwrap();
        bus.publish(out.topic, &out.key, out.payload).await.unwrap();
    }

    async fn wait_for(bus: &InMemoryBus, topic: &str, count: usize) {
        for _ in 0..200 {
            if bus.messages(topic).len() >= count {
                // let the delivery settle (ack and stats) after the publish
                tokio::time::sleep(Duration::from_millis(30)).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} messages on {}", count, topic);
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let bus = test_bus();
        let (pool, handler) = fast_pool(&bus, 2, || HandlerError::transient("flaky"));
        pool.start().await.unwrap();
        publish_link_task(&bus).await;

        wait_for(&bus, topics::LINK_CHECK_RESULTS, 1).await;
        pool.stop().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(bus.messages(topics::PIPELINE_ERRORS).is_empty());
        // original plus two requeues
        assert_eq!(bus.messages(topics::LINK_CHECK_TASKS).len(), 3);

        let status = pool.status();
        assert_eq!(status.total_processed, 1);
        assert_eq!(status.total_retried, 2);
        assert_eq!(status.total_failed, 0);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_exhausted_task_goes_to_error_topic_once() {
        let bus = test_bus();
        let (pool, handler) = fast_pool(&bus, u32::MAX, || HandlerError::transient("down"));
        pool.start().await.unwrap();
        publish_link_task(&bus).await;

        wait_for(&bus, topics::PIPELINE_ERRORS, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        pool.stop().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        let errors = bus.messages(topics::PIPELINE_ERRORS);
        assert_eq!(errors.len(), 1);

        let failed: FailedTask = serde_json::from_str(&errors[0].payload).unwrap();
        assert_eq!(failed.failure, FailureKind::Exhausted);
        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.bill_id.as_deref(), Some("H.R.1"));
        assert!(bus.messages(topics::LINK_CHECK_RESULTS).is_empty());
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retries() {
        let bus = test_bus();
        let (pool, handler) = fast_pool(&bus, u32::MAX, || HandlerError::permanent("no such bill"));
        pool.start().await.unwrap();
        publish_link_task(&bus).await;

        wait_for(&bus, topics::PIPELINE_ERRORS, 1).await;
        pool.stop().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let failed: FailedTask =
            serde_json::from_str(&bus.messages(topics::PIPELINE_ERRORS)[0].payload).unwrap();
        assert_eq!(failed.failure, FailureKind::Permanent);
        assert_eq!(failed.attempts, 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_goes_straight_to_errors() {
        let bus = test_bus();
        let (pool, handler) = fast_pool(&bus, 0, || HandlerError::transient("unused"));
        pool.start().await.unwrap();

        bus.publish(topics::LINK_CHECK_TASKS, "H.R.1", "{not json".to_string())
            .await
            .unwrap();
        // right shape, wrong topic
        let draft = Outgoing::task(&Task::draft("H.R.1")).unwrap();
        bus.publish(topics::LINK_CHECK_TASKS, "H.R.1", draft.payload)
            .await
            .unwrap();

        wait_for(&bus, topics::PIPELINE_ERRORS, 2).await;
        pool.stop().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        for message in bus.messages(topics::PIPELINE_ERRORS) {
            let failed: FailedTask = serde_json::from_str(&message.payload).unwrap();
            assert_eq!(failed.failure, FailureKind::Malformed);
            assert!(failed.raw_payload.is_some());
        }
        assert_eq!(bus.pending(topics::LINK_CHECK_TASKS, "link_check-workers"), 0);
    }

    #[tokio::test]
    async fn test_start_twice_is_harmless() {
        let bus = test_bus();
        let (pool, _) = fast_pool(&bus, 0, || HandlerError::transient("unused"));
        pool.start().await.unwrap();
        pool.start().await.unwrap();
        assert!(pool.status().running);
        assert_eq!(pool.status().topic, topics::LINK_CHECK_TASKS);
        pool.stop().await;
        pool.stop().await;
    }
}
