//! Run controller.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bus::{MessageBus, Subscription};
use crate::metrics;
use crate::output::{Article, OutputCollector, RunSummary};
use crate::progress::{BillProgress, DraftStatus, ProgressTracker};
use crate::task::{topics, BillId, FailedTask, Outgoing, Task, QUESTIONS, QUESTION_COUNT};

use super::config::ControllerConfig;
use super::types::{
    BillFailure, BillSnapshot, ControllerError, IncompleteBill, ProgressSnapshot, RunPhase,
    RunReport,
};

const ERROR_GROUP: &str = "controller";
const FINAL_LOAD_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    Finished,
    TimedOut,
    Stopped,
}

/// Error-topic messages seen so far, grouped by bill.
#[derive(Default)]
struct FailureLog {
    by_bill: BTreeMap<String, Vec<FailedTask>>,
    /// Bills with a failure whose record is not marked failed yet.
    unmarked: BTreeSet<String>,
    unattributed: Vec<FailedTask>,
}

impl FailureLog {
    fn record(&mut self, failed: FailedTask) {
        match failed.bill_id.clone() {
            Some(bill_id) => {
                self.unmarked.insert(bill_id.clone());
                self.by_bill.entry(bill_id).or_default().push(failed);
            }
            None => self.unattributed.push(failed),
        }
    }

    fn reason(&self, bill_id: &str) -> String {
        self.by_bill
            .get(bill_id)
            .and_then(|errors| errors.first())
            .map(|failed| {
                let label = failed
                    .task
                    .as_ref()
                    .map(Task::label)
                    .unwrap_or_else(|| failed.source_topic.clone());
                format!("{} {}: {}", label, failed.failure.as_str(), failed.error)
            })
            .unwrap_or_else(|| "unknown failure".to_string())
    }

    /// Move every pending failure into the bill records. Bills the store
    /// rejects stay pending for the next pass.
    async fn mark(&mut self, tracker: &ProgressTracker) {
        let pending: Vec<String> = self.unmarked.iter().cloned().collect();
        for bill_id in pending {
            let reason = self.reason(&bill_id);
            match tracker.fail_bill(&bill_id, &reason).await {
                Ok(_) => {
                    self.unmarked.remove(&bill_id);
                }
                Err(e) => {
                    debug!(bill_id, error = %e, "Could not mark bill failed yet");
                }
            }
        }
    }
}

/// Seeds the task graph for every target bill, watches the store until each
/// bill is complete or failed (or the deadline passes), then writes the
/// output set and returns the run report.
pub struct Controller {
    config: ControllerConfig,
    tracker: ProgressTracker,
    bus: Arc<dyn MessageBus>,
    output: Arc<dyn OutputCollector>,
    snapshot: Arc<RwLock<ProgressSnapshot>>,
    running: AtomicBool,
    stop_requested: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        tracker: ProgressTracker,
        bus: Arc<dyn MessageBus>,
        output: Arc<dyn OutputCollector>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            tracker,
            bus,
            output,
            snapshot: Arc::new(RwLock::new(ProgressSnapshot::default())),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Shared handle to the latest snapshot, for the status API.
    pub fn snapshot_handle(&self) -> Arc<RwLock<ProgressSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// End the wait loop early. The run still writes what it has.
    pub fn stop(&self) {
        info!("Stopping controller");
        self.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Execute one full run.
    pub async fn run(&self) -> Result<RunReport, ControllerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ControllerError::AlreadyRunning);
        }
        self.stop_requested.store(false, Ordering::SeqCst);
        let result = self.run_inner().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self) -> Result<RunReport, ControllerError> {
        let bills = self.parse_bills()?;
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.run_timeout_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *self.snapshot.write().await = ProgressSnapshot {
            phase: RunPhase::Seeding,
            started_at: Some(Utc::now()),
            bills_total: bills.len(),
            tasks_total: bills.len() as i64 * (QUESTION_COUNT as i64 + 1),
            store_connected: true,
            ..Default::default()
        };

        info!(
            bills = bills.len(),
            timeout_secs = self.config.run_timeout_secs,
            "Starting run"
        );

        let mut errors = self.bus.subscribe(topics::PIPELINE_ERRORS, ERROR_GROUP).await?;

        self.with_reconnect("reset run stats", deadline, || async {
            self.tracker.reset_run_stats().await.map_err(ControllerError::from)
        })
        .await?;
        for bill in &bills {
            self.with_reconnect("seed bill", deadline, || self.seed_bill(bill))
                .await?;
        }
        self.snapshot.write().await.phase = RunPhase::Running;

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let report_interval = Duration::from_millis(self.config.report_interval_ms);
        let reconnect_delay = Duration::from_millis(self.config.reconnect_delay_ms);

        let mut failures = FailureLog::default();
        let mut last_report: Option<Instant> = None;

        let end = loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                break RunEnd::Stopped;
            }

            self.drain_errors(errors.as_mut(), &mut failures).await;

            let wait = match self.refresh(&bills, started).await {
                Ok(all_done) => {
                    if last_report.map_or(true, |at| at.elapsed() >= report_interval) {
                        self.report().await;
                        last_report = Some(Instant::now());
                    }
                    if all_done {
                        break RunEnd::Finished;
                    }
                    poll_interval
                }
                Err(e) => {
                    warn!(error = %e, "State store unavailable, pausing progress reports");
                    self.snapshot.write().await.store_connected = false;
                    reconnect_delay
                }
            };

            let now = Instant::now();
            if now >= deadline {
                break RunEnd::TimedOut;
            }

            tokio::select! {
                _ = shutdown_rx.recv() => break RunEnd::Stopped,
                _ = tokio::time::sleep(wait.min(deadline - now)) => {}
            }
        };

        // Pick up failures that landed after the last poll.
        self.drain_errors(errors.as_mut(), &mut failures).await;

        self.finish(&bills, started, end, failures).await
    }

    fn parse_bills(&self) -> Result<Vec<BillId>, ControllerError> {
        let mut seen = BTreeSet::new();
        let mut bills = Vec::new();
        for raw in &self.config.bills {
            let bill: BillId = raw.parse()?;
            if seen.insert(bill.as_str().to_string()) {
                bills.push(bill);
            } else {
                warn!(bill_id = %bill, "Duplicate bill in target list, ignoring");
            }
        }
        Ok(bills)
    }

    /// Fresh record plus one question task per question.
    async fn seed_bill(&self, bill: &BillId) -> Result<(), ControllerError> {
        self.tracker.reset(bill.as_str()).await?;
        for question in QUESTIONS.iter() {
            let task = Task::question(bill.as_str(), question.index, question.text);
            let out = Outgoing::task(&task)?;
            self.bus.publish(out.topic, &out.key, out.payload).await?;
        }
        debug!(bill_id = %bill, tasks = QUESTIONS.len(), "Seeded bill");
        Ok(())
    }

    /// Retry `op` while it fails with store or broker unavailability.
    async fn with_reconnect<T, F, Fut>(
        &self,
        what: &str,
        deadline: Instant,
        mut op: F,
    ) -> Result<T, ControllerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ControllerError>>,
    {
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_connectivity(&e) && Instant::now() < deadline => {
                    warn!(operation = what, error = %e, "Collaborator unavailable, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.reconnect_delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn drain_errors(&self, subscription: &mut dyn Subscription, failures: &mut FailureLog) {
        loop {
            let delivery = match subscription.poll(Duration::ZERO).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Could not read error topic");
                    break;
                }
            };

            match serde_json::from_str::<FailedTask>(&delivery.message.payload) {
                Ok(failed) => {
                    warn!(
                        bill_id = failed.bill_id.as_deref().unwrap_or("-"),
                        source = %failed.source_topic,
                        failure = failed.failure.as_str(),
                        attempts = failed.attempts,
                        error = %failed.error,
                        "Task reached the error topic"
                    );
                    failures.record(failed);
                }
                Err(e) => {
                    warn!(error = %e, "Undecodable error-topic message");
                    failures.record(FailedTask::malformed(
                        topics::PIPELINE_ERRORS,
                        &delivery.message.payload,
                        e.to_string(),
                    ));
                }
            }

            if let Err(e) = self.bus.ack(&delivery.ack).await {
                warn!(error = %e, "Failed to ack error-topic message");
            }
        }

        failures.mark(&self.tracker).await;
    }

    async fn load_all(&self, bills: &[BillId]) -> Result<Vec<BillProgress>, ControllerError> {
        let mut records = Vec::with_capacity(bills.len());
        for bill in bills {
            records.push(self.tracker.load(bill.as_str()).await?);
        }
        Ok(records)
    }

    /// Reload every record into the snapshot. Returns whether every bill is
    /// complete or failed.
    async fn refresh(&self, bills: &[BillId], started: Instant) -> Result<bool, ControllerError> {
        let records = self.load_all(bills).await?;
        let stats = self.tracker.run_stats().await?;

        let links_known: i64 = records
            .iter()
            .map(|p| p.links_total.unwrap_or(p.links.len() as i64))
            .sum();

        let mut snapshot = self.snapshot.write().await;
        snapshot.elapsed_secs = started.elapsed().as_secs_f64();
        snapshot.store_connected = true;
        snapshot.bills_complete = records
            .iter()
            .filter(|p| p.draft_status == DraftStatus::Complete)
            .count();
        snapshot.bills_failed = records
            .iter()
            .filter(|p| p.draft_status == DraftStatus::Failed)
            .count();
        snapshot.tasks_completed = stats.completed.values().sum();
        snapshot.tasks_total = bills.len() as i64 * (QUESTION_COUNT as i64 + 1) + links_known;
        snapshot.bills = records.iter().map(BillSnapshot::from).collect();

        Ok(records.iter().all(|p| p.draft_status.is_terminal()))
    }

    async fn report(&self) {
        let snapshot = self.snapshot.read().await;
        let lines: Vec<String> = snapshot
            .bills
            .iter()
            .map(|b| format!("{}: {}", b.bill_id, b.stage))
            .collect();
        info!(bills = %lines.join(" | "), "Progress: {}", *snapshot);
    }

    async fn finish(
        &self,
        bills: &[BillId],
        started: Instant,
        end: RunEnd,
        mut failures: FailureLog,
    ) -> Result<RunReport, ControllerError> {
        let records = self.load_final(bills).await?;

        let mut articles = Vec::new();
        let mut incomplete = Vec::new();
        let mut failed = Vec::new();

        for progress in &records {
            let errors = failures.by_bill.remove(&progress.bill_id).unwrap_or_default();
            match progress.draft_status {
                DraftStatus::Complete => match progress.article.as_deref().map(serde_json::from_str::<Article>) {
                    Some(Ok(article)) => articles.push(article),
                    Some(Err(e)) => failed.push(BillFailure {
                        bill_id: progress.bill_id.clone(),
                        reason: format!("stored article is unreadable: {}", e),
                        errors,
                    }),
                    None => failed.push(BillFailure {
                        bill_id: progress.bill_id.clone(),
                        reason: "marked complete without an article".to_string(),
                        errors,
                    }),
                },
                DraftStatus::Failed => failed.push(BillFailure {
                    bill_id: progress.bill_id.clone(),
                    reason: progress
                        .failure
                        .clone()
                        .unwrap_or_else(|| "unknown failure".to_string()),
                    errors,
                }),
                DraftStatus::NotReady | DraftStatus::Queued => incomplete.push(IncompleteBill {
                    bill_id: progress.bill_id.clone(),
                    stage: progress.stage(),
                }),
            }
        }

        // Failures for bills outside the target list.
        let mut unattributed = failures.unattributed;
        unattributed.extend(failures.by_bill.into_values().flatten());

        metrics::BILLS_FINISHED
            .with_label_values(&["complete"])
            .inc_by(articles.len() as u64);
        metrics::BILLS_FINISHED
            .with_label_values(&["failed"])
            .inc_by(failed.len() as u64);

        let timed_out = end == RunEnd::TimedOut;
        let mut summary = RunSummary::from_articles(&articles, bills.len(), started.elapsed());
        summary.incomplete_bills = incomplete.iter().map(|b| b.bill_id.clone()).collect();
        summary.failed_bills = failed.iter().map(|b| b.bill_id.clone()).collect();
        summary.timed_out = timed_out;

        self.output.write(&articles, &summary).await?;

        for bill in &incomplete {
            warn!(bill_id = %bill.bill_id, stage = %bill.stage, "Bill incomplete");
        }
        for bill in &failed {
            error!(
                bill_id = %bill.bill_id,
                reason = %bill.reason,
                errors = bill.errors.len(),
                "Bill failed"
            );
        }
        info!(
            completed = articles.len(),
            incomplete = incomplete.len(),
            failed = failed.len(),
            timed_out,
            elapsed_secs = summary.total_time_seconds,
            "Run finished"
        );

        {
            let mut snapshot = self.snapshot.write().await;
            snapshot.phase = RunPhase::Finished;
            snapshot.elapsed_secs = started.elapsed().as_secs_f64();
            snapshot.bills = records.iter().map(BillSnapshot::from).collect();
        }

        Ok(RunReport {
            articles,
            incomplete,
            failed,
            unattributed_errors: unattributed,
            timed_out,
            interrupted: end == RunEnd::Stopped,
            summary,
        })
    }

    /// Final read of every record. Unlike the poll loop this must succeed, so
    /// a store outage here is retried a few times before giving up.
    async fn load_final(&self, bills: &[BillId]) -> Result<Vec<BillProgress>, ControllerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.load_all(bills).await {
                Ok(records) => return Ok(records),
                Err(e) if is_connectivity(&e) && attempt < FINAL_LOAD_ATTEMPTS => {
                    warn!(attempt, error = %e, "State store unavailable during final read, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.reconnect_delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_connectivity(error: &ControllerError) -> bool {
    match error {
        ControllerError::Store(e) => e.is_retryable(),
        ControllerError::Bus(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::store::InMemoryStateStore;
    use crate::task::FailureKind;
    use crate::testing::{FlakyStateStore, RecordingOutputCollector};

    struct Harness {
        bus: InMemoryBus,
        tracker: ProgressTracker,
        output: Arc<RecordingOutputCollector>,
        controller: Controller,
    }

    fn harness_with(config: ControllerConfig, tracker: ProgressTracker) -> Harness {
        let bus = InMemoryBus::default();
        let output = Arc::new(RecordingOutputCollector::new());
        let controller = Controller::new(
            config,
            tracker.clone(),
            Arc::new(bus.clone()),
            output.clone(),
        );
        Harness {
            bus,
            tracker,
            output,
            controller,
        }
    }

    fn fast_config(bills: &[&str]) -> ControllerConfig {
        ControllerConfig::for_bills(bills.iter().copied())
            .with_poll_interval_ms(10)
            .with_report_interval_ms(10)
            .with_reconnect_delay_ms(10)
            .with_run_timeout_secs(5)
    }

    async fn publish_failure(bus: &InMemoryBus, bill_id: &str) {
        let failed = FailedTask::from_task(
            &Task::question(bill_id, 1, QUESTIONS[0].text),
            FailureKind::Exhausted,
            "model unavailable",
        );
        bus.publish(
            topics::PIPELINE_ERRORS,
            bill_id,
            serde_json::to_string(&failed).unwrap(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_seeds_seven_questions_per_bill() {
        let tracker = ProgressTracker::new(Arc::new(InMemoryStateStore::new()));
        let h = harness_with(
            fast_config(&["H.R.1", "s.24"]).with_run_timeout_secs(0),
            tracker,
        );

        let report = h.controller.run().await.unwrap();

        let seeded = h.bus.messages(topics::QUESTION_TASKS);
        assert_eq!(seeded.len(), 14);
        let task: Task = serde_json::from_str(&seeded[7].payload).unwrap();
        assert_eq!(task.bill_id, "S.24");

        assert!(report.timed_out);
        assert!(report.articles.is_empty());
        assert_eq!(report.incomplete.len(), 2);
        assert_eq!(report.incomplete[0].stage, "Answering 0/7");
        assert_eq!(report.summary.incomplete_bills, vec!["H.R.1", "S.24"]);
        assert_eq!(h.output.write_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_previous_run() {
        let tracker = ProgressTracker::new(Arc::new(InMemoryStateStore::new()));
        tracker.record_answer("H.R.1", 1, "stale").await.unwrap();

        let h = harness_with(fast_config(&["H.R.1"]).with_run_timeout_secs(0), tracker);
        h.controller.run().await.unwrap();

        let progress = h.tracker.load("H.R.1").await.unwrap();
        assert!(progress.answers.is_empty());
        assert_eq!(progress.draft_status, DraftStatus::NotReady);
    }

    #[tokio::test]
    async fn test_error_topic_fails_bill() {
        let tracker = ProgressTracker::new(Arc::new(InMemoryStateStore::new()));
        let h = harness_with(fast_config(&["H.R.1"]), tracker);
        publish_failure(&h.bus, "H.R.1").await;

        let report = h.controller.run().await.unwrap();

        assert!(!report.timed_out);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].errors.len(), 1);
        assert!(report.failed[0].reason.contains("exhausted"));
        assert_eq!(report.summary.failed_bills, vec!["H.R.1"]);
        assert_eq!(
            h.tracker.load("H.R.1").await.unwrap().draft_status,
            DraftStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_unknown_bill_failure_is_unattributed() {
        let tracker = ProgressTracker::new(Arc::new(InMemoryStateStore::new()));
        let h = harness_with(fast_config(&["H.R.1"]).with_run_timeout_secs(0), tracker);
        h.bus
            .publish(topics::PIPELINE_ERRORS, "x", "not json".to_string())
            .await
            .unwrap();

        let report = h.controller.run().await.unwrap();
        assert_eq!(report.unattributed_errors.len(), 1);
        assert_eq!(report.unattributed_errors[0].failure, FailureKind::Malformed);
    }

    #[tokio::test]
    async fn test_invalid_bill_rejected() {
        let tracker = ProgressTracker::new(Arc::new(InMemoryStateStore::new()));
        let h = harness_with(fast_config(&["H.R.1", "X.9"]), tracker);
        assert!(matches!(
            h.controller.run().await,
            Err(ControllerError::InvalidBill(_))
        ));
        assert!(h.bus.messages(topics::QUESTION_TASKS).is_empty());
    }

    #[tokio::test]
    async fn test_survives_store_outage() {
        let flaky = Arc::new(FlakyStateStore::new(Arc::new(InMemoryStateStore::new())));
        let tracker = ProgressTracker::new(flaky.clone());
        let h = harness_with(fast_config(&["H.R.1"]), tracker);

        let bus = h.bus.clone();
        let outage = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            flaky.set_down(true);
            tokio::time::sleep(Duration::from_millis(100)).await;
            flaky.set_down(false);
            publish_failure(&bus, "H.R.1").await;
        });

        let report = h.controller.run().await.unwrap();
        outage.await.unwrap();

        assert!(!report.timed_out);
        assert_eq!(report.failed.len(), 1);
        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.phase, RunPhase::Finished);
        assert!(snapshot.store_connected);
    }

    #[tokio::test]
    async fn test_stop_ends_run() {
        let tracker = ProgressTracker::new(Arc::new(InMemoryStateStore::new()));
        let h = Arc::new(harness_with(fast_config(&["H.R.1"]).with_run_timeout_secs(60), tracker));

        let runner = Arc::clone(&h);
        let run = tokio::spawn(async move { runner.controller.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.controller.is_running());
        h.controller.stop();

        let report = run.await.unwrap().unwrap();
        assert!(report.interrupted);
        assert!(!report.timed_out);
        assert_eq!(report.incomplete.len(), 1);
        assert!(!h.controller.is_running());
    }
}
