use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::store::{StateStore, StoreError};
use crate::task::{TaskKind, QUESTION_COUNT};

use super::record::{bill_key, fields, BillProgress, DraftStatus, LinkStatus};

const RUN_STATS_KEY: &str = "run:stats";

/// Result of storing an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    /// False when the answer was already stored (a redelivery).
    pub inserted: bool,
    pub answered_count: i64,
}

/// Result of recording a link check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkUpdate {
    /// This call moved the link out of `pending`.
    Recorded,
    /// Another delivery already resolved it.
    AlreadyResolved,
    /// The link was never registered for this bill.
    Unknown,
}

/// Result of running the readiness gate for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftClaim {
    /// This call claimed the draft trigger and must publish the draft task.
    Won,
    /// The same trigger id claimed it earlier. A replay of the winning task
    /// republishes the draft task it may have lost.
    Held,
    /// Gate closed, or another task holds the trigger.
    None,
}

/// Task throughput counters shared by every pool in the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub completed: HashMap<String, i64>,
    pub retried: HashMap<String, i64>,
    pub failed: HashMap<String, i64>,
}

/// Reads and mutates bill records through the store's atomic primitives.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn StateStore>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Drop anything left from an earlier run and write a fresh record.
    pub async fn reset(&self, bill_id: &str) -> Result<(), StoreError> {
        let key = bill_key(bill_id);
        self.store.delete(&key).await?;
        self.store.set(&key, fields::ANSWERED_COUNT, "0").await?;
        self.store.set(&key, fields::LINKS_VALIDATED, "0").await?;
        self.store.set(&key, fields::LINKS_FAILED, "0").await?;
        self.store
            .set(&key, fields::DRAFT_STATUS, DraftStatus::NotReady.as_str())
            .await?;
        Ok(())
    }

    pub async fn load(&self, bill_id: &str) -> Result<BillProgress, StoreError> {
        let raw = self.store.get_all(&bill_key(bill_id)).await?;
        BillProgress::from_fields(bill_id, raw)
    }

    pub async fn answer(&self, bill_id: &str, index: u8) -> Result<Option<String>, StoreError> {
        self.store.get(&bill_key(bill_id), &fields::answer(index)).await
    }

    /// Keep a freshly generated answer before its links are registered and
    /// return whichever candidate was stored first. A retry after a partial
    /// failure reuses the stored text, so the links it registered stay the
    /// links of the answer that is finally recorded.
    pub async fn stash_candidate(
        &self,
        bill_id: &str,
        index: u8,
        text: &str,
    ) -> Result<String, StoreError> {
        let key = bill_key(bill_id);
        let field = fields::candidate(index);
        self.store.set_if_absent(&key, &field, text).await?;
        Ok(self
            .store
            .get(&key, &field)
            .await?
            .unwrap_or_else(|| text.to_string()))
    }

    pub async fn candidate(&self, bill_id: &str, index: u8) -> Result<Option<String>, StoreError> {
        self.store
            .get(&bill_key(bill_id), &fields::candidate(index))
            .await
    }

    /// Register a link as pending. Returns true if this call registered it.
    ///
    /// Must happen before the answer citing it is stored, so that the link
    /// count sealed after the last answer covers every link.
    pub async fn register_link(&self, bill_id: &str, url: &str) -> Result<bool, StoreError> {
        self.store
            .set_if_absent(
                &bill_key(bill_id),
                &fields::link(url),
                LinkStatus::Pending.as_str(),
            )
            .await
    }

    pub async fn link_status(
        &self,
        bill_id: &str,
        url: &str,
    ) -> Result<Option<LinkStatus>, StoreError> {
        let key = bill_key(bill_id);
        let field = fields::link(url);
        match self.store.get(&key, &field).await? {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| StoreError::Malformed { key, field, value }),
            None => Ok(None),
        }
    }

    /// Store an answer at most once and bring `answered_count` up to date.
    pub async fn record_answer(
        &self,
        bill_id: &str,
        index: u8,
        answer: &str,
    ) -> Result<AnswerOutcome, StoreError> {
        let key = bill_key(bill_id);
        let inserted = self
            .store
            .set_if_absent(&key, &fields::answer(index), answer)
            .await?;

        let stored = self.load(bill_id).await?.answers.len() as i64;
        let answered_count = self.raise_counter(&key, fields::ANSWERED_COUNT, stored).await?;

        if !inserted {
            debug!(bill_id, question = index, "Answer already stored");
        }
        Ok(AnswerOutcome {
            inserted,
            answered_count,
        })
    }

    /// Fix `links_total` once every answer is in. Returns the total if this
    /// call sealed it.
    pub async fn seal_links(&self, bill_id: &str) -> Result<Option<i64>, StoreError> {
        let progress = self.load(bill_id).await?;
        if progress.answers.len() < QUESTION_COUNT as usize || progress.links_total.is_some() {
            return Ok(None);
        }

        let total = progress.links.len() as i64;
        let sealed = self
            .store
            .set_if_absent(&bill_key(bill_id), fields::LINKS_TOTAL, &total.to_string())
            .await?;

        if sealed {
            info!(bill_id, links_total = total, "All answers stored, link count sealed");
            Ok(Some(total))
        } else {
            Ok(None)
        }
    }

    /// Move a link out of `pending` and bring the link counters up to date.
    pub async fn record_link_result(
        &self,
        bill_id: &str,
        url: &str,
        valid: bool,
    ) -> Result<LinkUpdate, StoreError> {
        let key = bill_key(bill_id);
        let target = if valid {
            LinkStatus::Valid
        } else {
            LinkStatus::Invalid
        };

        let recorded = self
            .store
            .compare_and_set(
                &key,
                &fields::link(url),
                Some(LinkStatus::Pending.as_str()),
                target.as_str(),
            )
            .await?;

        let progress = self.load(bill_id).await?;
        if !progress.links.contains_key(url) {
            return Ok(LinkUpdate::Unknown);
        }

        let validated = progress
            .links
            .values()
            .filter(|s| **s == LinkStatus::Valid)
            .count() as i64;
        let failed = progress
            .links
            .values()
            .filter(|s| **s == LinkStatus::Invalid)
            .count() as i64;
        self.raise_counter(&key, fields::LINKS_VALIDATED, validated)
            .await?;
        self.raise_counter(&key, fields::LINKS_FAILED, failed).await?;

        Ok(if recorded {
            LinkUpdate::Recorded
        } else {
            LinkUpdate::AlreadyResolved
        })
    }

    /// Evaluate the gate, attempt `not_ready -> queued`, then claim the draft
    /// trigger for `trigger_id`. The trigger is claimed at most once per bill,
    /// so only one task ever gets [`DraftClaim::Won`].
    pub async fn try_queue_draft(
        &self,
        bill_id: &str,
        trigger_id: &str,
    ) -> Result<DraftClaim, StoreError> {
        let key = bill_key(bill_id);
        let progress = self.load(bill_id).await?;

        let queued = match progress.draft_status {
            DraftStatus::Queued => true,
            DraftStatus::NotReady if progress.is_ready() => {
                let won = self
                    .store
                    .compare_and_set(
                        &key,
                        fields::DRAFT_STATUS,
                        Some(DraftStatus::NotReady.as_str()),
                        DraftStatus::Queued.as_str(),
                    )
                    .await?;
                if won {
                    info!(bill_id, "Readiness gate passed, draft queued");
                    true
                } else {
                    // Lost to another caller, which queued or failed the bill.
                    self.store.get(&key, fields::DRAFT_STATUS).await?.as_deref()
                        == Some(DraftStatus::Queued.as_str())
                }
            }
            _ => false,
        };
        if !queued {
            return Ok(DraftClaim::None);
        }

        // Whoever claims first emits, so a crash between the status change
        // and the claim is repaired by the next task that touches the bill.
        if self
            .store
            .set_if_absent(&key, fields::DRAFT_TRIGGER, trigger_id)
            .await?
        {
            debug!(bill_id, trigger_id, "Draft trigger claimed");
            return Ok(DraftClaim::Won);
        }

        let holder = self.store.get(&key, fields::DRAFT_TRIGGER).await?;
        Ok(if holder.as_deref() == Some(trigger_id) {
            DraftClaim::Held
        } else {
            DraftClaim::None
        })
    }

    /// Store the article (first write wins) and move `queued -> complete`.
    pub async fn complete_draft(&self, bill_id: &str, article: &str) -> Result<bool, StoreError> {
        let key = bill_key(bill_id);
        self.store
            .set_if_absent(&key, fields::ARTICLE, article)
            .await?;
        self.store
            .compare_and_set(
                &key,
                fields::DRAFT_STATUS,
                Some(DraftStatus::Queued.as_str()),
                DraftStatus::Complete.as_str(),
            )
            .await
    }

    /// Mark a bill failed unless it already reached a terminal status.
    pub async fn fail_bill(&self, bill_id: &str, reason: &str) -> Result<bool, StoreError> {
        let key = bill_key(bill_id);

        for from in [DraftStatus::NotReady, DraftStatus::Queued] {
            if self
                .store
                .compare_and_set(
                    &key,
                    fields::DRAFT_STATUS,
                    Some(from.as_str()),
                    DraftStatus::Failed.as_str(),
                )
                .await?
            {
                self.store.set_if_absent(&key, fields::FAILURE, reason).await?;
                warn!(bill_id, reason, "Bill marked failed");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Move a counter forward to `target`; never backwards.
    async fn raise_counter(&self, key: &str, field: &str, target: i64) -> Result<i64, StoreError> {
        loop {
            let current = self.store.get(key, field).await?;
            let value = match &current {
                Some(raw) => raw.parse::<i64>().map_err(|_| StoreError::Malformed {
                    key: key.to_string(),
                    field: field.to_string(),
                    value: raw.clone(),
                })?,
                None => 0,
            };
            if value >= target {
                return Ok(value);
            }
            if self
                .store
                .compare_and_set(key, field, current.as_deref(), &target.to_string())
                .await?
            {
                return Ok(target);
            }
        }
    }

    pub async fn reset_run_stats(&self) -> Result<(), StoreError> {
        self.store.delete(RUN_STATS_KEY).await
    }

    pub async fn bump_completed(&self, kind: TaskKind) -> Result<i64, StoreError> {
        self.bump("completed", kind).await
    }

    pub async fn bump_retried(&self, kind: TaskKind) -> Result<i64, StoreError> {
        self.bump("retried", kind).await
    }

    pub async fn bump_failed(&self, kind: TaskKind) -> Result<i64, StoreError> {
        self.bump("failed", kind).await
    }

    async fn bump(&self, outcome: &str, kind: TaskKind) -> Result<i64, StoreError> {
        self.store
            .increment(RUN_STATS_KEY, &format!("{}:{}", outcome, kind.as_str()), 1)
            .await
    }

    pub async fn run_stats(&self) -> Result<RunStats, StoreError> {
        let raw = self.store.get_all(RUN_STATS_KEY).await?;
        let mut stats = RunStats::default();
        for (field, value) in raw {
            let Some((outcome, kind)) = field.split_once(':') else {
                continue;
            };
            let count: i64 = value.parse().map_err(|_| StoreError::Malformed {
                key: RUN_STATS_KEY.to_string(),
                field: field.clone(),
                value: value.clone(),
            })?;
            let bucket = match outcome {
                "completed" => &mut stats.completed,
                "retried" => &mut stats.retried,
                "failed" => &mut stats.failed,
                _ => continue,
            };
            bucket.insert(kind.to_string(), count);
        }
        Ok(stats)
    }
}
