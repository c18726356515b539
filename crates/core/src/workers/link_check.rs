//! Validates one hyperlink cited by an answer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::metrics;
use crate::pool::{HandlerError, TaskContext, TaskHandler};
use crate::probe::{is_valid_status, LinkProber, ProbeError};
use crate::progress::{LinkStatus, LinkUpdate, ProgressTracker};
use crate::task::{topics, LinkResultEvent, Outgoing, Task, TaskKind, TaskPayload};

use super::draft_trigger;

pub struct LinkCheckHandler {
    tracker: ProgressTracker,
    prober: Arc<dyn LinkProber>,
    probe_timeout: Duration,
}

/// What a probe concluded about a link.
struct Verdict {
    valid: bool,
    status_code: Option<u16>,
    reason: Option<String>,
}

impl LinkCheckHandler {
    pub fn new(tracker: ProgressTracker, prober: Arc<dyn LinkProber>, probe_timeout: Duration) -> Self {
        Self {
            tracker,
            prober,
            probe_timeout,
        }
    }

    /// A non-2xx answer is a result, not an error. Network trouble is retried
    /// until the final attempt, which records the link as invalid instead.
    async fn probe(&self, url: &str, ctx: &TaskContext) -> Result<Verdict, HandlerError> {
        match self.prober.probe(url, self.probe_timeout).await {
            Ok(code) => Ok(Verdict {
                valid: is_valid_status(code),
                status_code: Some(code),
                reason: (!is_valid_status(code)).then(|| format!("HTTP {}", code)),
            }),
            Err(e @ ProbeError::InvalidUrl(_)) => Ok(Verdict {
                valid: false,
                status_code: None,
                reason: Some(e.to_string()),
            }),
            Err(e) if ctx.is_final_attempt() => {
                warn!(url, attempt = ctx.attempt, "Probe still failing on final attempt, marking invalid: {}", e);
                Ok(Verdict {
                    valid: false,
                    status_code: None,
                    reason: Some(e.to_string()),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TaskHandler for LinkCheckHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::LinkCheck
    }

    async fn handle(&self, task: &Task, ctx: &TaskContext) -> Result<Vec<Outgoing>, HandlerError> {
        let TaskPayload::LinkCheck { url } = &task.payload else {
            return Err(HandlerError::Malformed("not a link check task".to_string()));
        };
        let bill_id = task.bill_id.as_str();

        let verdict = match self.tracker.link_status(bill_id, url).await? {
            None => {
                warn!(bill_id, url = %url, "Link was never registered for this bill, dropping check");
                return Ok(Vec::new());
            }
            // Resolved by an earlier delivery; only the bookkeeping is replayed.
            Some(status @ (LinkStatus::Valid | LinkStatus::Invalid)) => {
                debug!(bill_id, url = %url, status = status.as_str(), "Link already checked");
                Verdict {
                    valid: status == LinkStatus::Valid,
                    status_code: None,
                    reason: None,
                }
            }
            Some(LinkStatus::Pending) => self.probe(url, ctx).await?,
        };

        let update = self
            .tracker
            .record_link_result(bill_id, url, verdict.valid)
            .await?;
        if update == LinkUpdate::Recorded {
            let outcome = if verdict.valid { "valid" } else { "invalid" };
            metrics::LINK_RESULTS.with_label_values(&[outcome]).inc();
            debug!(bill_id, url = %url, outcome, "Link result recorded");
        }

        let mut outgoing = vec![Outgoing::event(
            topics::LINK_CHECK_RESULTS,
            bill_id,
            &LinkResultEvent {
                bill_id: bill_id.to_string(),
                url: url.clone(),
                valid: verdict.valid,
                status_code: verdict.status_code,
                reason: verdict.reason,
                checked_at: Utc::now(),
            },
        )?];

        if let Some(draft) = draft_trigger(&self.tracker, task, ctx).await? {
            outgoing.push(draft);
        }
        Ok(outgoing)
    }
}
