//! Types for the run controller.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::bus::BusError;
use crate::output::{Article, OutputError, RunSummary};
use crate::progress::{BillProgress, DraftStatus};
use crate::store::StoreError;
use crate::task::{BillIdError, FailedTask};

/// Errors that end a run early.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid bill list: {0}")]
    InvalidBill(#[from] BillIdError),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("output error: {0}")]
    Output(#[from] OutputError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("a run is already in progress")]
    AlreadyRunning,
}

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Seeding,
    Running,
    Finished,
}

/// Status line for one bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillSnapshot {
    pub bill_id: String,
    pub stage: String,
    pub draft_status: DraftStatus,
    pub answered_count: i64,
    pub links_total: Option<i64>,
    pub links_resolved: i64,
}

impl From<&BillProgress> for BillSnapshot {
    fn from(progress: &BillProgress) -> Self {
        Self {
            bill_id: progress.bill_id.clone(),
            stage: progress.stage(),
            draft_status: progress.draft_status,
            answered_count: progress.answered_count,
            links_total: progress.links_total,
            links_resolved: progress.links_resolved(),
        }
    }
}

/// Latest view of the run, refreshed on every poll.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressSnapshot {
    pub phase: RunPhase,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    pub bills_total: usize,
    pub bills_complete: usize,
    pub bills_failed: usize,
    pub tasks_completed: i64,
    /// Known so far: grows as answers reveal links.
    pub tasks_total: i64,
    /// False while the controller is waiting for the store to come back.
    pub store_connected: bool,
    pub bills: Vec<BillSnapshot>,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} bills complete, {} failed, {}/{} tasks, {:.0}s elapsed",
            self.bills_complete,
            self.bills_total,
            self.bills_failed,
            self.tasks_completed,
            self.tasks_total,
            self.elapsed_secs
        )
    }
}

/// A bill that reached `failed`, with whatever the error topic said about it.
#[derive(Debug, Clone, Serialize)]
pub struct BillFailure {
    pub bill_id: String,
    pub reason: String,
    pub errors: Vec<FailedTask>,
}

/// A bill that was still in flight when the run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteBill {
    pub bill_id: String,
    pub stage: String,
}

/// Final outcome of a run. Every target bill appears in exactly one of
/// `articles`, `incomplete` or `failed`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub articles: Vec<Article>,
    pub incomplete: Vec<IncompleteBill>,
    pub failed: Vec<BillFailure>,
    /// Error-topic messages that could not be tied to a bill.
    pub unattributed_errors: Vec<FailedTask>,
    pub timed_out: bool,
    /// Ended by `stop()` before every bill finished.
    pub interrupted: bool,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty() && self.failed.is_empty()
    }
}
