//! Per-bill progress tracking and the readiness gate.
//!
//! A bill's record lives under `bill:{bill_id}` in the state store. Counters
//! only ever move forward, toward the value derived from the record's own
//! answer and link fields, so redelivered tasks and crashed workers converge
//! instead of double counting. The gate (seven answers, a sealed link total,
//! every link resolved) licenses exactly one `not_ready -> queued` transition,
//! and the `draft_trigger` field names the one task allowed to emit the draft.

mod record;
mod tracker;

pub use record::{bill_key, fields, BillProgress, DraftStatus, LinkStatus};
pub use tracker::{AnswerOutcome, DraftClaim, LinkUpdate, ProgressTracker, RunStats};
