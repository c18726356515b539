//! Task handlers for the three pipeline stages.

mod article;
mod link_check;
mod metadata;
mod question;

pub use article::{compose_article, ArticleHandler};
pub use link_check::LinkCheckHandler;
pub use metadata::BillMetadata;
pub use question::QuestionHandler;

use tracing::debug;

use crate::metrics;
use crate::pool::{HandlerError, TaskContext};
use crate::progress::{DraftClaim, ProgressTracker};
use crate::task::{Outgoing, Task};

/// Run the draft trigger after a state change. Returns the draft task when
/// this task claimed the trigger, or when a replay of the claiming task must
/// re-emit the draft task it may have lost. Any other task gets nothing.
pub(crate) async fn draft_trigger(
    tracker: &ProgressTracker,
    task: &Task,
    ctx: &TaskContext,
) -> Result<Option<Outgoing>, HandlerError> {
    let bill_id = task.bill_id.as_str();
    match tracker.try_queue_draft(bill_id, &task.task_id).await? {
        DraftClaim::Won => {
            metrics::DRAFTS_TRIGGERED.inc();
            Ok(Some(Outgoing::task(&Task::draft(bill_id))?))
        }
        DraftClaim::Held if ctx.attempt > 0 || ctx.delivery_count > 1 => {
            debug!(bill_id, task_id = %task.task_id, "Replayed trigger re-emitting draft task");
            Ok(Some(Outgoing::task(&Task::draft(bill_id))?))
        }
        _ => Ok(None),
    }
}

/// Bill id of a task, parsed. An unparseable id is a malformed task.
pub(crate) fn parse_bill(task: &Task) -> Result<crate::task::BillId, HandlerError> {
    task.bill_id
        .parse()
        .map_err(|e: crate::task::BillIdError| HandlerError::Malformed(e.to_string()))
}
