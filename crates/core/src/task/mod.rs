//! Pipeline task model.
//!
//! A [`Task`] is one unit of work routed through the broker. Its payload is a
//! tagged variant, and the variant alone decides which topic carries the task
//! and which pool consumes it.

mod bill_id;
mod questions;
mod types;

pub use bill_id::{BillId, BillIdError};
pub use questions::{question, Question, QUESTIONS, QUESTION_COUNT};
pub use types::{
    topics, AnswerEvent, FailedTask, FailureKind, LinkResultEvent, Outgoing, Task, TaskKind,
    TaskPayload,
};
