use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broker topic names.
pub mod topics {
    pub const QUESTION_TASKS: &str = "question-tasks";
    pub const QUESTION_ANSWERS: &str = "question-answers";
    pub const LINK_CHECK_TASKS: &str = "link-check-tasks";
    pub const LINK_CHECK_RESULTS: &str = "link-check-results";
    pub const ARTICLE_TASKS: &str = "article-tasks";
    pub const COMPLETED_ARTICLES: &str = "completed-articles";
    pub const PIPELINE_ERRORS: &str = "pipeline-errors";
}

/// The three kinds of work the pipeline routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Question,
    LinkCheck,
    Draft,
}

impl TaskKind {
    /// Input topic for tasks of this kind.
    pub fn topic(&self) -> &'static str {
        match self {
            TaskKind::Question => topics::QUESTION_TASKS,
            TaskKind::LinkCheck => topics::LINK_CHECK_TASKS,
            TaskKind::Draft => topics::ARTICLE_TASKS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Question => "question",
            TaskKind::LinkCheck => "link_check",
            TaskKind::Draft => "draft",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific task payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    Question {
        question_index: u8,
        question_text: String,
    },
    LinkCheck {
        url: String,
    },
    Draft,
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Question { .. } => TaskKind::Question,
            TaskPayload::LinkCheck { .. } => TaskKind::LinkCheck,
            TaskPayload::Draft => TaskKind::Draft,
        }
    }
}

/// A unit of work carried on a task topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub bill_id: String,
    #[serde(flatten)]
    pub payload: TaskPayload,
    /// Only the worker pool runtime bumps this.
    #[serde(default)]
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl Task {
    fn new(bill_id: impl Into<String>, payload: TaskPayload) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            bill_id: bill_id.into(),
            payload,
            attempt: 0,
            created_at: Utc::now(),
        }
    }

    pub fn question(
        bill_id: impl Into<String>,
        question_index: u8,
        question_text: impl Into<String>,
    ) -> Self {
        Self::new(
            bill_id,
            TaskPayload::Question {
                question_index,
                question_text: question_text.into(),
            },
        )
    }

    pub fn link_check(bill_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(bill_id, TaskPayload::LinkCheck { url: url.into() })
    }

    pub fn draft(bill_id: impl Into<String>) -> Self {
        Self::new(bill_id, TaskPayload::Draft)
    }

    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    pub fn topic(&self) -> &'static str {
        self.kind().topic()
    }

    /// Copy of this task for its next attempt. Keeps the task id so replays
    /// can be correlated in logs.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Human-readable label used in log lines, e.g. `H.R.1/q3`.
    pub fn label(&self) -> String {
        match &self.payload {
            TaskPayload::Question { question_index, .. } => {
                format!("{}/q{}", self.bill_id, question_index)
            }
            TaskPayload::LinkCheck { url } => format!("{}/link {}", self.bill_id, url),
            TaskPayload::Draft => format!("{}/draft", self.bill_id),
        }
    }
}

/// Why a message ended up on the error topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient failures used up the retry budget.
    Exhausted,
    /// The handler reported a non-retryable failure.
    Permanent,
    /// The payload could not be decoded or did not belong on its topic.
    Malformed,
    /// Pipeline state contradicted the readiness gate.
    InvariantViolation,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Exhausted => "exhausted",
            FailureKind::Permanent => "permanent",
            FailureKind::Malformed => "malformed",
            FailureKind::InvariantViolation => "invariant_violation",
        }
    }
}

/// Record published to the error topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTask {
    pub source_topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bill_id: Option<String>,
    /// The decoded task, absent when the payload was malformed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    pub failure: FailureKind,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl FailedTask {
    pub fn from_task(task: &Task, failure: FailureKind, error: impl Into<String>) -> Self {
        Self {
            source_topic: task.topic().to_string(),
            bill_id: Some(task.bill_id.clone()),
            task: Some(task.clone()),
            raw_payload: None,
            failure,
            error: error.into(),
            attempts: task.attempt + 1,
            failed_at: Utc::now(),
        }
    }

    pub fn malformed(source_topic: &str, raw_payload: &str, error: impl Into<String>) -> Self {
        Self {
            source_topic: source_topic.to_string(),
            bill_id: None,
            task: None,
            raw_payload: Some(raw_payload.to_string()),
            failure: FailureKind::Malformed,
            error: error.into(),
            attempts: 0,
            failed_at: Utc::now(),
        }
    }
}

/// Published on the answers topic once an answer is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEvent {
    pub bill_id: String,
    pub question_index: u8,
    pub answer: String,
    pub links: Vec<String>,
    pub answered_at: DateTime<Utc>,
}

/// Published on the link results topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkResultEvent {
    pub bill_id: String,
    pub url: String,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// A message a handler wants published once it succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub topic: &'static str,
    pub key: String,
    pub payload: String,
}

impl Outgoing {
    /// Route a task to its kind's topic, keyed by bill.
    pub fn task(task: &Task) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic: task.topic(),
            key: task.bill_id.clone(),
            payload: serde_json::to_string(task)?,
        })
    }

    pub fn event<T: Serialize>(
        topic: &'static str,
        key: impl Into<String>,
        event: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic,
            key: key.into(),
            payload: serde_json::to_string(event)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_selects_topic() {
        assert_eq!(Task::question("H.R.1", 1, "q").topic(), topics::QUESTION_TASKS);
        assert_eq!(
            Task::link_check("H.R.1", "https://example.com").topic(),
            topics::LINK_CHECK_TASKS
        );
        assert_eq!(Task::draft("H.R.1").topic(), topics::ARTICLE_TASKS);
    }

    #[test]
    fn test_task_wire_format_is_tagged() {
        let task = Task::question("S.24", 3, "Who is the sponsor?");
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["kind"], "question");
        assert_eq!(value["question_index"], 3);
        assert_eq!(value["bill_id"], "S.24");
        assert_eq!(value["attempt"], 0);

        let draft = serde_json::to_value(Task::draft("S.24")).unwrap();
        assert_eq!(draft["kind"], "draft");
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let raw = r#"{"task_id":"t","bill_id":"S.24","kind":"summarize","created_at":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<Task>(raw).is_err());
    }

    #[test]
    fn test_next_attempt_keeps_identity() {
        let task = Task::link_check("S.24", "https://example.com");
        let retry = task.next_attempt();
        assert_eq!(retry.attempt, 1);
        assert_eq!(retry.task_id, task.task_id);
        assert_eq!(retry.payload, task.payload);
    }

    #[test]
    fn test_failed_task_counts_attempts() {
        let task = Task::draft("S.24").next_attempt().next_attempt();
        let failed = FailedTask::from_task(&task, FailureKind::Exhausted, "boom");
        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.bill_id.as_deref(), Some("S.24"));
        assert_eq!(failed.source_topic, topics::ARTICLE_TASKS);
    }

    #[test]
    fn test_outgoing_task_is_keyed_by_bill() {
        let task = Task::draft("H.RES.353");
        let outgoing = Outgoing::task(&task).unwrap();
        assert_eq!(outgoing.topic, topics::ARTICLE_TASKS);
        assert_eq!(outgoing.key, "H.RES.353");
        let decoded: Task = serde_json::from_str(&outgoing.payload).unwrap();
        assert_eq!(decoded, task);
    }
}
